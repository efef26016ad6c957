// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # OnTrak Server
//!
//! A server coordinating live execution of multi-day training programs.
//! Trainers step through an ordered sequence of timed activities, actual
//! timings are recorded against the plan, and historical records are later
//! aggregated into variance, punctuality and ranking metrics.
//!
//! ## Features
//!
//! - **Schedule state machine**: start a template day, advance and retreat
//!   through activities, close or cancel the day
//! - **Single active session**: starting a new day force-cancels whatever
//!   the trainer had running
//! - **Live updates**: every mutation broadcasts the full session snapshot
//!   through an injected notifier
//! - **Statistics engine**: best-effort reports sliced by trainer,
//!   training, day and date range, resilient to slow or failing backends
//!
//! ## Architecture
//!
//! The server follows a modular architecture:
//! - **Models**: shared session and template data structures
//! - **Schedule**: the execution state machine
//! - **Statistics**: the read-only aggregation engine
//! - **Catalog**: template source and trainer directory collaborators
//! - **Database**: SQLite session store
//! - **Server**: warp HTTP binding
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ontrak::catalog::StaticCatalog;
//! use ontrak::database::Database;
//! use ontrak::notifier::BroadcastNotifier;
//! use ontrak::schedule::ScheduleService;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let database = Database::new("sqlite:./data/sessions.db").await?;
//!     let catalog = Arc::new(StaticCatalog::load("./catalog.toml".as_ref())?);
//!     let notifier = Arc::new(BroadcastNotifier::new(64));
//!
//!     let schedule = ScheduleService::new(database, catalog, notifier);
//!     let session = schedule
//!         .start_day("trainer-1", "onboarding", 1, None)
//!         .await?;
//!     println!("started: {}", session.title);
//!
//!     Ok(())
//! }
//! ```

/// Shared data models for sessions and templates
pub mod models;

/// Template source and trainer directory collaborators
pub mod catalog;

/// Session store
pub mod database;

/// Session update broadcasting
pub mod notifier;

/// The schedule execution state machine
pub mod schedule;

/// Statistics aggregation engine
pub mod statistics;

/// HTTP route handlers and request/response records
pub mod routes;

/// warp HTTP server wiring
pub mod server;

/// Environment-based configuration
pub mod config;

/// Structured logging setup
pub mod logging;

/// Health checks
pub mod health;
