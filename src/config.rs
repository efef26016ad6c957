// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Environment-based configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    pub http_port: u16,
    /// Log level
    pub log_level: String,
    /// Database URL (SQLite path)
    pub database_url: String,
    /// Path to the template/trainer catalog file
    pub catalog_path: PathBuf,
    /// Per-fetch deadline for the statistics engine, seconds
    pub stats_fetch_deadline_secs: u64,
    /// Capacity of the schedule update broadcast channel
    pub broadcast_capacity: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        if let Err(e) = dotenv::dotenv() {
            warn!("No .env file found or failed to load: {}", e);
        }

        Ok(ServerConfig {
            http_port: env_var_or("HTTP_PORT", "8080")?
                .parse()
                .context("Invalid HTTP_PORT value")?,
            log_level: env_var_or("RUST_LOG", "info")?,
            database_url: env_var_or("DATABASE_URL", "sqlite:./data/sessions.db")?,
            catalog_path: PathBuf::from(env_var_or("CATALOG_PATH", "./catalog.toml")?),
            stats_fetch_deadline_secs: env_var_or("STATS_FETCH_DEADLINE", "10")?
                .parse()
                .context("Invalid STATS_FETCH_DEADLINE value")?,
            broadcast_capacity: env_var_or("BROADCAST_CAPACITY", "64")?
                .parse()
                .context("Invalid BROADCAST_CAPACITY value")?,
        })
    }

    /// Statistics fetch deadline as a duration
    pub fn stats_fetch_deadline(&self) -> Duration {
        Duration::from_secs(self.stats_fetch_deadline_secs)
    }
}

fn env_var_or(key: &str, default: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value),
        Err(env::VarError::NotPresent) => Ok(default.to_string()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {key}")),
    }
}
