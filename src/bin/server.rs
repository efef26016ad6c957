// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # OnTrak Server Binary
//!
//! Starts the schedule execution and statistics server: loads the
//! template/trainer catalog, opens the session store and serves the HTTP
//! API.

use anyhow::Result;
use clap::Parser;
use ontrak::{
    catalog::StaticCatalog,
    config::ServerConfig,
    database::Database,
    health::HealthChecker,
    logging,
    notifier::BroadcastNotifier,
    routes::{ScheduleRoutes, StatisticsRoutes},
    schedule::ScheduleService,
    server::OnTrakServer,
    statistics::StatisticsEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ontrak-server")]
#[command(about = "Schedule execution and statistics server for training programs")]
pub struct Args {
    /// Port to listen on (overrides HTTP_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(short, long)]
    database_url: Option<String>,

    /// Template/trainer catalog file (overrides CATALOG_PATH)
    #[arg(short, long)]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env()?;

    let args = Args::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }
    if let Some(catalog) = args.catalog {
        config.catalog_path = catalog;
    }

    info!("Port: {}", config.http_port);
    info!("Database: {}", config.database_url);
    info!("Catalog: {}", config.catalog_path.display());

    let catalog = Arc::new(StaticCatalog::load(&config.catalog_path)?);
    info!("Catalog loaded from {}", config.catalog_path.display());

    let database = Database::new(&config.database_url).await?;
    info!("Session store initialized");

    let notifier = Arc::new(BroadcastNotifier::new(config.broadcast_capacity));

    let schedule_service = Arc::new(ScheduleService::new(
        database.clone(),
        catalog.clone(),
        notifier.clone(),
    ));
    let statistics_engine = Arc::new(
        StatisticsEngine::new(database.clone(), catalog.clone(), catalog.clone())
            .with_fetch_deadline(config.stats_fetch_deadline()),
    );

    let server = OnTrakServer::new(
        ScheduleRoutes::new(schedule_service, catalog.clone(), catalog.clone()),
        StatisticsRoutes::new(statistics_engine),
        HealthChecker::new(database),
    );

    info!("OnTrak server starting on port {}", config.http_port);
    if let Err(e) = server.run(config.http_port).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
