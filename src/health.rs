// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Health check support for the HTTP server

use crate::database::Database;
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Overall health status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: HealthStatus,
    /// Service information
    pub service: ServiceInfo,
    /// Individual component checks
    pub checks: Vec<ComponentHealth>,
    /// Response timestamp
    pub timestamp: u64,
}

/// Service information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// Service uptime in seconds
    pub uptime_seconds: u64,
}

/// Individual component health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Status description
    pub message: String,
}

/// Health checker for the OnTrak server
pub struct HealthChecker {
    /// Service start time
    start_time: Instant,
    /// Database reference
    database: Database,
}

impl HealthChecker {
    /// Create a new health checker
    pub fn new(database: Database) -> Self {
        Self {
            start_time: Instant::now(),
            database,
        }
    }

    /// Check the service and its session store
    pub async fn check(&self) -> HealthResponse {
        let database_check = match self.database.ping().await {
            Ok(()) => ComponentHealth {
                name: "session_store".to_string(),
                status: HealthStatus::Healthy,
                message: "reachable".to_string(),
            },
            Err(error) => ComponentHealth {
                name: "session_store".to_string(),
                status: HealthStatus::Degraded,
                message: format!("unreachable: {error}"),
            },
        };

        let status = if database_check.status == HealthStatus::Healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthResponse {
            status,
            service: ServiceInfo {
                name: "ontrak-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_seconds: self.start_time.elapsed().as_secs(),
            },
            checks: vec![database_check],
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_when_store_responds() {
        let database = Database::new("sqlite::memory:").await.unwrap();
        let checker = HealthChecker::new(database);

        let response = checker.check().await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.service.name, "ontrak-server");
        assert_eq!(response.checks.len(), 1);
        assert_eq!(response.checks[0].name, "session_store");
    }
}
