// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # HTTP Server
//!
//! warp binding for the schedule and statistics endpoints. Caller identity
//! arrives in the `x-trainer-id` / `x-role` headers (verifying them is the
//! job of the upstream auth layer); every domain error maps to a status
//! code in one rejection handler.

use crate::health::HealthChecker;
use crate::models::Role;
use crate::routes::{
    ErrorBody, ReorderRequest, ScheduleRoutes, StartDayRequest, StatisticsQuery, StatisticsRoutes,
};
use crate::schedule::ScheduleError;
use anyhow::Result;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::Filter;

/// Caller identity established from the request headers
#[derive(Debug, Clone)]
struct Identity {
    trainer_id: String,
    role: Role,
}

/// HTTP API error carried through warp's rejection machinery
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl warp::reject::Reject for ApiError {}

impl ApiError {
    fn missing_identity() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                error: "missing_identity".to_string(),
                message: "The x-trainer-id header is required".to_string(),
            },
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(error: ScheduleError) -> Self {
        let (status, code) = match &error {
            ScheduleError::InvalidDay { .. } => (StatusCode::BAD_REQUEST, "invalid_day"),
            ScheduleError::EmptyDay { .. } => (StatusCode::BAD_REQUEST, "empty_day"),
            ScheduleError::NoNextActivity => (StatusCode::BAD_REQUEST, "no_next_activity"),
            ScheduleError::NoPreviousActivity => {
                (StatusCode::BAD_REQUEST, "no_previous_activity")
            }
            ScheduleError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ScheduleError::TemplateNotFound(_) => (StatusCode::NOT_FOUND, "template_not_found"),
            ScheduleError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ScheduleError::NoActiveSchedule => (StatusCode::NOT_FOUND, "no_active_schedule"),
            ScheduleError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ScheduleError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let message = match &error {
            // Infrastructure details stay in the logs; callers get a
            // retryable generic message.
            ScheduleError::Storage(inner) => {
                warn!("storage failure surfaced to client: {:#}", inner);
                "Temporary storage failure, retry shortly".to_string()
            }
            other => other.to_string(),
        };

        Self {
            status,
            body: ErrorBody {
                error: code.to_string(),
                message,
            },
        }
    }
}

fn reject(error: ScheduleError) -> warp::Rejection {
    warp::reject::custom(ApiError::from(error))
}

/// Extract the caller identity from the request headers
fn with_identity() -> impl Filter<Extract = (Identity,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("x-trainer-id")
        .and(warp::header::optional::<String>("x-role"))
        .and_then(|trainer_id: Option<String>, role: Option<String>| async move {
            match trainer_id.filter(|id| !id.is_empty()) {
                Some(trainer_id) => Ok(Identity {
                    trainer_id,
                    role: Role::from_header(role.as_deref()),
                }),
                None => Err(warp::reject::custom(ApiError::missing_identity())),
            }
        })
}

/// The OnTrak HTTP server
pub struct OnTrakServer {
    schedule: ScheduleRoutes,
    statistics: StatisticsRoutes,
    health: Arc<HealthChecker>,
}

impl OnTrakServer {
    pub fn new(
        schedule: ScheduleRoutes,
        statistics: StatisticsRoutes,
        health: HealthChecker,
    ) -> Self {
        Self {
            schedule,
            statistics,
            health: Arc::new(health),
        }
    }

    /// Run the server until the process is stopped
    pub async fn run(self, port: u16) -> Result<()> {
        info!("HTTP server starting on port {}", port);

        // CORS configuration
        let cors = warp::cors()
            .allow_any_origin()
            .allow_headers(vec!["content-type", "x-trainer-id", "x-role"])
            .allow_methods(vec!["GET", "POST", "PUT", "OPTIONS"]);

        let schedule = self.schedule.clone();
        let start_day = warp::path!("schedule" / "start-day")
            .and(warp::post())
            .and(with_identity())
            .and(warp::body::json())
            .and_then({
                let schedule = schedule.clone();
                move |identity: Identity, request: StartDayRequest| {
                    let schedule = schedule.clone();
                    async move {
                        match schedule.start_day(&identity.trainer_id, request).await {
                            Ok(session) => Ok(warp::reply::with_status(
                                warp::reply::json(&session),
                                StatusCode::CREATED,
                            )),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let next_activity = warp::path!("schedule" / "session" / Uuid / "next" / Uuid)
            .and(warp::post())
            .and(with_identity())
            .and_then({
                let schedule = schedule.clone();
                move |session_id: Uuid, activity_id: Uuid, identity: Identity| {
                    let schedule = schedule.clone();
                    async move {
                        match schedule
                            .next_activity(&identity.trainer_id, session_id, activity_id)
                            .await
                        {
                            Ok(session) => Ok(warp::reply::json(&session)),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let previous_activity = warp::path!("schedule" / "session" / Uuid / "previous" / Uuid)
            .and(warp::post())
            .and(with_identity())
            .and_then({
                let schedule = schedule.clone();
                move |session_id: Uuid, activity_id: Uuid, identity: Identity| {
                    let schedule = schedule.clone();
                    async move {
                        match schedule
                            .previous_activity(&identity.trainer_id, session_id, activity_id)
                            .await
                        {
                            Ok(session) => Ok(warp::reply::json(&session)),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let close_day = warp::path!("schedule" / "close-day")
            .and(warp::post())
            .and(with_identity())
            .and_then({
                let schedule = schedule.clone();
                move |identity: Identity| {
                    let schedule = schedule.clone();
                    async move {
                        match schedule.close_day(&identity.trainer_id).await {
                            Ok(session) => Ok(warp::reply::json(&session)),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let cancel_day = warp::path!("schedule" / "cancel-day")
            .and(warp::post())
            .and(with_identity())
            .and_then({
                let schedule = schedule.clone();
                move |identity: Identity| {
                    let schedule = schedule.clone();
                    async move {
                        match schedule.cancel_day(&identity.trainer_id).await {
                            Ok(session) => Ok(warp::reply::json(&session)),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let current_session = warp::path!("schedule" / "current-session")
            .and(warp::get())
            .and(with_identity())
            .and_then({
                let schedule = schedule.clone();
                move |identity: Identity| {
                    let schedule = schedule.clone();
                    async move {
                        match schedule.current_session(&identity.trainer_id).await {
                            // `null` when no day is running today
                            Ok(session) => Ok(warp::reply::json(&session)),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let reorder = warp::path!("schedule" / "session" / Uuid / "activities")
            .and(warp::put())
            .and(with_identity())
            .and(warp::body::json())
            .and_then({
                let schedule = schedule.clone();
                move |session_id: Uuid, identity: Identity, request: ReorderRequest| {
                    let schedule = schedule.clone();
                    async move {
                        match schedule
                            .reorder(&identity.trainer_id, session_id, request)
                            .await
                        {
                            Ok(session) => Ok(warp::reply::json(&session)),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let active_sessions = warp::path!("schedule" / "active-sessions")
            .and(warp::get())
            .and(with_identity())
            .and_then({
                let schedule = schedule.clone();
                move |identity: Identity| {
                    let schedule = schedule.clone();
                    async move {
                        match schedule.active_sessions(identity.role).await {
                            Ok(listing) => Ok(warp::reply::json(&listing)),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let templates = warp::path!("templates")
            .and(warp::get())
            .and_then({
                let schedule = schedule.clone();
                move || {
                    let schedule = schedule.clone();
                    async move {
                        match schedule.list_templates().await {
                            Ok(listing) => Ok(warp::reply::json(&listing)),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let statistics = self.statistics.clone();
        let statistics_report = warp::path!("statistics")
            .and(warp::get())
            .and(warp::query::<StatisticsQuery>())
            .and_then({
                let statistics = statistics.clone();
                move |query: StatisticsQuery| {
                    let statistics = statistics.clone();
                    async move {
                        match statistics.report(query).await {
                            // Best-effort: degraded slices ride along in
                            // the notes, still a 200.
                            Ok(report) => Ok(warp::reply::json(&report)),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let statistics_export = warp::path!("statistics" / "export")
            .and(warp::get())
            .and(warp::query::<StatisticsQuery>())
            .and_then({
                let statistics = statistics.clone();
                move |query: StatisticsQuery| {
                    let statistics = statistics.clone();
                    async move {
                        match statistics.export_csv(query).await {
                            Ok(csv) => Ok(warp::reply::with_header(
                                csv,
                                "content-type",
                                "text/csv",
                            )),
                            Err(e) => Err(reject(e)),
                        }
                    }
                }
            });

        let health_checker = self.health.clone();
        let health = warp::path!("health").and(warp::get()).and_then(move || {
            let health_checker = health_checker.clone();
            async move {
                let response = health_checker.check().await;
                Ok::<_, warp::Rejection>(warp::reply::json(&response))
            }
        });

        let routes = start_day
            .or(next_activity)
            .or(previous_activity)
            .or(close_day)
            .or(cancel_day)
            .or(current_session)
            .or(reorder)
            .or(active_sessions)
            .or(templates)
            .or(statistics_export)
            .or(statistics_report)
            .or(health)
            .with(cors)
            .recover(handle_rejection);

        info!("HTTP server ready on port {}", port);
        warp::serve(routes).run(([127, 0, 0, 1], port)).await;

        Ok(())
    }
}

/// Handle HTTP rejections and errors
async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    if let Some(api_error) = err.find::<ApiError>() {
        let json = warp::reply::json(&api_error.body);
        Ok(warp::reply::with_status(json, api_error.status))
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        let json = warp::reply::json(&serde_json::json!({
            "error": "validation",
            "message": "Malformed request body"
        }));
        Ok(warp::reply::with_status(json, StatusCode::BAD_REQUEST))
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        let json = warp::reply::json(&serde_json::json!({
            "error": "validation",
            "message": "Malformed query string"
        }));
        Ok(warp::reply::with_status(json, StatusCode::BAD_REQUEST))
    } else if err.is_not_found() {
        let json = warp::reply::json(&serde_json::json!({
            "error": "not_found",
            "message": "The requested endpoint was not found"
        }));
        Ok(warp::reply::with_status(json, StatusCode::NOT_FOUND))
    } else {
        let json = warp::reply::json(&serde_json::json!({
            "error": "internal",
            "message": "Something went wrong"
        }));
        Ok(warp::reply::with_status(json, StatusCode::INTERNAL_SERVER_ERROR))
    }
}
