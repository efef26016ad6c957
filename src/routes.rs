// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! HTTP route handlers for schedule execution and statistics queries
//!
//! Payloads are explicit records rather than permissive maps, so an
//! illegal request (a day as a string, a non-numeric order entry) is
//! rejected at deserialization before any state is touched.

use crate::catalog::{TemplateSource, TrainerDirectory};
use crate::models::{Role, ScheduleSession, StatisticsFilter};
use crate::schedule::{ScheduleError, ScheduleService};
use crate::statistics::{StatisticsEngine, StatisticsReport};
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Body of `POST /schedule/start-day`
#[derive(Debug, Clone, Deserialize)]
pub struct StartDayRequest {
    pub template_id: String,
    pub day: u32,
    /// Optional session title; defaults to "<template> - day N"
    #[serde(default)]
    pub title: Option<String>,
}

/// Body of `PUT /schedule/session/{id}/activities`
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    /// `order[pos] = src`: the activity currently at `src` moves to `pos`
    pub order: Vec<usize>,
}

/// Error payload returned on every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Catalog summary for `GET /templates`
#[derive(Debug, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub total_days: u32,
}

/// One row of the privileged `GET /schedule/active-sessions` listing
#[derive(Debug, Serialize)]
pub struct ActiveSessionSummary {
    pub session_id: Uuid,
    pub title: String,
    pub trainer_id: String,
    pub trainer_name: String,
    pub training: String,
    pub current_activity: Option<String>,
    pub day: u32,
    pub started_at: String,
}

/// Query string of `GET /statistics`; empty or "all" means unfiltered
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatisticsQuery {
    #[serde(default)]
    pub trainer: Option<String>,
    #[serde(default)]
    pub training: Option<String>,
    /// Day number; empty or "all" means every day
    #[serde(default)]
    pub day: Option<String>,
    /// Inclusive range start, `YYYY-MM-DD`
    #[serde(default)]
    pub from: Option<String>,
    /// Inclusive range end, `YYYY-MM-DD`
    #[serde(default)]
    pub to: Option<String>,
}

impl StatisticsQuery {
    /// Convert the raw query into a validated filter
    pub fn into_filter(self) -> Result<StatisticsFilter, ScheduleError> {
        let day = match normalize_dimension(self.day) {
            None => None,
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| {
                ScheduleError::Validation(format!("Invalid day '{raw}'"))
            })?),
        };

        let from = self.from.filter(|v| !v.is_empty());
        let to = self.to.filter(|v| !v.is_empty());
        let date_range = match (from, to) {
            (None, None) => None,
            (from, to) => {
                let from = parse_date(from.as_deref(), "from")?;
                let to = parse_date(to.as_deref(), "to")?;
                if from > to {
                    return Err(ScheduleError::Validation(
                        "Date range start is after its end".to_string(),
                    ));
                }
                Some((from, to))
            }
        };

        Ok(StatisticsFilter {
            trainer_id: normalize_dimension(self.trainer),
            training_id: normalize_dimension(self.training),
            day,
            date_range,
        })
    }
}

fn normalize_dimension(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "all")
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, ScheduleError> {
    let value = value.ok_or_else(|| {
        ScheduleError::Validation(format!("Date range needs both ends, '{field}' is missing"))
    })?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ScheduleError::Validation(format!("Invalid date '{value}' for '{field}'")))
}

/// Handlers for the schedule execution endpoints
#[derive(Clone)]
pub struct ScheduleRoutes {
    service: Arc<ScheduleService>,
    templates: Arc<dyn TemplateSource>,
    trainers: Arc<dyn TrainerDirectory>,
}

impl ScheduleRoutes {
    pub fn new(
        service: Arc<ScheduleService>,
        templates: Arc<dyn TemplateSource>,
        trainers: Arc<dyn TrainerDirectory>,
    ) -> Self {
        Self {
            service,
            templates,
            trainers,
        }
    }

    pub async fn start_day(
        &self,
        trainer_id: &str,
        request: StartDayRequest,
    ) -> Result<ScheduleSession, ScheduleError> {
        info!(
            "start-day request from {}: template {} day {}",
            trainer_id, request.template_id, request.day
        );
        self.service
            .start_day(trainer_id, &request.template_id, request.day, request.title)
            .await
    }

    pub async fn next_activity(
        &self,
        trainer_id: &str,
        session_id: Uuid,
        activity_id: Uuid,
    ) -> Result<ScheduleSession, ScheduleError> {
        self.service.advance(trainer_id, session_id, activity_id).await
    }

    pub async fn previous_activity(
        &self,
        trainer_id: &str,
        session_id: Uuid,
        activity_id: Uuid,
    ) -> Result<ScheduleSession, ScheduleError> {
        self.service.retreat(trainer_id, session_id, activity_id).await
    }

    pub async fn close_day(&self, trainer_id: &str) -> Result<ScheduleSession, ScheduleError> {
        self.service.close_day(trainer_id).await
    }

    pub async fn cancel_day(&self, trainer_id: &str) -> Result<ScheduleSession, ScheduleError> {
        self.service.cancel_day(trainer_id).await
    }

    pub async fn current_session(
        &self,
        trainer_id: &str,
    ) -> Result<Option<ScheduleSession>, ScheduleError> {
        self.service.current_session(trainer_id).await
    }

    pub async fn reorder(
        &self,
        trainer_id: &str,
        session_id: Uuid,
        request: ReorderRequest,
    ) -> Result<ScheduleSession, ScheduleError> {
        self.service
            .reorder(trainer_id, session_id, &request.order)
            .await
    }

    /// Read-through listing of the template catalog
    pub async fn list_templates(&self) -> Result<Vec<TemplateSummary>, ScheduleError> {
        let templates = self.templates.list_templates().await?;
        Ok(templates
            .into_iter()
            .map(|t| TemplateSummary {
                id: t.id,
                name: t.name,
                total_days: t.total_days,
            })
            .collect())
    }

    /// Privileged listing of every running session
    pub async fn active_sessions(
        &self,
        role: Role,
    ) -> Result<Vec<ActiveSessionSummary>, ScheduleError> {
        if role != Role::Admin {
            return Err(ScheduleError::Forbidden);
        }

        let sessions = self.service.active_sessions().await?;
        let trainers = self.trainers.list_trainers().await.unwrap_or_default();

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            let trainer_name = trainers
                .iter()
                .find(|t| t.id == session.trainer_id)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| session.trainer_id.clone());
            let training = self
                .templates
                .get_template(&session.template_id)
                .await
                .ok()
                .flatten()
                .map(|t| t.name)
                .unwrap_or_else(|| session.template_id.clone());

            summaries.push(ActiveSessionSummary {
                session_id: session.id,
                title: session.title.clone(),
                trainer_id: session.trainer_id.clone(),
                trainer_name,
                training,
                current_activity: session.active_activity().map(|a| a.name.clone()),
                day: session.selected_day,
                started_at: session.created_at.to_rfc3339(),
            });
        }
        Ok(summaries)
    }
}

/// Handlers for the statistics endpoints
#[derive(Clone)]
pub struct StatisticsRoutes {
    engine: Arc<StatisticsEngine>,
}

impl StatisticsRoutes {
    pub fn new(engine: Arc<StatisticsEngine>) -> Self {
        Self { engine }
    }

    /// Build the best-effort report; only filter validation can fail
    pub async fn report(
        &self,
        query: StatisticsQuery,
    ) -> Result<StatisticsReport, ScheduleError> {
        let filter = query.into_filter()?;
        Ok(self.engine.report(&filter).await)
    }

    /// Export the raw adherence rows as CSV
    pub async fn export_csv(&self, query: StatisticsQuery) -> Result<String, ScheduleError> {
        let filter = query.into_filter()?;
        let report = self.engine.report(&filter).await;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &report.adherence {
            writer
                .serialize(row)
                .map_err(|e| ScheduleError::Storage(e.into()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ScheduleError::Storage(e.into()))?;
        String::from_utf8(bytes).map_err(|e| ScheduleError::Storage(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::database::Database;
    use crate::models::{PlannedActivity, Template, Trainer};
    use crate::notifier::NoopNotifier;
    use chrono::NaiveTime;

    fn query(
        trainer: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> StatisticsQuery {
        StatisticsQuery {
            trainer: trainer.map(str::to_string),
            training: None,
            day: None,
            from: from.map(str::to_string),
            to: to.map(str::to_string),
        }
    }

    #[test]
    fn all_and_empty_collapse_to_unfiltered() {
        let filter = query(Some("all"), None, None).into_filter().unwrap();
        assert!(filter.trainer_id.is_none());

        let filter = query(Some(""), None, None).into_filter().unwrap();
        assert!(filter.trainer_id.is_none());

        let filter = query(Some("trainer-1"), None, None).into_filter().unwrap();
        assert_eq!(filter.trainer_id.as_deref(), Some("trainer-1"));
    }

    #[test]
    fn day_accepts_numbers_and_all() {
        let base = StatisticsQuery::default();

        let filter = StatisticsQuery {
            day: Some("2".to_string()),
            ..base.clone()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.day, Some(2));

        for raw in ["", "all"] {
            let filter = StatisticsQuery {
                day: Some(raw.to_string()),
                ..base.clone()
            }
            .into_filter()
            .unwrap();
            assert!(filter.day.is_none());
        }

        assert!(StatisticsQuery {
            day: Some("two".to_string()),
            ..base
        }
        .into_filter()
        .is_err());
    }

    #[test]
    fn date_range_needs_both_valid_ends() {
        let filter = query(None, Some("2024-03-01"), Some("2024-03-31"))
            .into_filter()
            .unwrap();
        assert!(filter.date_range.is_some());

        assert!(query(None, Some("2024-03-01"), None).into_filter().is_err());
        assert!(query(None, Some("not a date"), Some("2024-03-31"))
            .into_filter()
            .is_err());
        assert!(query(None, Some("2024-04-01"), Some("2024-03-01"))
            .into_filter()
            .is_err());
    }

    fn test_template() -> Template {
        Template {
            id: "onboarding".to_string(),
            name: "Onboarding week".to_string(),
            description: None,
            total_days: 1,
            activities: vec![PlannedActivity {
                day: 1,
                name: "Warmup".to_string(),
                scheduled_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                duration_minutes: 15,
                description: None,
                tags: vec![],
            }],
        }
    }

    async fn schedule_routes() -> ScheduleRoutes {
        let database = Database::new("sqlite::memory:").await.unwrap();
        let catalog = Arc::new(StaticCatalog::new(
            vec![test_template()],
            vec![Trainer {
                id: "trainer-1".to_string(),
                name: "Alice".to_string(),
            }],
        ));
        let service = Arc::new(ScheduleService::new(
            database,
            catalog.clone(),
            Arc::new(NoopNotifier),
        ));
        ScheduleRoutes::new(service, catalog.clone(), catalog)
    }

    #[tokio::test]
    async fn active_sessions_require_the_admin_role() {
        let routes = schedule_routes().await;
        let err = routes.active_sessions(Role::Trainer).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Forbidden));
        assert!(routes.active_sessions(Role::Admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn active_sessions_resolve_names() {
        let routes = schedule_routes().await;
        routes
            .start_day(
                "trainer-1",
                StartDayRequest {
                    template_id: "onboarding".to_string(),
                    day: 1,
                    title: None,
                },
            )
            .await
            .unwrap();

        let listing = routes.active_sessions(Role::Admin).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].trainer_name, "Alice");
        assert_eq!(listing[0].training, "Onboarding week");
        assert_eq!(listing[0].current_activity.as_deref(), Some("Warmup"));
        assert_eq!(listing[0].day, 1);
    }

    #[tokio::test]
    async fn template_listing_is_summarized() {
        let routes = schedule_routes().await;
        let templates = routes.list_templates().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].id, "onboarding");
        assert_eq!(templates[0].total_days, 1);
    }
}
