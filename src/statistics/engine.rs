// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Statistics engine turning completed sessions into variance and
//! punctuality metrics.
//!
//! The engine issues three independent bounded fetches (templates,
//! trainers, session history) and degrades any slice that fails or runs
//! past its deadline to an empty default, so one slow dependency can never
//! hang the whole report. Per-trainer variance re-runs the occurrence scan
//! with the trainer fixed rather than decomposing the all-trainers result,
//! because the trainer, training and day filters interact multiplicatively.

use super::{
    format_minutes, AdherenceRow, DayActivityStats, DayStats, RankedActivity, StatisticsReport,
    TrainerVariance, TrainingVariance,
};
use crate::catalog::{TemplateSource, TrainerDirectory};
use crate::database::Database;
use crate::models::{ScheduleSession, SessionStatus, StatisticsFilter};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{error::Elapsed, timeout};
use tracing::warn;

/// Default budget for each of the three backing fetches
pub const DEFAULT_FETCH_DEADLINE: Duration = Duration::from_secs(10);

/// Read-only aggregation over historical schedule sessions
pub struct StatisticsEngine {
    database: Database,
    templates: Arc<dyn TemplateSource>,
    trainers: Arc<dyn TrainerDirectory>,
    fetch_deadline: Duration,
}

impl StatisticsEngine {
    pub fn new(
        database: Database,
        templates: Arc<dyn TemplateSource>,
        trainers: Arc<dyn TrainerDirectory>,
    ) -> Self {
        Self {
            database,
            templates,
            trainers,
            fetch_deadline: DEFAULT_FETCH_DEADLINE,
        }
    }

    /// Override the per-fetch deadline
    pub fn with_fetch_deadline(mut self, deadline: Duration) -> Self {
        self.fetch_deadline = deadline;
        self
    }

    /// Build the best-effort report for a filter.
    ///
    /// Always returns a well-formed report; degraded slices show up as
    /// empty defaults plus a note, never as an error.
    pub async fn report(&self, filter: &StatisticsFilter) -> StatisticsReport {
        let mut notes = Vec::new();

        let (templates_fetch, trainers_fetch, sessions_fetch) = tokio::join!(
            timeout(self.fetch_deadline, self.templates.list_templates()),
            timeout(self.fetch_deadline, self.trainers.list_trainers()),
            timeout(
                self.fetch_deadline,
                self.database.completed_sessions(filter.date_range)
            ),
        );

        let templates = flatten_fetch(templates_fetch, "template catalog", &mut notes);
        let trainers = flatten_fetch(trainers_fetch, "trainer directory", &mut notes);
        let sessions = Arc::new(flatten_fetch(sessions_fetch, "session history", &mut notes));

        let occurrences = scan_occurrences(&sessions, filter);

        let total_completed_days = sessions
            .iter()
            .filter(|s| filter.matches(s) && session_qualifies(s))
            .count();

        let on_time = occurrences.iter().filter(|o| o.on_time).count();
        let on_time_start_rate = if occurrences.is_empty() {
            0
        } else {
            ((on_time as f64 / occurrences.len() as f64) * 100.0).round() as u32
        };

        let adherence = occurrences
            .iter()
            .map(|o| AdherenceRow {
                activity_name: o.activity_name.clone(),
                training_id: o.training_id.clone(),
                trainer_id: o.trainer_id.clone(),
                day: o.day,
                date: o.date,
                on_time: o.on_time,
                delayed: !o.on_time,
                start_variance_minutes: o.start_variance,
                duration_variance_minutes: o.duration_variance,
            })
            .collect();

        let trainings = templates
            .iter()
            .map(|template| TrainingVariance {
                id: template.id.clone(),
                name: template.name.clone(),
                time_variance: mean_rounded(
                    occurrences
                        .iter()
                        .filter(|o| o.training_id == template.id)
                        .map(|o| o.duration_variance),
                ),
            })
            .collect();

        // One concurrent sub-scan per trainer with the trainer pinned.
        let mut handles = Vec::with_capacity(trainers.len());
        for trainer in &trainers {
            let sessions = Arc::clone(&sessions);
            let trainer_filter = filter.with_trainer(&trainer.id);
            let trainer = trainer.clone();
            handles.push(tokio::spawn(async move {
                let scoped = scan_occurrences(&sessions, &trainer_filter);
                TrainerVariance {
                    id: trainer.id,
                    name: trainer.name,
                    time_variance: mean_rounded(scoped.iter().map(|o| o.duration_variance)),
                }
            }));
        }
        let mut trainer_variances = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(variance) => trainer_variances.push(variance),
                Err(error) => warn!("per-trainer variance task failed: {}", error),
            }
        }

        let day_specific_stats = day_breakdowns(&occurrences);

        // Rankings span the whole trainer population.
        let ranking_scope = filter.without_trainer();
        let ranking_occurrences = scan_occurrences(&sessions, &ranking_scope);
        let (most_delayed_activities, most_efficient_activities) =
            rank_activities(&ranking_occurrences);

        StatisticsReport {
            adherence,
            on_time_start_rate,
            total_completed_days,
            most_delayed_activities,
            most_efficient_activities,
            trainings,
            trainers: trainer_variances,
            day_specific_stats,
            notes,
        }
    }
}

/// One qualifying activity occurrence
#[derive(Debug, Clone)]
struct Occurrence {
    activity_name: String,
    training_id: String,
    trainer_id: String,
    day: u32,
    date: NaiveDate,
    start_variance: i64,
    duration_variance: i64,
    actual_duration: i64,
    planned_duration: i64,
    on_time: bool,
}

/// Punctuality threshold in minutes: `max(5, planned * 0.10)`
fn punctuality_threshold(planned_minutes: i64) -> f64 {
    f64::max(5.0, planned_minutes as f64 * 0.10)
}

fn is_on_time(start_variance: i64, planned_minutes: i64) -> bool {
    (start_variance.abs() as f64) <= punctuality_threshold(planned_minutes)
}

/// Whether a session contributes anything to the statistics
fn session_qualifies(session: &ScheduleSession) -> bool {
    session.status == SessionStatus::Completed
        && session
            .activities
            .iter()
            .any(|a| a.completed && a.is_fully_timed())
}

/// Collect every qualifying activity occurrence under a filter
fn scan_occurrences(sessions: &[ScheduleSession], filter: &StatisticsFilter) -> Vec<Occurrence> {
    let mut occurrences = Vec::new();
    for session in sessions {
        if session.status != SessionStatus::Completed || !filter.matches(session) {
            continue;
        }
        for activity in &session.activities {
            if !activity.completed || !activity.is_fully_timed() {
                continue;
            }
            let (actual_start, actual_end) = match (activity.actual_start, activity.actual_end) {
                (Some(start), Some(end)) => (start, end),
                _ => continue,
            };

            let scheduled = session
                .calendar_date()
                .and_time(activity.scheduled_start)
                .and_utc();
            let start_variance = (actual_start - scheduled).num_minutes();
            let actual_duration = (actual_end - actual_start).num_minutes();

            occurrences.push(Occurrence {
                activity_name: activity.name.clone(),
                training_id: session.template_id.clone(),
                trainer_id: session.trainer_id.clone(),
                day: session.selected_day,
                date: session.calendar_date(),
                start_variance,
                duration_variance: actual_duration - activity.duration_minutes,
                actual_duration,
                planned_duration: activity.duration_minutes,
                on_time: is_on_time(start_variance, activity.duration_minutes),
            });
        }
    }
    occurrences
}

/// Mean rounded to the nearest minute; 0 for an empty set
fn mean_rounded(values: impl Iterator<Item = i64>) -> i64 {
    let values: Vec<i64> = values.collect();
    if values.is_empty() {
        return 0;
    }
    let sum: i64 = values.iter().sum();
    (sum as f64 / values.len() as f64).round() as i64
}

fn mean_f64(values: impl Iterator<Item = i64>) -> f64 {
    let values: Vec<i64> = values.collect();
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

/// Group occurrences into per-(training, day) per-activity breakdowns
fn day_breakdowns(occurrences: &[Occurrence]) -> Vec<DayStats> {
    let mut grouped: BTreeMap<(String, u32), BTreeMap<String, Vec<&Occurrence>>> = BTreeMap::new();
    for occurrence in occurrences {
        grouped
            .entry((occurrence.training_id.clone(), occurrence.day))
            .or_default()
            .entry(occurrence.activity_name.clone())
            .or_default()
            .push(occurrence);
    }

    grouped
        .into_iter()
        .map(|((training_id, day), activities)| DayStats {
            training_id,
            day,
            activities: activities
                .into_iter()
                .map(|(activity_name, group)| DayActivityStats {
                    activity_name,
                    mean_duration_variance: mean_rounded(
                        group.iter().map(|o| o.duration_variance),
                    ),
                    mean_actual_duration: mean_rounded(group.iter().map(|o| o.actual_duration)),
                })
                .collect(),
        })
        .collect()
}

/// Rank activities by mean actual minus mean planned duration
fn rank_activities(occurrences: &[Occurrence]) -> (Vec<RankedActivity>, Vec<RankedActivity>) {
    let mut by_name: BTreeMap<&str, Vec<&Occurrence>> = BTreeMap::new();
    for occurrence in occurrences {
        by_name
            .entry(occurrence.activity_name.as_str())
            .or_default()
            .push(occurrence);
    }

    let mut scored: Vec<(String, f64, f64, f64)> = by_name
        .into_iter()
        .map(|(name, group)| {
            let mean_actual = mean_f64(group.iter().map(|o| o.actual_duration));
            let mean_planned = mean_f64(group.iter().map(|o| o.planned_duration));
            (name.to_string(), mean_actual - mean_planned, mean_actual, mean_planned)
        })
        .collect();

    let ranked = |entries: &[(String, f64, f64, f64)]| -> Vec<RankedActivity> {
        entries
            .iter()
            .take(5)
            .map(|(name, diff, mean_actual, mean_planned)| RankedActivity {
                activity_name: name.clone(),
                variance_minutes: diff.round() as i64,
                average_actual_duration: format_minutes(mean_actual.round() as i64),
                average_planned_duration: format_minutes(mean_planned.round() as i64),
            })
            .collect()
    };

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    let delayed: Vec<_> = scored.iter().filter(|e| e.1 > 0.0).cloned().collect();
    let most_delayed = ranked(&delayed);

    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    let efficient: Vec<_> = scored.iter().filter(|e| e.1 < 0.0).cloned().collect();
    let most_efficient = ranked(&efficient);

    (most_delayed, most_efficient)
}

fn flatten_fetch<T>(
    result: Result<anyhow::Result<Vec<T>>, Elapsed>,
    what: &str,
    notes: &mut Vec<String>,
) -> Vec<T> {
    match result {
        Ok(Ok(values)) => values,
        Ok(Err(error)) => {
            warn!("statistics fetch failed for {}: {:#}", what, error);
            notes.push(format!("could not load {what}"));
            Vec::new()
        }
        Err(_) => {
            warn!("statistics fetch for {} ran past its deadline", what);
            notes.push(format!("could not load {what} (timed out)"));
            Vec::new()
        }
    }
}
