// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Data Models
//!
//! This module contains the core data structures shared by the schedule
//! state machine and the statistics engine: program templates, live
//! schedule sessions, and the per-activity execution records embedded in
//! them.
//!
//! ## Design Principles
//!
//! - **Snapshot friendly**: every model serializes to JSON so a session can
//!   be broadcast as a complete-state snapshot
//! - **Index as truth**: the current activity of a session is `active_index`,
//!   never re-derived by scanning for a flag
//! - **Type Safe**: status enums instead of string states
//!
//! ## Core Models
//!
//! - [`Template`]: immutable multi-day program definition with planned activities
//! - [`ScheduleSession`]: one trainer's live or historical execution of a single day
//! - [`ActivityExecution`]: one activity's planned-vs-actual execution record

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable multi-day program definition
///
/// Templates come from the external template source and are never mutated
/// by this crate. Activities are declared in catalog order; for a given day
/// they are orderable by `scheduled_start`, with declaration order breaking
/// ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Catalog identifier of the template
    pub id: String,
    /// Human-readable program name
    pub name: String,
    /// Optional program description
    #[serde(default)]
    pub description: Option<String>,
    /// Number of days in the program (activities reference days `1..=total_days`)
    pub total_days: u32,
    /// Planned activities across all days, in declaration order
    pub activities: Vec<PlannedActivity>,
}

/// A single planned activity within a template day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedActivity {
    /// Day of the program this activity belongs to (1-based)
    pub day: u32,
    /// Activity name, also the grouping key for statistics rankings
    pub name: String,
    /// Planned clock time the activity should start
    pub scheduled_start: NaiveTime,
    /// Planned duration in minutes
    pub duration_minutes: i64,
    /// Optional free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional tags carried through for consumers
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Template {
    /// Planned activities for one day, sorted by scheduled start.
    ///
    /// The sort is stable, so activities sharing a scheduled start keep
    /// their declaration order.
    pub fn activities_for_day(&self, day: u32) -> Vec<&PlannedActivity> {
        let mut activities: Vec<&PlannedActivity> =
            self.activities.iter().filter(|a| a.day == day).collect();
        activities.sort_by_key(|a| a.scheduled_start);
        activities
    }

    /// Whether `day` falls inside the program
    pub fn contains_day(&self, day: u32) -> bool {
        day >= 1 && day <= self.total_days
    }
}

/// Execution state of a single activity within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// Not reached yet
    Pending,
    /// Currently running (exactly one per active session)
    InProgress,
    /// Finished, timestamps recorded
    Completed,
    /// Abandoned by a day cancellation or a session takeover
    Cancelled,
}

/// One activity's planned-vs-actual execution record within a session
///
/// Planned fields are copied from the template at session creation so the
/// record stays meaningful even if the template is later edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityExecution {
    /// Identifier of this execution record (not the template activity)
    pub id: Uuid,
    /// Activity name copied from the plan
    pub name: String,
    /// Description copied from the plan
    #[serde(default)]
    pub description: Option<String>,
    /// Planned clock start, possibly rewritten by a manual reorder
    pub scheduled_start: NaiveTime,
    /// Planned duration in minutes
    pub duration_minutes: i64,
    /// Execution state
    pub status: ActivityStatus,
    /// Whether this is the session's current activity
    pub is_active: bool,
    /// Whether this activity finished (kept alongside `status` for
    /// snapshot consumers that only render a checkmark)
    pub completed: bool,
    /// When the activity actually started, if it ever ran
    pub actual_start: Option<DateTime<Utc>>,
    /// When the activity actually ended, if it finished
    pub actual_end: Option<DateTime<Utc>>,
}

impl ActivityExecution {
    /// Build a pending execution record from a planned activity
    pub fn from_planned(planned: &PlannedActivity) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: planned.name.clone(),
            description: planned.description.clone(),
            scheduled_start: planned.scheduled_start,
            duration_minutes: planned.duration_minutes,
            status: ActivityStatus::Pending,
            is_active: false,
            completed: false,
            actual_start: None,
            actual_end: None,
        }
    }

    /// Whether both actual timestamps are present (qualifies the record
    /// for statistics)
    pub fn is_fully_timed(&self) -> bool {
        self.actual_start.is_some() && self.actual_end.is_some()
    }
}

/// Lifecycle state of a schedule session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// A day is being executed right now
    Active,
    /// Closed normally; eligible for statistics
    Completed,
    /// Abandoned; retained for history but excluded from statistics
    Cancelled,
}

impl SessionStatus {
    /// Stored string form (also the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

/// One trainer's live or historical execution of a single template day
///
/// Invariants while `status == Active`:
/// - exactly one activity has `is_active == true`, and it sits at
///   `active_index`
/// - every activity before `active_index` is completed or cancelled
/// - every activity after `active_index` is pending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSession {
    /// Session identifier
    pub id: Uuid,
    /// Display title, e.g. "Onboarding week - day 2"
    pub title: String,
    /// Template this session was started from
    pub template_id: String,
    /// Trainer who owns and exclusively mutates this session
    pub trainer_id: String,
    /// Which day of the template is being executed (1-based)
    pub selected_day: u32,
    /// Ordered execution records, fixed length from creation
    pub activities: Vec<ActivityExecution>,
    /// Position of the current activity
    pub active_index: usize,
    /// Lifecycle state
    pub status: SessionStatus,
    /// When the day was started
    pub created_at: DateTime<Utc>,
}

impl ScheduleSession {
    /// The current activity, by index
    pub fn active_activity(&self) -> Option<&ActivityExecution> {
        self.activities.get(self.active_index)
    }

    /// Mutable access to the current activity, by index
    pub fn active_activity_mut(&mut self) -> Option<&mut ActivityExecution> {
        self.activities.get_mut(self.active_index)
    }

    /// Calendar date the session ran on, used to resolve planned clock
    /// times into full timestamps
    pub fn calendar_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

/// A trainer known to the external trainer directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trainer {
    pub id: String,
    pub name: String,
}

/// Caller role established at the boundary
///
/// Token verification is the job of the external auth collaborator; this
/// crate only enforces that privileged reads carry the elevated role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Trainer,
    Admin,
}

impl Role {
    /// Parse a role header value; anything unrecognized is a plain trainer
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("admin") => Role::Admin,
            _ => Role::Trainer,
        }
    }
}

/// Filter for statistics queries; `None` means "all"
#[derive(Debug, Clone, Default)]
pub struct StatisticsFilter {
    pub trainer_id: Option<String>,
    pub training_id: Option<String>,
    pub day: Option<u32>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl StatisticsFilter {
    /// Whether a session passes the trainer/training/day/date narrowing
    pub fn matches(&self, session: &ScheduleSession) -> bool {
        if let Some(trainer_id) = &self.trainer_id {
            if &session.trainer_id != trainer_id {
                return false;
            }
        }
        if let Some(training_id) = &self.training_id {
            if &session.template_id != training_id {
                return false;
            }
        }
        if let Some(day) = self.day {
            if session.selected_day != day {
                return false;
            }
        }
        if let Some((from, to)) = self.date_range {
            let date = session.calendar_date();
            if date < from || date > to {
                return false;
            }
        }
        true
    }

    /// Same filter with the trainer pinned, used for per-trainer re-scans
    pub fn with_trainer(&self, trainer_id: &str) -> Self {
        Self {
            trainer_id: Some(trainer_id.to_string()),
            ..self.clone()
        }
    }

    /// Same filter with the trainer dimension removed, used for the
    /// activity rankings which span the whole trainer population
    pub fn without_trainer(&self) -> Self {
        Self {
            trainer_id: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(day: u32, name: &str, start: (u32, u32), minutes: i64) -> PlannedActivity {
        PlannedActivity {
            day,
            name: name.to_string(),
            scheduled_start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            duration_minutes: minutes,
            description: None,
            tags: vec![],
        }
    }

    fn template() -> Template {
        Template {
            id: "onboarding".to_string(),
            name: "Onboarding week".to_string(),
            description: None,
            total_days: 2,
            activities: vec![
                planned(1, "Welcome", (9, 30), 30),
                planned(1, "Warmup", (9, 0), 15),
                planned(2, "Review", (10, 0), 45),
            ],
        }
    }

    #[test]
    fn activities_for_day_sorts_by_scheduled_start() {
        let template = template();
        let day1: Vec<&str> = template
            .activities_for_day(1)
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(day1, vec!["Warmup", "Welcome"]);
        assert_eq!(template.activities_for_day(2).len(), 1);
        assert!(template.activities_for_day(3).is_empty());
    }

    #[test]
    fn activities_for_day_keeps_declaration_order_on_ties() {
        let mut template = template();
        template.activities = vec![
            planned(1, "First declared", (9, 0), 10),
            planned(1, "Second declared", (9, 0), 10),
        ];
        let names: Vec<&str> = template
            .activities_for_day(1)
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["First declared", "Second declared"]);
    }

    #[test]
    fn contains_day_bounds() {
        let template = template();
        assert!(!template.contains_day(0));
        assert!(template.contains_day(1));
        assert!(template.contains_day(2));
        assert!(!template.contains_day(3));
    }

    #[test]
    fn execution_from_planned_starts_pending() {
        let activity = ActivityExecution::from_planned(&planned(1, "Warmup", (9, 0), 15));
        assert_eq!(activity.status, ActivityStatus::Pending);
        assert!(!activity.is_active);
        assert!(!activity.completed);
        assert!(!activity.is_fully_timed());
    }

    #[test]
    fn role_from_header_defaults_to_trainer() {
        assert_eq!(Role::from_header(Some("admin")), Role::Admin);
        assert_eq!(Role::from_header(Some("trainer")), Role::Trainer);
        assert_eq!(Role::from_header(Some("root")), Role::Trainer);
        assert_eq!(Role::from_header(None), Role::Trainer);
    }

    #[test]
    fn filter_matches_all_dimensions() {
        let session = ScheduleSession {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            template_id: "onboarding".to_string(),
            trainer_id: "trainer-1".to_string(),
            selected_day: 1,
            activities: vec![],
            active_index: 0,
            status: SessionStatus::Completed,
            created_at: Utc::now(),
        };

        assert!(StatisticsFilter::default().matches(&session));
        assert!(StatisticsFilter {
            trainer_id: Some("trainer-1".to_string()),
            training_id: Some("onboarding".to_string()),
            day: Some(1),
            date_range: None,
        }
        .matches(&session));
        assert!(!StatisticsFilter {
            trainer_id: Some("trainer-2".to_string()),
            ..Default::default()
        }
        .matches(&session));
        assert!(!StatisticsFilter {
            day: Some(2),
            ..Default::default()
        }
        .matches(&session));
    }
}
