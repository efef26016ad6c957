// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Statistics Module
//!
//! Aggregation of historical schedule sessions into performance metrics
//! sliced by trainer, training and day.
//!
//! This module includes:
//! - Per-occurrence adherence records (raw rows, CSV-exportable)
//! - Punctuality classification against the `max(5, 10%)` threshold
//! - Per-training and per-trainer time variance
//! - Per-(training, day) activity breakdowns
//! - Most delayed / most efficient activity rankings
//!
//! The engine only ever reads session records; reports are best-effort and
//! keep a well-formed shape even when a backing directory fails.

use serde::{Deserialize, Serialize};

pub mod engine;

pub use engine::StatisticsEngine;

/// One qualifying activity occurrence, kept as a raw row.
///
/// Rows are deliberately not deduplicated so they can be exported as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdherenceRow {
    /// Activity name as executed
    pub activity_name: String,
    /// Template the session was started from
    pub training_id: String,
    /// Owning trainer
    pub trainer_id: String,
    /// Day of the program
    pub day: u32,
    /// Calendar date of the session
    pub date: chrono::NaiveDate,
    /// Start was within the punctuality threshold
    pub on_time: bool,
    /// Start missed the punctuality threshold
    pub delayed: bool,
    /// Actual start minus scheduled start, minutes, signed
    pub start_variance_minutes: i64,
    /// Actual duration minus planned duration, minutes, signed
    pub duration_variance_minutes: i64,
}

/// Averaged time variance for one training program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingVariance {
    pub id: String,
    pub name: String,
    /// Mean duration variance across qualifying occurrences, rounded to
    /// the nearest minute; 0 when the training has no occurrences
    pub time_variance: i64,
}

/// Averaged time variance for one trainer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerVariance {
    pub id: String,
    pub name: String,
    pub time_variance: i64,
}

/// One activity in the delayed/efficient rankings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedActivity {
    pub activity_name: String,
    /// Mean actual minus mean planned duration, rounded minutes
    pub variance_minutes: i64,
    /// Mean actual duration, formatted as "Xh Ymin" or "Ymin"
    pub average_actual_duration: String,
    /// Mean planned duration, same formatting
    pub average_planned_duration: String,
}

/// Per-activity breakdown within one (training, day) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayActivityStats {
    pub activity_name: String,
    pub mean_duration_variance: i64,
    pub mean_actual_duration: i64,
}

/// Per-(training, day) statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayStats {
    pub training_id: String,
    pub day: u32,
    pub activities: Vec<DayActivityStats>,
}

/// The full best-effort statistics report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsReport {
    /// Raw per-occurrence rows
    pub adherence: Vec<AdherenceRow>,
    /// Percentage of occurrences that started on time; 0 when none
    pub on_time_start_rate: u32,
    /// Number of qualifying completed sessions
    pub total_completed_days: usize,
    /// Top 5 activities running longest over plan
    pub most_delayed_activities: Vec<RankedActivity>,
    /// Top 5 activities running shortest under plan
    pub most_efficient_activities: Vec<RankedActivity>,
    /// Per-training averaged variance (every catalog training listed)
    pub trainings: Vec<TrainingVariance>,
    /// Per-trainer averaged variance (every directory trainer listed)
    pub trainers: Vec<TrainerVariance>,
    /// Per-(training, day) activity breakdowns, sorted by training then day
    pub day_specific_stats: Vec<DayStats>,
    /// Human-readable notes about degraded slices ("could not load X")
    pub notes: Vec<String>,
}

impl StatisticsReport {
    /// The well-formed zero report used when everything degraded
    pub fn empty() -> Self {
        Self {
            adherence: vec![],
            on_time_start_rate: 0,
            total_completed_days: 0,
            most_delayed_activities: vec![],
            most_efficient_activities: vec![],
            trainings: vec![],
            trainers: vec![],
            day_specific_stats: vec![],
            notes: vec![],
        }
    }
}

/// Format a minute count the way the rankings present durations
pub fn format_minutes(minutes: i64) -> String {
    let hours = minutes / 60;
    if hours > 0 {
        format!("{}h {}min", hours, minutes % 60)
    } else {
        format!("{}min", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_minutes_with_and_without_hours() {
        assert_eq!(format_minutes(0), "0min");
        assert_eq!(format_minutes(45), "45min");
        assert_eq!(format_minutes(60), "1h 0min");
        assert_eq!(format_minutes(65), "1h 5min");
        assert_eq!(format_minutes(150), "2h 30min");
    }

    #[test]
    fn empty_report_is_well_formed() {
        let report = StatisticsReport::empty();
        assert_eq!(report.on_time_start_rate, 0);
        assert_eq!(report.total_completed_days, 0);
        assert!(report.adherence.is_empty());
        assert!(report.notes.is_empty());
    }
}
