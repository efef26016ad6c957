// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Integration tests for the statistics engine over a seeded session
//! history: filter interaction, report shape and the CSV export.

use chrono::{NaiveTime, TimeZone, Utc};
use ontrak::catalog::StaticCatalog;
use ontrak::database::Database;
use ontrak::models::{
    ActivityExecution, ActivityStatus, PlannedActivity, ScheduleSession, SessionStatus,
    StatisticsFilter, Template, Trainer,
};
use ontrak::routes::{StatisticsQuery, StatisticsRoutes};
use ontrak::statistics::StatisticsEngine;
use std::sync::Arc;
use uuid::Uuid;

/// name, scheduled hour, planned minutes, start offset, actual minutes
struct Spec(&'static str, u32, i64, i64, i64);

fn completed_session(
    trainer: &str,
    training: &str,
    day: u32,
    date: (i32, u32, u32),
    specs: &[Spec],
) -> ScheduleSession {
    let created_at = Utc
        .with_ymd_and_hms(date.0, date.1, date.2, 7, 0, 0)
        .unwrap();
    let activities = specs
        .iter()
        .map(|Spec(name, hour, planned, offset, actual)| {
            let actual_start = Utc
                .with_ymd_and_hms(date.0, date.1, date.2, *hour, 0, 0)
                .unwrap()
                + chrono::Duration::minutes(*offset);
            ActivityExecution {
                id: Uuid::new_v4(),
                name: name.to_string(),
                description: None,
                scheduled_start: NaiveTime::from_hms_opt(*hour, 0, 0).unwrap(),
                duration_minutes: *planned,
                status: ActivityStatus::Completed,
                is_active: false,
                completed: true,
                actual_start: Some(actual_start),
                actual_end: Some(actual_start + chrono::Duration::minutes(*actual)),
            }
        })
        .collect();

    ScheduleSession {
        id: Uuid::new_v4(),
        title: format!("{training} day {day}"),
        template_id: training.to_string(),
        trainer_id: trainer.to_string(),
        selected_day: day,
        activities,
        active_index: 0,
        status: SessionStatus::Completed,
        created_at,
    }
}

fn template(id: &str, name: &str) -> Template {
    Template {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        total_days: 5,
        activities: vec![PlannedActivity {
            day: 1,
            name: "placeholder".to_string(),
            scheduled_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: 30,
            description: None,
            tags: vec![],
        }],
    }
}

fn trainer(id: &str, name: &str) -> Trainer {
    Trainer {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// Two trainers, two trainings, three days of history
async fn seeded_engine() -> (StatisticsEngine, Database) {
    let database = Database::new("sqlite::memory:").await.unwrap();

    let sessions = vec![
        // alice runs "sales" day 1 twice, once punctual and long, once late
        completed_session(
            "alice",
            "sales",
            1,
            (2024, 3, 4),
            &[Spec("Kickoff", 9, 30, 2, 45), Spec("Roleplay", 10, 60, 0, 50)],
        ),
        completed_session(
            "alice",
            "sales",
            1,
            (2024, 3, 11),
            &[Spec("Kickoff", 9, 30, 10, 35)],
        ),
        // bob runs "sales" day 2
        completed_session(
            "bob",
            "sales",
            2,
            (2024, 3, 5),
            &[Spec("Deep dive", 9, 90, 0, 100)],
        ),
        // bob runs "safety" day 1 outside the march window
        completed_session(
            "bob",
            "safety",
            1,
            (2024, 4, 2),
            &[Spec("Briefing", 9, 20, 0, 18)],
        ),
    ];
    for session in &sessions {
        database.insert_session(session).await.unwrap();
    }

    let catalog = Arc::new(StaticCatalog::new(
        vec![template("sales", "Sales bootcamp"), template("safety", "Safety 101")],
        vec![trainer("alice", "Alice"), trainer("bob", "Bo")],
    ));
    let engine = StatisticsEngine::new(database.clone(), catalog.clone(), catalog);
    (engine, database)
}

#[tokio::test]
async fn unfiltered_report_covers_everything() {
    let (engine, _db) = seeded_engine().await;
    let report = engine.report(&StatisticsFilter::default()).await;

    assert_eq!(report.total_completed_days, 4);
    assert_eq!(report.adherence.len(), 5);
    // Kickoff offsets 2 and 10 against a 5min threshold, others on time:
    // 4 of 5 on time -> 80%
    assert_eq!(report.on_time_start_rate, 80);
    assert_eq!(report.trainings.len(), 2);
    assert_eq!(report.trainers.len(), 2);
    assert!(report.notes.is_empty());
}

#[tokio::test]
async fn filters_interact_multiplicatively() {
    let (engine, _db) = seeded_engine().await;

    let filter = StatisticsFilter {
        trainer_id: Some("bob".to_string()),
        training_id: Some("sales".to_string()),
        day: Some(2),
        date_range: None,
    };
    let report = engine.report(&filter).await;

    assert_eq!(report.total_completed_days, 1);
    assert_eq!(report.adherence.len(), 1);
    assert_eq!(report.adherence[0].activity_name, "Deep dive");
    assert_eq!(report.adherence[0].duration_variance_minutes, 10);

    // Per-trainer variances are computed against the same training/day
    // narrowing, so alice has nothing in scope here.
    let alice = report.trainers.iter().find(|t| t.id == "alice").unwrap();
    assert_eq!(alice.time_variance, 0);
    let bob = report.trainers.iter().find(|t| t.id == "bob").unwrap();
    assert_eq!(bob.time_variance, 10);
}

#[tokio::test]
async fn date_range_excludes_out_of_window_sessions() {
    let (engine, _db) = seeded_engine().await;

    let filter = StatisticsFilter {
        date_range: Some((
            chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )),
        ..Default::default()
    };
    let report = engine.report(&filter).await;

    assert_eq!(report.total_completed_days, 3);
    assert!(report
        .adherence
        .iter()
        .all(|row| row.activity_name != "Briefing"));
}

#[tokio::test]
async fn day_breakdown_separates_training_days() {
    let (engine, _db) = seeded_engine().await;
    let report = engine.report(&StatisticsFilter::default()).await;

    let sales_day1 = report
        .day_specific_stats
        .iter()
        .find(|d| d.training_id == "sales" && d.day == 1)
        .unwrap();
    let kickoff = sales_day1
        .activities
        .iter()
        .find(|a| a.activity_name == "Kickoff")
        .unwrap();
    // Variances +15 and +5 -> 10; actual durations 45 and 35 -> 40
    assert_eq!(kickoff.mean_duration_variance, 10);
    assert_eq!(kickoff.mean_actual_duration, 40);

    assert!(report
        .day_specific_stats
        .iter()
        .any(|d| d.training_id == "sales" && d.day == 2));
    assert!(report
        .day_specific_stats
        .iter()
        .any(|d| d.training_id == "safety" && d.day == 1));
}

#[tokio::test]
async fn rankings_ignore_the_trainer_filter() {
    let (engine, _db) = seeded_engine().await;

    let filter = StatisticsFilter {
        trainer_id: Some("alice".to_string()),
        ..Default::default()
    };
    let report = engine.report(&filter).await;

    // Bob's "Deep dive" (+10) still ranks even though the report is
    // scoped to alice.
    assert!(report
        .most_delayed_activities
        .iter()
        .any(|a| a.activity_name == "Deep dive"));
    // Roleplay ran 50 of 60 planned minutes.
    assert!(report
        .most_efficient_activities
        .iter()
        .any(|a| a.activity_name == "Roleplay"));
}

#[tokio::test]
async fn csv_export_carries_the_raw_rows() {
    let (engine, _db) = seeded_engine().await;
    let routes = StatisticsRoutes::new(Arc::new(engine));

    let query = StatisticsQuery {
        trainer: Some("alice".to_string()),
        ..Default::default()
    };
    let csv = routes.export_csv(query).await.unwrap();

    let mut lines = csv.lines();
    let header = lines.next().unwrap();
    assert!(header.contains("activity_name"));
    assert!(header.contains("duration_variance_minutes"));
    // Alice has three occurrences.
    assert_eq!(lines.count(), 3);
    assert!(csv.contains("Kickoff"));
    assert!(!csv.contains("Briefing"));
}

#[tokio::test]
async fn query_strings_map_onto_the_filter() {
    let (engine, _db) = seeded_engine().await;
    let routes = StatisticsRoutes::new(Arc::new(engine));

    let report = routes
        .report(StatisticsQuery {
            trainer: Some("all".to_string()),
            training: Some("safety".to_string()),
            day: None,
            from: Some("2024-04-01".to_string()),
            to: Some("2024-04-30".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(report.total_completed_days, 1);
    assert_eq!(report.adherence[0].activity_name, "Briefing");
    assert_eq!(report.adherence[0].duration_variance_minutes, -2);
}
