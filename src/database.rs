// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Session Store
//!
//! SQLite-backed persistence for schedule sessions. Each session is stored
//! as a single document: one row with the activity list serialized into a
//! JSON column, so every mutation is a whole-row read-modify-write. The
//! state machine layers its own per-session serialization on top; this
//! module is plain CRUD plus the trainer/status/date queries the state
//! machine and statistics engine need.
//!
//! Sessions are never deleted; completed and cancelled rows are the
//! statistics engine's raw material.

use crate::models::{ActivityExecution, ScheduleSession, SessionStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use uuid::Uuid;

/// Store for live and historical schedule sessions
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(database_url: &str) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        let pool = SqlitePool::connect(&connection_options).await?;

        let db = Self { pool };

        // Run migrations
        db.migrate().await?;

        Ok(db)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schedule_sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                template_id TEXT NOT NULL,
                trainer_id TEXT NOT NULL,
                selected_day INTEGER NOT NULL,
                activities TEXT NOT NULL,
                active_index INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes for the trainer/status lookups on the hot path
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_trainer ON schedule_sessions(trainer_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_status ON schedule_sessions(status)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cheap connectivity probe for health checks
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a newly started session
    pub async fn insert_session(&self, session: &ScheduleSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schedule_sessions
                (id, title, template_id, trainer_id, selected_day, activities, active_index, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(session.id.to_string())
        .bind(&session.title)
        .bind(&session.template_id)
        .bind(&session.trainer_id)
        .bind(session.selected_day as i64)
        .bind(serde_json::to_string(&session.activities)?)
        .bind(session.active_index as i64)
        .bind(session.status.as_str())
        .bind(session.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrite a session document after a mutation
    pub async fn update_session(&self, session: &ScheduleSession) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE schedule_sessions
            SET activities = ?1, active_index = ?2, status = ?3, title = ?4
            WHERE id = ?5
            "#,
        )
        .bind(serde_json::to_string(&session.activities)?)
        .bind(session.active_index as i64)
        .bind(session.status.as_str())
        .bind(&session.title)
        .bind(session.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a session by id
    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<ScheduleSession>> {
        let row = sqlx::query("SELECT * FROM schedule_sessions WHERE id = ?1")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_session(row)?)),
            None => Ok(None),
        }
    }

    /// All of a trainer's sessions currently in the active state.
    ///
    /// The single-active-session invariant makes more than one row here a
    /// takeover situation; `start_day` bulk-cancels whatever it finds.
    pub async fn active_sessions_for_trainer(
        &self,
        trainer_id: &str,
    ) -> Result<Vec<ScheduleSession>> {
        let rows = sqlx::query(
            "SELECT * FROM schedule_sessions WHERE trainer_id = ?1 AND status = 'active' ORDER BY created_at",
        )
        .bind(trainer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_session).collect()
    }

    /// The trainer's current active session, if any
    pub async fn active_session_for_trainer(
        &self,
        trainer_id: &str,
    ) -> Result<Option<ScheduleSession>> {
        let row = sqlx::query(
            "SELECT * FROM schedule_sessions WHERE trainer_id = ?1 AND status = 'active' ORDER BY created_at DESC LIMIT 1",
        )
        .bind(trainer_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_session(row)?)),
            None => Ok(None),
        }
    }

    /// Every active session across all trainers (privileged listing)
    pub async fn all_active_sessions(&self) -> Result<Vec<ScheduleSession>> {
        let rows = sqlx::query(
            "SELECT * FROM schedule_sessions WHERE status = 'active' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_session).collect()
    }

    /// Completed sessions, optionally narrowed to a calendar date range
    pub async fn completed_sessions(
        &self,
        date_range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<ScheduleSession>> {
        let rows = match date_range {
            Some((from, to)) => {
                sqlx::query(
                    r#"
                    SELECT * FROM schedule_sessions
                    WHERE status = 'completed' AND date(created_at) BETWEEN ?1 AND ?2
                    ORDER BY created_at
                    "#,
                )
                .bind(from.format("%Y-%m-%d").to_string())
                .bind(to.format("%Y-%m-%d").to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM schedule_sessions WHERE status = 'completed' ORDER BY created_at",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(row_to_session).collect()
    }
}

/// Convert a database row to a session model
fn row_to_session(row: sqlx::sqlite::SqliteRow) -> Result<ScheduleSession> {
    let id_str: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id_str)?;

    let title: String = row.try_get("title")?;
    let template_id: String = row.try_get("template_id")?;
    let trainer_id: String = row.try_get("trainer_id")?;
    let selected_day: i64 = row.try_get("selected_day")?;
    let active_index: i64 = row.try_get("active_index")?;

    let activities_json: String = row.try_get("activities")?;
    let activities: Vec<ActivityExecution> = serde_json::from_str(&activities_json)
        .context("Corrupt activities column")?;

    let status_str: String = row.try_get("status")?;
    let status = SessionStatus::parse(&status_str)
        .with_context(|| format!("Unknown session status '{status_str}'"))?;

    let created_at_str: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)?.with_timezone(&Utc);

    Ok(ScheduleSession {
        id,
        title,
        template_id,
        trainer_id,
        selected_day: selected_day as u32,
        activities,
        active_index: active_index as usize,
        status,
        created_at,
    })
}
