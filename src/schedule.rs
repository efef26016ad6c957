// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Schedule State Machine
//!
//! The core of the system: creates live sessions from template days,
//! enforces the activity-navigation rules, stamps actual start/end times
//! and terminates sessions. Every successful mutation persists the whole
//! session document and broadcasts it through the injected
//! [`ChangeNotifier`].
//!
//! Session transitions: `active -> completed` (close), `active -> cancelled`
//! (cancel). Activity transitions: `pending -> in_progress -> completed`,
//! `in_progress -> pending` (retreat), `* -> cancelled` (cancel, bulk).
//!
//! Two deliberate oddities are preserved from the documented behavior
//! rather than "fixed":
//! - `retreat` re-activates the previous activity but keeps the timestamps
//!   of its first visit, so correcting a mistaken advance never restarts
//!   the clock
//! - `reorder` keeps execution state by array position, not by activity
//!   identity; reordering a partially-completed day can reassign the
//!   completed flag to a relocated entry (known limitation)
//!
//! The store offers no document-level locking, so the service serializes
//! writers per session through a keyed mutex registry; concurrent advances
//! against one session queue up instead of racing read-modify-write.

use crate::catalog::TemplateSource;
use crate::database::Database;
use crate::models::{
    ActivityExecution, ActivityStatus, ScheduleSession, SessionStatus, Template,
};
use crate::notifier::{ChangeNotifier, ScheduleEvent};
use chrono::{NaiveTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::info;
use uuid::Uuid;

/// Errors surfaced by schedule operations
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Day {day} is outside the program range 1..={total_days}")]
    InvalidDay { day: u32, total_days: u32 },

    #[error("Template '{template_id}' has no activities on day {day}")]
    EmptyDay { template_id: String, day: u32 },

    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Schedule session not found")]
    NotFound,

    #[error("Already at the last activity")]
    NoNextActivity,

    #[error("Already at the first activity")]
    NoPreviousActivity,

    #[error("No active schedule for this trainer")]
    NoActiveSchedule,

    #[error("{0}")]
    Validation(String),

    #[error("Administrator role required")]
    Forbidden,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Per-session write serialization.
///
/// The store has no document-level locking, so each session id maps to a
/// mutex that every read-modify-write must hold.
#[derive(Clone, Default)]
struct SessionLocks {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let existing = self.inner.read().await.get(&session_id).cloned();
        let lock = match existing {
            Some(lock) => lock,
            None => self
                .inner
                .write()
                .await
                .entry(session_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone(),
        };
        lock.lock_owned().await
    }
}

/// The schedule execution state machine
pub struct ScheduleService {
    database: Database,
    templates: Arc<dyn TemplateSource>,
    notifier: Arc<dyn ChangeNotifier>,
    locks: SessionLocks,
}

impl ScheduleService {
    /// Create a new schedule service with an injected notifier
    pub fn new(
        database: Database,
        templates: Arc<dyn TemplateSource>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            database,
            templates,
            notifier,
            locks: SessionLocks::default(),
        }
    }

    /// Start executing one day of a template.
    ///
    /// Any other active session of the caller is force-cancelled first, so
    /// at most one active session per trainer ever exists. The day's
    /// activities are sorted by scheduled start (declaration order breaks
    /// ties) and the first one starts immediately.
    pub async fn start_day(
        &self,
        trainer_id: &str,
        template_id: &str,
        day: u32,
        title: Option<String>,
    ) -> Result<ScheduleSession, ScheduleError> {
        let template = self
            .templates
            .get_template(template_id)
            .await?
            .ok_or_else(|| ScheduleError::TemplateNotFound(template_id.to_string()))?;

        if !template.contains_day(day) {
            return Err(ScheduleError::InvalidDay {
                day,
                total_days: template.total_days,
            });
        }

        let planned = template.activities_for_day(day);
        if planned.is_empty() {
            return Err(ScheduleError::EmptyDay {
                template_id: template_id.to_string(),
                day,
            });
        }

        self.cancel_other_active_sessions(trainer_id).await?;

        let now = Utc::now();
        let mut activities: Vec<ActivityExecution> = planned
            .into_iter()
            .map(ActivityExecution::from_planned)
            .collect();
        activities[0].status = ActivityStatus::InProgress;
        activities[0].is_active = true;
        activities[0].actual_start = Some(now);

        let session = ScheduleSession {
            id: Uuid::new_v4(),
            title: title.unwrap_or_else(|| default_title(&template, day)),
            template_id: template_id.to_string(),
            trainer_id: trainer_id.to_string(),
            selected_day: day,
            activities,
            active_index: 0,
            status: SessionStatus::Active,
            created_at: now,
        };

        self.database.insert_session(&session).await?;
        info!(
            "trainer {} started day {} of template {}",
            trainer_id, day, template_id
        );
        self.notifier.publish(ScheduleEvent::updated(session.clone()));

        Ok(session)
    }

    /// Move to the next activity.
    ///
    /// `activity_id` must match the current activity, which protects
    /// against double-submits from a stale client view.
    pub async fn advance(
        &self,
        trainer_id: &str,
        session_id: Uuid,
        activity_id: Uuid,
    ) -> Result<ScheduleSession, ScheduleError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .load_owned_active(trainer_id, session_id, activity_id)
            .await?;

        if session.active_index + 1 >= session.activities.len() {
            return Err(ScheduleError::NoNextActivity);
        }

        let now = Utc::now();
        {
            let current = session.active_activity_mut().expect("index in range");
            current.status = ActivityStatus::Completed;
            current.completed = true;
            current.is_active = false;
            current.actual_end = Some(now);
        }
        session.active_index += 1;
        {
            let next = session.active_activity_mut().expect("index in range");
            next.status = ActivityStatus::InProgress;
            next.is_active = true;
            next.actual_start = Some(now);
        }

        self.database.update_session(&session).await?;
        self.notifier.publish(ScheduleEvent::updated(session.clone()));

        Ok(session)
    }

    /// Undo an erroneous advance.
    ///
    /// The current activity drops back to pending with its timestamps
    /// cleared; the previous activity becomes current again but keeps the
    /// timestamps from its first visit.
    pub async fn retreat(
        &self,
        trainer_id: &str,
        session_id: Uuid,
        activity_id: Uuid,
    ) -> Result<ScheduleSession, ScheduleError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .load_owned_active(trainer_id, session_id, activity_id)
            .await?;

        if session.active_index == 0 {
            return Err(ScheduleError::NoPreviousActivity);
        }

        {
            let current = session.active_activity_mut().expect("index in range");
            current.status = ActivityStatus::Pending;
            current.is_active = false;
            current.completed = false;
            current.actual_start = None;
            current.actual_end = None;
        }
        session.active_index -= 1;
        {
            // First-visit timestamps stay in place.
            let previous = session.active_activity_mut().expect("index in range");
            previous.status = ActivityStatus::InProgress;
            previous.is_active = true;
            previous.completed = false;
        }

        self.database.update_session(&session).await?;
        self.notifier.publish(ScheduleEvent::updated(session.clone()));

        Ok(session)
    }

    /// Close the caller's active day.
    ///
    /// The current activity completes; later activities stay pending and
    /// never enter the statistics.
    pub async fn close_day(&self, trainer_id: &str) -> Result<ScheduleSession, ScheduleError> {
        let session = self
            .database
            .active_session_for_trainer(trainer_id)
            .await?
            .ok_or(ScheduleError::NoActiveSchedule)?;

        let _guard = self.locks.acquire(session.id).await;
        // Re-read under the lock; a racing close or cancel may have won.
        let mut session = match self.database.get_session(session.id).await? {
            Some(s) if s.status == SessionStatus::Active => s,
            _ => return Err(ScheduleError::NoActiveSchedule),
        };

        let now = Utc::now();
        if let Some(current) = session.active_activity_mut() {
            current.status = ActivityStatus::Completed;
            current.completed = true;
            current.is_active = false;
            current.actual_end = Some(now);
        }
        session.status = SessionStatus::Completed;

        self.database.update_session(&session).await?;
        info!("trainer {} closed session {}", trainer_id, session.id);
        self.notifier.publish(ScheduleEvent::updated(session.clone()));

        Ok(session)
    }

    /// Cancel the caller's active day.
    ///
    /// The current activity and every remaining pending activity become
    /// cancelled; already-completed entries are left as they are.
    pub async fn cancel_day(&self, trainer_id: &str) -> Result<ScheduleSession, ScheduleError> {
        let session = self
            .database
            .active_session_for_trainer(trainer_id)
            .await?
            .ok_or(ScheduleError::NoActiveSchedule)?;

        let _guard = self.locks.acquire(session.id).await;
        let mut session = match self.database.get_session(session.id).await? {
            Some(s) if s.status == SessionStatus::Active => s,
            _ => return Err(ScheduleError::NoActiveSchedule),
        };

        cancel_remaining_activities(&mut session);
        session.status = SessionStatus::Cancelled;

        self.database.update_session(&session).await?;
        info!("trainer {} cancelled session {}", trainer_id, session.id);
        self.notifier.publish(ScheduleEvent::updated(session.clone()));

        Ok(session)
    }

    /// Apply a manual reorder of the activity list.
    ///
    /// `new_order[pos] = src` places the planned activity currently at
    /// `src` into position `pos`. Scheduled starts are recomputed by
    /// walking the new order and summing durations from the first entry's
    /// original scheduled start. Execution state stays by position.
    pub async fn reorder(
        &self,
        trainer_id: &str,
        session_id: Uuid,
        new_order: &[usize],
    ) -> Result<ScheduleSession, ScheduleError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_owned(trainer_id, session_id).await?;

        if session.status != SessionStatus::Active {
            return Err(ScheduleError::NotFound);
        }
        if new_order.len() != session.activities.len() {
            return Err(ScheduleError::Validation(format!(
                "Expected {} positions, got {}",
                session.activities.len(),
                new_order.len()
            )));
        }
        let mut seen = vec![false; new_order.len()];
        for &src in new_order {
            if src >= seen.len() || seen[src] {
                return Err(ScheduleError::Validation(
                    "Order must be a permutation of the activity positions".to_string(),
                ));
            }
            seen[src] = true;
        }

        let base = session
            .activities
            .first()
            .map(|a| a.scheduled_start)
            .unwrap_or_else(default_day_start);

        let old = session.activities.clone();
        let mut cursor = base;
        let mut reordered = Vec::with_capacity(old.len());
        for (pos, &src) in new_order.iter().enumerate() {
            let activity = ActivityExecution {
                id: old[src].id,
                name: old[src].name.clone(),
                description: old[src].description.clone(),
                scheduled_start: cursor,
                duration_minutes: old[src].duration_minutes,
                // Execution state is positional, not tied to the moved
                // activity (documented limitation).
                status: old[pos].status,
                is_active: old[pos].is_active,
                completed: old[pos].completed,
                actual_start: old[pos].actual_start,
                actual_end: old[pos].actual_end,
            };
            cursor = cursor + chrono::Duration::minutes(activity.duration_minutes);
            reordered.push(activity);
        }
        session.activities = reordered;

        self.database.update_session(&session).await?;
        self.notifier.publish(ScheduleEvent::updated(session.clone()));

        Ok(session)
    }

    /// The caller's active session, if a day is running
    pub async fn current_session(
        &self,
        trainer_id: &str,
    ) -> Result<Option<ScheduleSession>, ScheduleError> {
        Ok(self.database.active_session_for_trainer(trainer_id).await?)
    }

    /// Every active session across all trainers (privileged read path)
    pub async fn active_sessions(&self) -> Result<Vec<ScheduleSession>, ScheduleError> {
        Ok(self.database.all_active_sessions().await?)
    }

    /// Force-cancel whatever active sessions the trainer already has
    async fn cancel_other_active_sessions(&self, trainer_id: &str) -> Result<(), ScheduleError> {
        let stale = self.database.active_sessions_for_trainer(trainer_id).await?;
        for mut session in stale {
            let _guard = self.locks.acquire(session.id).await;
            cancel_remaining_activities(&mut session);
            session.status = SessionStatus::Cancelled;
            self.database.update_session(&session).await?;
            info!(
                "cancelled stale session {} before starting a new day",
                session.id
            );
            self.notifier.publish(ScheduleEvent::updated(session));
        }
        Ok(())
    }

    /// Fetch a session owned by the caller
    async fn load_owned(
        &self,
        trainer_id: &str,
        session_id: Uuid,
    ) -> Result<ScheduleSession, ScheduleError> {
        let session = self
            .database
            .get_session(session_id)
            .await?
            .ok_or(ScheduleError::NotFound)?;
        if session.trainer_id != trainer_id {
            return Err(ScheduleError::NotFound);
        }
        Ok(session)
    }

    /// Fetch an active, caller-owned session whose current activity
    /// matches the id the client believes is active
    async fn load_owned_active(
        &self,
        trainer_id: &str,
        session_id: Uuid,
        activity_id: Uuid,
    ) -> Result<ScheduleSession, ScheduleError> {
        let session = self.load_owned(trainer_id, session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(ScheduleError::NotFound);
        }
        match session.active_activity() {
            Some(current) if current.id == activity_id => Ok(session),
            _ => Err(ScheduleError::NotFound),
        }
    }
}

/// Cancel the current activity and everything still pending
fn cancel_remaining_activities(session: &mut ScheduleSession) {
    let active_index = session.active_index;
    for (index, activity) in session.activities.iter_mut().enumerate() {
        let cancels = index == active_index || activity.status == ActivityStatus::Pending;
        if cancels && activity.status != ActivityStatus::Completed {
            activity.status = ActivityStatus::Cancelled;
        }
        activity.is_active = false;
    }
}

fn default_title(template: &Template, day: u32) -> String {
    format!("{} - day {}", template.name, day)
}

/// Fallback first slot when a session has no scheduled start to anchor on
fn default_day_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).expect("valid clock time")
}
