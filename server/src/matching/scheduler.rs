use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::analyzer::{best_match, CompatibilityAnalyzer};
use crate::delivery::DeliveryCoordinator;
use crate::directory::UserDirectory;
use crate::error::CoreError;
use crate::models::{MessageTag, PrivateMessage, UserIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// "HH:MM", local time
    pub scheduled_time: String,
    pub last_fired_date: Option<NaiveDate>,
}

/// Per-sweep counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub users: usize,
    pub delivered: usize,
    /// No candidates, no usable ranking.
    pub skipped: usize,
    /// Analyzer or delivery failed for the user.
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Scheduled time not reached yet today.
    NotDue,
    /// A tick-driven sweep already completed for this date.
    AlreadyRanToday,
    /// Another sweep is in progress.
    Busy,
    Swept(SweepReport),
}

#[derive(Debug)]
struct SchedulerInner {
    state: SchedulerState,
    scheduled_time: NaiveTime,
    last_fired_date: Option<NaiveDate>,
}

/// Puts the scheduler back to Idle when a sweep ends, including when the
/// sweeping future is dropped part-way through.
struct RunningGuard<'a> {
    inner: &'a Mutex<SchedulerInner>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = SchedulerState::Idle;
    }
}

/// Daily match sweep: once per calendar day, each user is sent their best
/// match with an icebreaker, as a private message from themselves to the
/// matched user.
pub struct MatchScheduler {
    directory: Arc<dyn UserDirectory>,
    analyzer: Arc<dyn CompatibilityAnalyzer>,
    delivery: Arc<DeliveryCoordinator>,
    inner: Mutex<SchedulerInner>,
}

impl MatchScheduler {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        analyzer: Arc<dyn CompatibilityAnalyzer>,
        delivery: Arc<DeliveryCoordinator>,
        scheduled_time: NaiveTime,
    ) -> Self {
        Self {
            directory,
            analyzer,
            delivery,
            inner: Mutex::new(SchedulerInner {
                state: SchedulerState::Idle,
                scheduled_time,
                last_fired_date: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> SchedulerStatus {
        let inner = self.lock();
        SchedulerStatus {
            state: inner.state,
            scheduled_time: inner.scheduled_time.format("%H:%M").to_string(),
            last_fired_date: inner.last_fired_date,
        }
    }

    /// Change the daily time. Applies from the next tick.
    pub fn reschedule(&self, time: NaiveTime) {
        self.lock().scheduled_time = time;
        tracing::info!(scheduled_time = %time.format("%H:%M"), "Daily match rescheduled");
    }

    /// Evaluate the schedule against the local wall clock.
    pub async fn tick(&self) -> Result<TickOutcome, CoreError> {
        self.tick_at(Local::now().naive_local()).await
    }

    /// Evaluate the schedule at `now`. Sweeps only when `now` is at or past
    /// the scheduled time and no tick-driven sweep has finished on that date.
    /// If the user directory cannot be read the date is not recorded, so a
    /// later tick retries.
    pub async fn tick_at(&self, now: NaiveDateTime) -> Result<TickOutcome, CoreError> {
        let today = now.date();
        let guard = {
            let mut inner = self.lock();
            if inner.state == SchedulerState::Running {
                return Ok(TickOutcome::Busy);
            }
            if inner.last_fired_date == Some(today) {
                return Ok(TickOutcome::AlreadyRanToday);
            }
            if now.time() < inner.scheduled_time {
                return Ok(TickOutcome::NotDue);
            }
            inner.state = SchedulerState::Running;
            RunningGuard { inner: &self.inner }
        };

        tracing::info!(date = %today, "Starting scheduled daily match sweep");
        let report = self.sweep().await?;
        self.lock().last_fired_date = Some(today);
        drop(guard);

        Ok(TickOutcome::Swept(report))
    }

    /// Run a sweep immediately, ignoring the schedule. The daily marker is
    /// left untouched, so the scheduled sweep still runs later that day.
    pub async fn trigger_now(&self) -> Result<SweepReport, CoreError> {
        let _guard = {
            let mut inner = self.lock();
            if inner.state == SchedulerState::Running {
                return Err(CoreError::SweepInProgress);
            }
            inner.state = SchedulerState::Running;
            RunningGuard { inner: &self.inner }
        };

        tracing::info!("Manually triggered daily match sweep");
        self.sweep().await
    }

    async fn sweep(&self) -> Result<SweepReport, CoreError> {
        let users = self.directory.list_all().await?;
        let mut report = SweepReport {
            users: users.len(),
            ..SweepReport::default()
        };

        for user in &users {
            match self.match_user(user, &users).await {
                Ok(Some(_)) => report.delivered += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Daily match failed for user");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            users = report.users,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Daily match sweep finished"
        );
        Ok(report)
    }

    async fn match_user(
        &self,
        user: &UserIdentity,
        all_users: &[UserIdentity],
    ) -> Result<Option<PrivateMessage>, CoreError> {
        let candidates: Vec<UserIdentity> = all_users
            .iter()
            .filter(|candidate| candidate.id != user.id)
            .cloned()
            .collect();
        if candidates.is_empty() {
            tracing::debug!(user_id = %user.id, "No match candidates");
            return Ok(None);
        }

        let ranked = self.analyzer.rank(user, &candidates).await?;
        let Some(best) = best_match(&ranked) else {
            tracing::debug!(user_id = %user.id, "Analyzer returned no matches");
            return Ok(None);
        };
        let Some(target) = candidates.iter().find(|c| c.id == best.candidate_id) else {
            tracing::warn!(
                user_id = %user.id,
                candidate_id = %best.candidate_id,
                "Best match is not a known candidate"
            );
            return Ok(None);
        };

        let icebreaker = self.analyzer.generate_icebreaker(user, target).await?;
        let message = self
            .delivery
            .send_private_message(
                &user.id,
                &target.id,
                &daily_match_content(best.score, &icebreaker),
                MessageTag::DailyMatch {
                    match_score: best.score,
                },
            )
            .await?;

        tracing::debug!(
            user_id = %user.id,
            match_id = %target.id,
            score = best.score,
            "Daily match sent"
        );
        Ok(Some(message))
    }
}

pub fn daily_match_content(score: f64, icebreaker: &str) -> String {
    format!("🌟 Daily Match (Score: {score}/10)\n\n{icebreaker}")
}

/// Spawn the background task that ticks the scheduler every
/// `interval_secs` seconds. The first tick fires immediately.
pub fn spawn_match_scheduler(scheduler: Arc<MatchScheduler>, interval_secs: u64) -> JoinHandle<()> {
    let period = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match scheduler.tick().await {
                Ok(TickOutcome::Swept(report)) => {
                    tracing::info!(delivered = report.delivered, "Scheduled daily match sweep done");
                }
                Ok(outcome) => {
                    tracing::debug!(outcome = ?outcome, "Daily match tick");
                }
                Err(e) => {
                    tracing::error!("Daily match sweep error: {}", e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_shows_whole_and_fractional_scores() {
        assert_eq!(
            daily_match_content(8.0, "Hi!"),
            "🌟 Daily Match (Score: 8/10)\n\nHi!"
        );
        assert!(daily_match_content(6.5, "Hey").contains("Score: 6.5/10"));
    }
}
