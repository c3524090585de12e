use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use super::{SchedulerStatus, SweepReport};
use crate::config::parse_schedule;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    /// "HH:MM", local time
    pub time: String,
}

/// GET /api/daily-match: Scheduler state, scheduled time and last sweep date.
pub async fn get_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

/// POST /api/daily-match/trigger: Run a sweep now, bypassing the schedule.
/// 409 if a sweep is already running.
pub async fn trigger_now(
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, StatusCode> {
    state
        .scheduler
        .trigger_now()
        .await
        .map(Json)
        .map_err(|e| {
            tracing::warn!("Manual daily match trigger failed: {}", e);
            e.status_code()
        })
}

/// PUT /api/daily-match/schedule: Change the daily sweep time.
/// Body: { "time": "HH:MM" }
pub async fn reschedule(
    State(state): State<AppState>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<SchedulerStatus>, StatusCode> {
    let time = parse_schedule(&body.time).map_err(|_| StatusCode::BAD_REQUEST)?;
    state.scheduler.reschedule(time);
    Ok(Json(state.scheduler.status()))
}
