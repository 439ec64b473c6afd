use axum::extract::{Path, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use kingdom_core::event::NOT_SCHEDULED_MS;

use crate::attributes::WriteOutcome;
use crate::error::AppError;
use crate::lifecycle::TournamentPhase;
use crate::state::AppState;

const MAX_USERNAME_LEN: usize = 12;
const MAX_KEY_LEN: usize = 64;
const MAX_VALUE_LEN: usize = 1024;

/// Timers are milliseconds; `-1` means the slot is empty.
#[derive(Debug, Serialize)]
pub struct LifecycleStatus {
    pub running: bool,
    pub phase: TournamentPhase,
    pub time_till_shutdown_ms: i64,
    pub time_till_pvp_ms: i64,
    pub time_till_duel_ms: i64,
    pub pvp_is_running: bool,
    pub waiting_is_running: bool,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub scheduled: bool,
    pub time_remaining_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct PvpStartBody {
    pub delay_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct AttributeResponse {
    pub user: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteAttributeBody {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct WriteAttributeResponse {
    pub updated: bool,
}

fn ensure_attached(state: &AppState) -> Result<(), AppError> {
    if state.lifecycle.is_attached() {
        Ok(())
    } else {
        Err(AppError::Unavailable("engine loop has stopped".to_string()))
    }
}

fn validate_attribute_path(user: &str, key: &str) -> Result<(), AppError> {
    if user.is_empty() || user.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::BadRequest(format!(
            "username must be 1 to {MAX_USERNAME_LEN} chars"
        )));
    }
    if user.contains(['/', '\\', '\0']) || user.contains("..") {
        return Err(AppError::BadRequest(
            "username must not contain path separators".to_string(),
        ));
    }
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(AppError::BadRequest(format!(
            "key must be 1 to {MAX_KEY_LEN} chars"
        )));
    }
    Ok(())
}

/// GET /api/v1/lifecycle
pub async fn get_lifecycle(State(state): State<AppState>) -> Json<LifecycleStatus> {
    let lifecycle = &state.lifecycle;
    Json(LifecycleStatus {
        running: lifecycle.running(),
        phase: lifecycle.phase(),
        time_till_shutdown_ms: lifecycle.time_till_shutdown(),
        time_till_pvp_ms: lifecycle.time_till_pvp(),
        time_till_duel_ms: lifecycle.time_till_duel(),
        pvp_is_running: lifecycle.pvp_is_running(),
        waiting_is_running: lifecycle.waiting_is_running(),
    })
}

/// POST /api/v1/lifecycle/shutdown
pub async fn schedule_shutdown(
    State(state): State<AppState>,
) -> Result<Json<ScheduleResponse>, AppError> {
    ensure_attached(&state)?;
    let scheduled = state.lifecycle.shutdown_for_update().await;
    if scheduled {
        tracing::info!("Update shutdown scheduled through admin API");
    }
    Ok(Json(ScheduleResponse {
        scheduled,
        time_remaining_ms: state.lifecycle.time_till_shutdown(),
    }))
}

/// POST /api/v1/lifecycle/pvp
///
/// Any delay is accepted. One too large to represent never fires and
/// reports `i64::MAX` remaining until cancelled.
pub async fn start_pvp(
    State(state): State<AppState>,
    Json(body): Json<PvpStartBody>,
) -> Result<Json<ScheduleResponse>, AppError> {
    ensure_attached(&state)?;
    let scheduled = state.lifecycle.pvp_timer_start(body.delay_secs).await;
    Ok(Json(ScheduleResponse {
        scheduled,
        time_remaining_ms: state.lifecycle.time_till_pvp(),
    }))
}

/// DELETE /api/v1/lifecycle/pvp
pub async fn cancel_pvp(State(state): State<AppState>) -> Result<Json<LifecycleStatus>, AppError> {
    ensure_attached(&state)?;
    state.lifecycle.stop_pvp();
    state.lifecycle.flush().await;
    Ok(get_lifecycle(State(state)).await)
}

/// DELETE /api/v1/lifecycle/duel
pub async fn end_duel(State(state): State<AppState>) -> Result<Json<LifecycleStatus>, AppError> {
    ensure_attached(&state)?;
    state.lifecycle.stop_duel();
    state.lifecycle.flush().await;
    Ok(get_lifecycle(State(state)).await)
}

/// GET /api/v1/players/{user}/attributes/{key}
///
/// Served from the local save files.
pub async fn get_attribute(
    State(state): State<AppState>,
    Path((user, key)): Path<(String, String)>,
) -> Result<Json<AttributeResponse>, AppError> {
    validate_attribute_path(&user, &key)?;
    let local = state.attributes.local().clone();
    let (lookup_user, lookup_key) = (user.clone(), key.clone());
    let value =
        tokio::task::spawn_blocking(move || local.lookup_value(&lookup_user, &lookup_key))
            .await??;
    Ok(Json(AttributeResponse { user, key, value }))
}

/// PUT /api/v1/players/{user}/attributes/{key}
///
/// Written to the remote store, and only when the player's record exists
/// there. Not visible through the GET route.
pub async fn put_attribute(
    State(state): State<AppState>,
    Path((user, key)): Path<(String, String)>,
    Json(body): Json<WriteAttributeBody>,
) -> Result<Json<WriteAttributeResponse>, AppError> {
    validate_attribute_path(&user, &key)?;
    if body.value.len() > MAX_VALUE_LEN {
        return Err(AppError::BadRequest(format!(
            "value exceeds {MAX_VALUE_LEN} chars"
        )));
    }
    let remote = state.attributes.remote().clone();
    let outcome =
        tokio::task::spawn_blocking(move || remote.try_write_value(&user, &key, &body.value))
            .await??;
    Ok(Json(WriteAttributeResponse {
        updated: outcome == WriteOutcome::Updated,
    }))
}

/// Whether a timer value means the slot holds an event.
pub fn is_scheduled(time_ms: i64) -> bool {
    time_ms != NOT_SCHEDULED_MS
}
