//! Synchronization status endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_log::EventLog;
use projection::ProjectionStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::drivers::AppState;

#[derive(Serialize)]
pub struct SyncStatusResponse {
    /// Current phase: "idle", "backfilling", or "live".
    pub state: String,
    /// Block number of the last durably applied log entry, if any.
    pub last_block_number: Option<u64>,
    /// Log index of the last durably applied log entry, if any.
    pub last_log_index: Option<u32>,
    /// When a sync pass last completed; the staleness signal.
    pub last_sync_time: String,
    /// Revocations waiting for their matching recording.
    pub deferred_revocations: usize,
}

/// GET /sync — the synchronizer's phase and cursor.
#[tracing::instrument(skip(state))]
pub async fn get<L: EventLog + 'static, P: ProjectionStore + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
) -> Result<Json<SyncStatusResponse>, ApiError> {
    let cursor = state.store.get_cursor().await?;

    Ok(Json(SyncStatusResponse {
        state: state.synchronizer.state().await.to_string(),
        last_block_number: cursor.position.map(|p| p.block_number),
        last_log_index: cursor.position.map(|p| p.log_index),
        last_sync_time: cursor.last_sync_time.to_rfc3339(),
        deferred_revocations: state.synchronizer.deferred_count().await,
    }))
}
