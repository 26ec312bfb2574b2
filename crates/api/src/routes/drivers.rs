//! Driver aggregate and violation history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::DriverAddress;
use event_log::EventLog;
use ledger::{DriverAggregate, ViolationRecord};
use projection::ProjectionStore;
use serde::Serialize;
use sync::Synchronizer;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<L: EventLog, P: ProjectionStore> {
    pub store: Arc<P>,
    pub synchronizer: Arc<Synchronizer<L, P>>,
}

// -- Response types --

#[derive(Serialize)]
pub struct DriverResponse {
    pub address: String,
    pub total_points: u32,
    pub violation_count: u32,
    pub is_suspended: bool,
}

#[derive(Serialize)]
pub struct ViolationResponse {
    pub violation_id: u64,
    pub driver_address: String,
    pub points: u32,
    pub violation_type: String,
    pub occurred_at: String,
    pub is_revoked: bool,
    pub block_number: u64,
    pub log_index: u32,
    pub transaction_hash: String,
}

impl From<&DriverAggregate> for DriverResponse {
    fn from(agg: &DriverAggregate) -> Self {
        DriverResponse {
            address: agg.address.to_string(),
            total_points: agg.total_points,
            violation_count: agg.violation_count,
            is_suspended: agg.is_suspended,
        }
    }
}

impl From<&ViolationRecord> for ViolationResponse {
    fn from(record: &ViolationRecord) -> Self {
        ViolationResponse {
            violation_id: record.violation_id.as_u64(),
            driver_address: record.driver_address.to_string(),
            points: record.points,
            violation_type: record.violation_type.clone(),
            occurred_at: record.occurred_at.to_rfc3339(),
            is_revoked: record.is_revoked,
            block_number: record.position.block_number,
            log_index: record.position.log_index,
            transaction_hash: record.tx_hash.to_string(),
        }
    }
}

// -- Handlers --

/// GET /drivers/:address — the driver's current aggregate.
#[tracing::instrument(skip(state))]
pub async fn get<L: EventLog + 'static, P: ProjectionStore + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Path(address): Path<String>,
) -> Result<Json<DriverResponse>, ApiError> {
    let address = parse_address(&address)?;
    let aggregate = state
        .store
        .get_driver(address)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Driver {address} not found")))?;

    Ok(Json(DriverResponse::from(&aggregate)))
}

/// GET /drivers/:address/violations — history, most recent first.
///
/// A driver the projection has never seen gets an empty list, not a 404:
/// "no violations on record" is a valid answer for any address.
#[tracing::instrument(skip(state))]
pub async fn violations<L: EventLog + 'static, P: ProjectionStore + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Path(address): Path<String>,
) -> Result<Json<Vec<ViolationResponse>>, ApiError> {
    let address = parse_address(&address)?;
    let records = state.store.violations_for_driver(address).await?;

    let responses: Vec<ViolationResponse> =
        records.iter().map(ViolationResponse::from).collect();
    Ok(Json(responses))
}

fn parse_address(address: &str) -> Result<DriverAddress, ApiError> {
    DriverAddress::parse(address)
        .map_err(|e| ApiError::BadRequest(format!("Invalid driver address: {e}")))
}
