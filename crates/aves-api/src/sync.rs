//! Handlers for sighting synchronisation.

use axum::{Json, extract::State};
use aves_core::{
  sighting::SyncSummary,
  store::{Connectivity, RemoteSightingStore, SightingStore},
};
use aves_sync::{SyncPhase, SyncReport};
use serde::Serialize;

use crate::{error::ApiError, state::AppState};

/// `POST /sync`: run one reconciliation and report what it did.
pub async fn run<R, C>(State(state): State<AppState<R, C>>) -> Result<Json<SyncReport>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  let reconciler = state
    .sync
    .as_ref()
    .ok_or_else(|| ApiError::Unavailable("no sync remote is configured".to_string()))?;
  Ok(Json(reconciler.reconcile().await))
}

#[derive(Debug, Serialize)]
pub struct SyncStatus {
  pub configured: bool,
  pub phase:      SyncPhase,
  pub summary:    SyncSummary,
  /// "N of M sightings not yet synced"
  pub message:    String,
}

/// `GET /sync`
pub async fn status<R, C>(State(state): State<AppState<R, C>>) -> Result<Json<SyncStatus>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  let summary = state
    .sightings
    .sync_summary()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(SyncStatus {
    configured: state.sync.is_some(),
    phase: state.sync.as_ref().map(|s| s.phase()).unwrap_or_default(),
    message: format!(
      "{} of {} sightings not yet synced",
      summary.outstanding(),
      summary.total()
    ),
    summary,
  }))
}
