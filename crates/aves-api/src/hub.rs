//! Hub routes: the remote sighting store devices sync with.
//!
//! Everything except the health check requires Basic auth.

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::{Path, Query, State},
  http::StatusCode,
  routing::{get, put},
};
use aves_core::{
  remote::{RemoteCursor, RemotePage, RemoteSighting, UpsertOutcome},
  store::RemoteSightingStore,
};
use aves_store_sqlite::{MAX_FEED_PAGE, SqliteHub};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  auth::{AuthConfig, Authenticated},
  error::ApiError,
};

#[derive(Clone)]
pub struct HubState {
  pub store: SqliteHub,
  pub auth:  Arc<AuthConfig>,
}

pub fn router(state: HubState) -> Router<()> {
  Router::new()
    .route("/hub/health", get(health))
    .route("/hub/sightings", get(list))
    .route("/hub/sightings/{id}", put(upsert).delete(remove))
    .with_state(state)
}

/// `GET /hub/health`
async fn health() -> &'static str { "ok" }

#[derive(Debug, Deserialize)]
pub struct FeedParams {
  pub since: Option<String>,
  pub limit: Option<usize>,
}

/// `GET /hub/sightings[?since=<cursor>][&limit=<n>]`
async fn list(
  _auth: Authenticated,
  State(state): State<HubState>,
  Query(params): Query<FeedParams>,
) -> Result<Json<RemotePage>, ApiError> {
  let limit = params.limit.unwrap_or(MAX_FEED_PAGE);
  let page = state
    .store
    .list_since(params.since.map(RemoteCursor), limit)
    .await?;
  Ok(Json(page))
}

/// `PUT /hub/sightings/{id}`
async fn upsert(
  _auth: Authenticated,
  State(state): State<HubState>,
  Path(id): Path<Uuid>,
  Json(record): Json<RemoteSighting>,
) -> Result<Json<UpsertOutcome>, ApiError> {
  if record.sighting_id != id {
    return Err(ApiError::BadRequest(format!(
      "body id {} does not match path id {id}",
      record.sighting_id
    )));
  }
  Ok(Json(state.store.upsert(record).await?))
}

/// `DELETE /hub/sightings/{id}`
async fn remove(
  _auth: Authenticated,
  State(state): State<HubState>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  state.store.delete(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
