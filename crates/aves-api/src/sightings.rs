//! Handlers for the sighting log.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use aves_core::{
  sighting::{
    Coordinates, MediaRefs, Prediction, Sighting, SightingBody, SightingKind, SightingOrder,
    SyncState,
  },
  store::{Connectivity, RemoteSightingStore, SightingStore},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Request body for `POST /sightings` and `PUT /sightings/{id}`.
#[derive(Debug, Deserialize)]
pub struct SightingInput {
  #[serde(default)]
  pub kind:              SightingKind,
  #[serde(default)]
  pub media:             MediaRefs,
  #[serde(default)]
  pub note:              String,
  pub latitude:          Option<f64>,
  pub longitude:         Option<f64>,
  /// Defaults to the time the request is handled.
  pub observed_at:       Option<DateTime<Utc>>,
  #[serde(default)]
  pub species_guess:     String,
  pub image_predictions: Option<Vec<Prediction>>,
  pub audio_predictions: Option<Vec<Prediction>>,
}

impl SightingInput {
  fn into_body(self) -> Result<SightingBody, ApiError> {
    Ok(SightingBody {
      kind:              self.kind,
      media:             self.media,
      note:              self.note,
      location:          Coordinates::from_parts(self.latitude, self.longitude)?,
      observed_at:       self.observed_at.unwrap_or_else(Utc::now),
      species_guess:     self.species_guess,
      image_predictions: self.image_predictions,
      audio_predictions: self.audio_predictions,
    })
  }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub limit: Option<usize>,
  #[serde(default)]
  pub order: SightingOrder,
  /// Only sightings in this sync state.
  pub state: Option<SyncState>,
}

/// `GET /sightings[?limit=][&order=newest_first|oldest_first][&state=]`
pub async fn list<R, C>(
  State(state): State<AppState<R, C>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Sighting>>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  let sightings = match params.state {
    Some(sync_state) => {
      let mut all = state
        .sightings
        .list_by_state(sync_state)
        .await
        .map_err(ApiError::store)?;
      if let Some(limit) = params.limit {
        all.truncate(limit);
      }
      all
    }
    None => state
      .sightings
      .get_all(params.limit, params.order)
      .await
      .map_err(ApiError::store)?,
  };
  Ok(Json(sightings))
}

/// `POST /sightings`
pub async fn create<R, C>(
  State(state): State<AppState<R, C>>,
  Json(input): Json<SightingInput>,
) -> Result<(StatusCode, Json<Sighting>), ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  let sighting = state
    .sightings
    .insert(input.into_body()?)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(sighting)))
}

/// `GET /sightings/{id}`
pub async fn get_one<R, C>(
  State(state): State<AppState<R, C>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Sighting>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  state
    .sightings
    .get(id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("sighting {id}")))
}

/// `PUT /sightings/{id}`
pub async fn update<R, C>(
  State(state): State<AppState<R, C>>,
  Path(id): Path<Uuid>,
  Json(input): Json<SightingInput>,
) -> Result<Json<Sighting>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  state
    .sightings
    .update(id, input.into_body()?)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("sighting {id}")))
}

/// `DELETE /sightings/{id}`
pub async fn delete<R, C>(
  State(state): State<AppState<R, C>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  if state.sightings.delete(id).await.map_err(ApiError::store)? {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("sighting {id}")))
  }
}

/// `POST /sightings/retry`: move rejected sightings back to the push queue.
pub async fn retry_failed<R, C>(
  State(state): State<AppState<R, C>>,
) -> Result<Json<Value>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  let requeued = state
    .sightings
    .retry_failed()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(json!({ "requeued": requeued })))
}
