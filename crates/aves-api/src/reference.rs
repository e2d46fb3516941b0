//! Handlers for the reference catalogue.

use std::collections::HashMap;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use aves_catalogue::TaxonListing;
use aves_core::{
  progress::ReadyState,
  query::TaxonQuery,
  store::{Connectivity, RemoteSightingStore},
  taxon::{Language, Taxon},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::{error::ApiError, state::AppState};

const DEFAULT_PAGE_SIZE: i64 = 50;

// ─── Readiness ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct EnsureParams {
  /// Wait for the run to finish instead of answering `202` at once.
  #[serde(default)]
  pub wait: bool,
}

/// `POST /reference/ensure[?wait=true]`
pub async fn ensure<R, C>(
  State(state): State<AppState<R, C>>,
  Query(params): Query<EnsureParams>,
) -> Result<Response, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  if params.wait {
    let report = state.ingestor.ensure_ready().await?;
    return Ok(Json(ReadyState::Ready { report }).into_response());
  }

  let ingestor = state.ingestor.clone();
  tokio::spawn(async move {
    // Failures are logged by the ingestor and kept in its state.
    if let Err(e) = ingestor.ensure_ready().await {
      debug!(error = %e, "background ingestion ended with an error");
    }
  });
  Ok((StatusCode::ACCEPTED, Json(state.ingestor.status().await)).into_response())
}

/// `GET /reference/status`
pub async fn status<R, C>(State(state): State<AppState<R, C>>) -> Json<ReadyState>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  Json(state.ingestor.status().await)
}

// ─── Taxa ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct TaxaParams {
  /// Substring of the displayed or scientific name.
  pub q:        Option<String>,
  /// `name`, `scientific_name` or `family`.
  pub sort:     Option<String>,
  pub asc:      Option<bool>,
  pub size:     Option<i64>,
  pub page:     Option<i64>,
  /// A category such as `species`, or `all`.
  pub category: Option<String>,
  pub lang:     Option<Language>,
}

#[derive(Debug, Serialize)]
pub struct TaxaPage {
  pub items:    Vec<TaxonListing>,
  /// Rows matching the filters across all pages.
  pub total:    u64,
  pub page:     u32,
  pub size:     u32,
  /// `false` while ingestion is still running.
  pub complete: bool,
}

/// `GET /reference/taxa[?q=][&sort=][&asc=][&size=][&page=][&category=][&lang=]`
pub async fn list<R, C>(
  State(state): State<AppState<R, C>>,
  Query(params): Query<TaxaParams>,
) -> Result<Json<TaxaPage>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  let complete = state.reference_readable().await?;
  let language = params.lang.unwrap_or_default();
  let search = params.q.unwrap_or_default();
  let category = params.category.unwrap_or_else(|| "all".to_string());
  let query = TaxonQuery::new(
    &search,
    params.sort.as_deref().unwrap_or("name"),
    params.asc.unwrap_or(true),
    params.size.unwrap_or(DEFAULT_PAGE_SIZE),
    params.page.unwrap_or(1),
    &category,
  )?
  .with_language(language);

  let items = state.catalogue.listing_page(&query).await?;
  let total = state
    .catalogue
    .row_count(&search, &category, language)
    .await?;
  Ok(Json(TaxaPage {
    items,
    total,
    page: query.page_number,
    size: query.page_size,
    complete,
  }))
}

/// `GET /reference/taxa/count[?q=][&category=][&lang=]`
pub async fn count<R, C>(
  State(state): State<AppState<R, C>>,
  Query(params): Query<TaxaParams>,
) -> Result<Json<Value>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  state.reference_readable().await?;
  let count = state
    .catalogue
    .row_count(
      params.q.as_deref().unwrap_or(""),
      params.category.as_deref().unwrap_or("all"),
      params.lang.unwrap_or_default(),
    )
    .await?;
  Ok(Json(json!({ "count": count })))
}

/// `GET /reference/taxa/{code}`
pub async fn get_one<R, C>(
  State(state): State<AppState<R, C>>,
  Path(code): Path<String>,
) -> Result<Json<Taxon>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  state.reference_readable().await?;
  Ok(Json(state.catalogue.get_by_code(&code).await?))
}

// ─── Names ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NamesParams {
  /// Comma-separated scientific names.
  pub names: String,
  pub lang:  Option<Language>,
}

/// `GET /reference/names?names=<a>,<b>[&lang=]`
///
/// Names the resolver could not answer in time are absent from the map.
pub async fn resolve<R, C>(
  State(state): State<AppState<R, C>>,
  Query(params): Query<NamesParams>,
) -> Json<HashMap<String, Option<String>>>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  let names: Vec<String> = params
    .names
    .split(',')
    .map(|n| n.trim().to_owned())
    .filter(|n| !n.is_empty())
    .collect();
  Json(
    state
      .catalogue
      .resolve_localized_names(&names, params.lang.unwrap_or_default())
      .await,
  )
}

#[derive(Debug, Deserialize)]
pub struct LangParam {
  pub lang: Option<Language>,
}

/// `GET /names/{scientific_name}[?lang=]`
///
/// The name endpoint another server's name resolver calls.
pub async fn stored_name<R, C>(
  State(state): State<AppState<R, C>>,
  Path(scientific_name): Path<String>,
  Query(params): Query<LangParam>,
) -> Result<Json<Value>, ApiError>
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  state.reference_readable().await?;
  let language = params.lang.unwrap_or_default();
  match state.catalogue.stored_name(&scientific_name, language).await? {
    Some(name) => Ok(Json(json!({ "name": name }))),
    None => Err(ApiError::NotFound(format!(
      "no {language} name for {scientific_name:?}"
    ))),
  }
}
