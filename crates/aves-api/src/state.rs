//! Shared state threaded through the app handlers.

use std::sync::Arc;

use aves_catalogue::{Catalogue, Ingestor, NameSource};
use aves_core::progress::ReadyState;
use aves_dataset::DatasetSource;
use aves_store_sqlite::{SqliteReferenceStore, SqliteSightingStore};
use aves_sync::Reconciler;

use crate::error::ApiError;

pub type AppIngestor = Ingestor<SqliteReferenceStore, Box<dyn DatasetSource>>;
pub type AppCatalogue =
  Catalogue<SqliteReferenceStore, SqliteSightingStore, NameSource<SqliteReferenceStore>>;

/// `R` and `C` are the remote store and connectivity signal sync uses.
pub struct AppState<R, C> {
  pub ingestor:  AppIngestor,
  pub catalogue: Arc<AppCatalogue>,
  pub sightings: SqliteSightingStore,
  /// `None` when no remote is configured.
  pub sync:      Option<Arc<Reconciler<SqliteSightingStore, R, C>>>,
}

impl<R, C> Clone for AppState<R, C> {
  fn clone(&self) -> Self {
    Self {
      ingestor:  self.ingestor.clone(),
      catalogue: Arc::clone(&self.catalogue),
      sightings: self.sightings.clone(),
      sync:      self.sync.clone(),
    }
  }
}

impl<R, C> AppState<R, C> {
  /// Reject catalogue reads until ingestion has at least started
  /// successfully. While it runs, reads see the batches committed so far;
  /// the returned flag says whether the data is final.
  pub async fn reference_readable(&self) -> Result<bool, ApiError> {
    match self.ingestor.status().await {
      ReadyState::Ready { .. } => Ok(true),
      ReadyState::Ingesting => Ok(false),
      ReadyState::Uninitialized => Err(ApiError::NotReady(
        "ingestion has not been started".to_string(),
      )),
      ReadyState::Failed { reason } => Err(ApiError::NotReady(reason)),
    }
  }
}
