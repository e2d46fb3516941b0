//! Storage and collaborator traits.
//!
//! Backends (e.g. `aves-store-sqlite`) implement the store traits; network
//! clients implement the collaborator traits. Services in higher crates are
//! generic over these abstractions, never over a concrete backend.
//!
//! All methods return `Send` futures so implementations can be driven from
//! spawned tasks in a multi-threaded tokio runtime.

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  query::{CategoryFilter, TaxonQuery},
  remote::{RemoteCursor, RemoteError, RemotePage, RemoteSighting, UpsertOutcome},
  sighting::{
    MergeOutcome, Sighting, SightingBody, SightingOrder, SyncState, SyncSummary,
  },
  taxon::{Language, Taxon},
};

// ─── Reference store ─────────────────────────────────────────────────────────

/// Which dataset revision the reference store holds and how far its load got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStamp {
  pub revision: String,
  /// Valid records in the dataset for this revision.
  pub total:    u64,
  /// Rows committed so far.
  pub loaded:   u64,
  /// Indexes are built and every row is present.
  pub complete: bool,
}

/// The embedded store of reference taxa.
///
/// Rows are only ever written through [`ReferenceStore::insert_batch`], one
/// transaction per batch, so readers never observe a half-written batch.
pub trait ReferenceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The revision currently stored, if any ingestion ever started.
  fn dataset_stamp(
    &self,
  ) -> impl Future<Output = Result<Option<DatasetStamp>, Self::Error>> + Send + '_;

  /// Prepare the store to receive `revision`.
  ///
  /// If an incomplete load of the same revision exists its committed rows are
  /// kept and the returned stamp says how many there are. Any other revision
  /// is wiped first.
  fn begin_revision(
    &self,
    revision: String,
    total: u64,
  ) -> impl Future<Output = Result<DatasetStamp, Self::Error>> + Send + '_;

  /// Insert one batch in a single transaction and return the new `loaded`
  /// count for the revision.
  fn insert_batch(
    &self,
    revision: String,
    batch: Vec<Taxon>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Build the secondary indexes used by catalogue queries.
  fn build_indexes(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Mark `revision` as fully loaded.
  fn mark_complete(
    &self,
    revision: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Return one page of taxa matching `query`.
  fn query_page<'a>(
    &'a self,
    query: &'a TaxonQuery,
  ) -> impl Future<Output = Result<Vec<Taxon>, Self::Error>> + Send + 'a;

  /// Count the taxa a query with these filters would page through.
  fn row_count(
    &self,
    search_text: String,
    category: CategoryFilter,
    language: Language,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Look a taxon up by its species code.
  fn get_by_code(
    &self,
    code: String,
  ) -> impl Future<Output = Result<Option<Taxon>, Self::Error>> + Send + '_;

  /// Look a taxon up by scientific name, ignoring case.
  fn find_by_scientific_name(
    &self,
    scientific_name: String,
  ) -> impl Future<Output = Result<Option<Taxon>, Self::Error>> + Send + '_;
}

// ─── Sighting store ──────────────────────────────────────────────────────────

/// The embedded store of the user's sightings.
///
/// Every write is committed before the returned future resolves.
pub trait SightingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── User operations ───────────────────────────────────────────────────

  /// Persist a new sighting as `unsynced` and return it.
  fn insert(
    &self,
    body: SightingBody,
  ) -> impl Future<Output = Result<Sighting, Self::Error>> + Send + '_;

  fn get(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Sighting>, Self::Error>> + Send + '_;

  /// All sightings ordered by observation time, optionally truncated.
  fn get_all(
    &self,
    limit: Option<usize>,
    order: SightingOrder,
  ) -> impl Future<Output = Result<Vec<Sighting>, Self::Error>> + Send + '_;

  /// Replace the user fields of a sighting, returning it to `unsynced`.
  /// Returns `None` if the sighting does not exist.
  fn update(
    &self,
    id: Uuid,
    body: SightingBody,
  ) -> impl Future<Output = Result<Option<Sighting>, Self::Error>> + Send + '_;

  /// Delete a sighting locally and schedule its remote deletion.
  /// Returns `false` if it did not exist.
  fn delete(&self, id: Uuid) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Whether any sighting's species guess equals `scientific_name`, ignoring
  /// case.
  fn exists_by_scientific_name(
    &self,
    scientific_name: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// The subset of `scientific_names` that have at least one sighting,
  /// lowercased.
  fn logged_names(
    &self,
    scientific_names: Vec<String>,
  ) -> impl Future<Output = Result<HashSet<String>, Self::Error>> + Send + '_;

  fn list_by_state(
    &self,
    state: SyncState,
  ) -> impl Future<Output = Result<Vec<Sighting>, Self::Error>> + Send + '_;

  fn sync_summary(&self) -> impl Future<Output = Result<SyncSummary, Self::Error>> + Send + '_;

  /// Move every `sync_failed` sighting back to `unsynced`. Returns how many.
  fn retry_failed(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Reconciler operations ─────────────────────────────────────────────

  /// Mark a sighting synced, but only if it has not been edited since the
  /// version stamped `pushed_version` was sent. Returns whether it changed.
  fn mark_synced(
    &self,
    id: Uuid,
    pushed_version: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Record a failed push of the version stamped `pushed_version`, moving
  /// the sighting to `state`. A sighting edited since is left alone. Returns
  /// whether it changed.
  fn mark_push_failed(
    &self,
    id: Uuid,
    pushed_version: DateTime<Utc>,
    state: SyncState,
    reason: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Merge a remote copy using last-write-wins on `updated_at`.
  fn apply_remote(
    &self,
    remote: RemoteSighting,
  ) -> impl Future<Output = Result<MergeOutcome, Self::Error>> + Send + '_;

  /// Ids deleted locally whose remote deletion is still outstanding.
  fn pending_deletions(&self) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  fn clear_pending_deletion(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Position reached in the remote change feed by the last pull.
  fn sync_cursor(
    &self,
  ) -> impl Future<Output = Result<Option<RemoteCursor>, Self::Error>> + Send + '_;

  fn set_sync_cursor(
    &self,
    cursor: RemoteCursor,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Collaborators ───────────────────────────────────────────────────────────

/// The network-side store the reconciler exchanges sightings with.
pub trait RemoteSightingStore: Send + Sync {
  /// Create or replace the record keyed by `record.sighting_id`. Repeating
  /// the call with the same record never creates a duplicate.
  fn upsert(
    &self,
    record: RemoteSighting,
  ) -> impl Future<Output = Result<UpsertOutcome, RemoteError>> + Send + '_;

  /// Records changed after `cursor` (from the start when `None`).
  fn list_since(
    &self,
    cursor: Option<RemoteCursor>,
    limit: usize,
  ) -> impl Future<Output = Result<RemotePage, RemoteError>> + Send + '_;

  /// Remove a record. Deleting an unknown id succeeds.
  fn delete(&self, id: Uuid) -> impl Future<Output = Result<(), RemoteError>> + Send + '_;
}

/// Resolves a scientific name to a common name in another language.
pub trait NameResolver: Send + Sync {
  fn resolve(
    &self,
    scientific_name: String,
    language: Language,
  ) -> impl Future<Output = Result<Option<String>, RemoteError>> + Send + '_;
}

/// The shell's "is online" signal.
pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> impl Future<Output = bool> + Send + '_;
}
