//! Ingestion progress events and readiness state.
//!
//! Progress records are transient: they exist only while a run is observed
//! and are never persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The stage an ingestion run is in. Ordered: a run only ever moves forward.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum IngestPhase {
  Parsing,
  Inserting,
  Indexing,
  Complete,
}

/// Rows loaded so far into one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableProgress {
  pub loaded: u64,
  pub total:  u64,
}

/// A single progress event emitted by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestProgress {
  pub phase:   IngestPhase,
  pub loaded:  u64,
  pub total:   u64,
  pub message: Option<String>,
  /// Table name → loaded/total.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub tables:  BTreeMap<String, TableProgress>,
}

impl IngestProgress {
  pub fn new(phase: IngestPhase, loaded: u64, total: u64) -> Self {
    Self {
      phase,
      loaded,
      total,
      message: None,
      tables: BTreeMap::new(),
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }

  pub fn with_table(mut self, table: &str, loaded: u64, total: u64) -> Self {
    self
      .tables
      .insert(table.to_owned(), TableProgress { loaded, total });
    self
  }

  pub fn is_complete(&self) -> bool { self.phase == IngestPhase::Complete }
}

/// Summary of a finished (or short-circuited) ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
  pub revision:     String,
  /// Rows present in the reference store for `revision`.
  pub loaded:       u64,
  /// Valid records in the dataset.
  pub total:        u64,
  /// Malformed or duplicate records skipped during this run.
  pub skipped:      u64,
  /// Records already committed by an earlier, interrupted run.
  pub resumed_from: u64,
  pub elapsed_ms:   u64,
  /// `true` when the store already held this revision and nothing was parsed.
  pub reused:       bool,
}

/// Whether the reference catalogue can be queried with final results.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReadyState {
  #[default]
  Uninitialized,
  Ingesting,
  Ready {
    report: IngestReport,
  },
  /// The last run failed; calling `ensure_ready` again retries it.
  Failed {
    reason: String,
  },
}

impl ReadyState {
  pub fn is_ready(&self) -> bool { matches!(self, Self::Ready { .. }) }
}
