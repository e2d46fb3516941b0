//! What a reconciliation run did.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a run currently is. Observed through
/// [`crate::Reconciler::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
  #[default]
  Idle,
  CheckingConnectivity,
  Pushing,
  Pulling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
  /// Every outstanding change was exchanged.
  Completed,
  /// The run finished but some records or the pull did not go through.
  Partial,
  /// The connectivity signal said offline; nothing was attempted.
  Offline,
  /// Another run was already in flight; this trigger did nothing.
  Coalesced,
  /// The local store failed and the run stopped.
  Failed { reason: String },
}

/// A record the run could not write remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushFailure {
  pub sighting_id: Uuid,
  pub reason:      String,
  /// The remote rejected the record; it now waits for `retry_failed`.
  pub permanent:   bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
  pub outcome:            SyncOutcome,
  /// Records confirmed written remotely and marked synced.
  pub pushed:             u64,
  pub push_failures:      Vec<PushFailure>,
  /// Remote deletions completed.
  pub deleted:            u64,
  /// Remote records inserted locally.
  pub pulled:             u64,
  /// Local records overwritten by a newer remote copy.
  pub updated:            u64,
  pub pull_error:         Option<String>,
  /// `unsynced` plus `sync_failed` sightings once the run ended.
  pub unsynced_remaining: u64,
  pub total:              u64,
  pub elapsed_ms:         u64,
}

impl SyncReport {
  pub fn new(outcome: SyncOutcome) -> Self {
    Self {
      outcome,
      pushed: 0,
      push_failures: Vec::new(),
      deleted: 0,
      pulled: 0,
      updated: 0,
      pull_error: None,
      unsynced_remaining: 0,
      total: 0,
      elapsed_ms: 0,
    }
  }

  /// Whether anything the run attempted failed.
  pub fn had_failures(&self) -> bool {
    !self.push_failures.is_empty() || self.pull_error.is_some()
  }

  /// The non-blocking status line shown to the user.
  pub fn summary(&self) -> String {
    format!(
      "{} of {} sightings not yet synced",
      self.unsynced_remaining, self.total
    )
  }
}
