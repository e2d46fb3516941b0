//! Wire-level types shared by the sync reconciler and remote-store backends.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::sighting::{Sighting, SightingBody};

/// A sighting as held by the remote store: the user fields plus the
/// last-write-wins clock. Local sync bookkeeping never leaves the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSighting {
  pub sighting_id: Uuid,
  #[serde(flatten)]
  pub body:        SightingBody,
  pub updated_at:  DateTime<Utc>,
}

impl From<&Sighting> for RemoteSighting {
  fn from(s: &Sighting) -> Self {
    Self {
      sighting_id: s.sighting_id,
      body:        s.body.clone(),
      updated_at:  s.updated_at,
    }
  }
}

/// Opaque position in the remote store's change feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteCursor(pub String);

impl RemoteCursor {
  pub fn as_str(&self) -> &str { &self.0 }
}

/// One page of the remote change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePage {
  pub records:     Vec<RemoteSighting>,
  /// Cursor to resume from; `None` only when the feed is empty.
  pub next_cursor: Option<RemoteCursor>,
  pub has_more:    bool,
}

/// Result of a create-or-update on the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
  /// The record was created or replaced.
  Applied,
  /// The remote already holds a newer copy; nothing was written.
  Stale,
}

/// Failures talking to a network collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
  #[error("remote unreachable: {0}")]
  Unreachable(String),

  #[error("remote call timed out after {0:?}")]
  Timeout(Duration),

  /// The remote refused the request and will keep refusing it.
  #[error("remote rejected the request: {0}")]
  Rejected(String),

  #[error("remote server error: {0}")]
  Server(String),
}

impl RemoteError {
  /// Whether retrying the same request can never succeed.
  pub fn is_permanent(&self) -> bool { matches!(self, Self::Rejected(_)) }
}
