//! Error type for `aves-sync`.
//!
//! Per-record remote failures never surface here: they are recorded in the
//! [`crate::SyncReport`]. Only failures that stop a whole run do.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// The local sighting store failed; the run cannot continue safely.
  #[error("local sighting store failed: {0}")]
  Local(#[source] BoxError),

  #[error("invalid remote URL {url:?}: {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("failed to build HTTP client: {0}")]
  Client(#[from] reqwest::Error),
}

impl Error {
  pub(crate) fn local(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Local(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
