//! Error types for `aves-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Query or record parameters rejected before any storage is touched.
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// A lookup miss. Callers treat this as an expected outcome.
  #[error("not found: {0}")]
  NotFound(String),
}

impl Error {
  pub fn invalid(message: impl Into<String>) -> Self {
    Self::InvalidArgument(message.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
