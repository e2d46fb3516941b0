//! Error type for `aves-catalogue`.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] aves_core::Error),

  /// The dataset could not be read at all (as opposed to a single bad row,
  /// which is skipped).
  #[error("dataset error: {0}")]
  Dataset(#[from] aves_dataset::Error),

  /// A write to the reference store failed. Batches committed before the
  /// failure survive; re-running ingestion resumes after them.
  #[error("reference store write failed: {0}")]
  StoreWrite(#[source] BoxError),

  /// A read from one of the stores failed.
  #[error("store read failed: {0}")]
  StoreRead(#[source] BoxError),

  /// The dataset yielded a different number of rows on the insert pass than
  /// on the counting pass.
  #[error("dataset changed during ingestion: expected {expected} rows, loaded {loaded}")]
  DatasetChanged { expected: u64, loaded: u64 },

  /// The in-flight ingestion this caller attached to failed.
  #[error("ingestion failed: {0}")]
  IngestFailed(String),

  #[error("background task failed: {0}")]
  Task(String),
}

impl Error {
  pub(crate) fn write(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::StoreWrite(Box::new(e))
  }

  pub(crate) fn read(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::StoreRead(Box::new(e))
  }

  /// Whether this is a lookup miss rather than a failure.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Core(aves_core::Error::NotFound(_)))
  }

  pub fn is_invalid_argument(&self) -> bool {
    matches!(self, Self::Core(aves_core::Error::InvalidArgument(_)))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
