//! Error type for `aves-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] aves_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value no domain type decodes from.
  #[error("corrupt column {column}: {value:?}")]
  Corrupt { column: &'static str, value: String },

  /// A batch or completion mark named a revision the store is not loading.
  #[error("store is loading revision {found:?}, not {expected:?}")]
  RevisionMismatch {
    expected: String,
    found:    Option<String>,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
