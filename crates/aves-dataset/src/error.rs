//! Error types for the aves-dataset codec.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to open dataset {path:?}")]
  Open {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read dataset at line {line}")]
  Read {
    line:   u64,
    #[source]
    source: io::Error,
  },

  #[error("dataset has no header row")]
  MissingHeader,

  #[error("dataset header lacks required column {0:?}")]
  MissingColumn(&'static str),

  /// One record could not be decoded. Non-fatal: the reader moves on.
  #[error("line {line}: {reason}")]
  MalformedRow { line: u64, reason: String },

  /// A species code already seen earlier in the file. Non-fatal.
  #[error("line {line}: duplicate species code {code:?}")]
  DuplicateCode { line: u64, code: String },
}

impl Error {
  /// Whether this error concerns a single record, leaving the rest of the
  /// dataset readable.
  pub fn is_row_error(&self) -> bool {
    matches!(self, Self::MalformedRow { .. } | Self::DuplicateCode { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
