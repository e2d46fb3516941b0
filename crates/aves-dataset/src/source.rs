//! Where a dataset's bytes come from, and how its revision is identified.

use std::{
  fs::File,
  io::{BufRead, BufReader, Cursor, Read},
  path::PathBuf,
  sync::Arc,
};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A reopenable dataset.
///
/// Ingestion reads the dataset twice (a counting pass, then the insert pass)
/// so a source must be able to produce a fresh reader on every call.
pub trait DatasetSource: Send + Sync + 'static {
  /// Identifier of the dataset contents. Two sources with the same revision
  /// are assumed to hold identical records.
  fn revision(&self) -> Result<String>;

  fn open(&self) -> Result<Box<dyn BufRead + Send>>;

  /// Human-readable label for logs.
  fn describe(&self) -> String;
}

impl DatasetSource for Box<dyn DatasetSource> {
  fn revision(&self) -> Result<String> { (**self).revision() }

  fn open(&self) -> Result<Box<dyn BufRead + Send>> { (**self).open() }

  fn describe(&self) -> String { (**self).describe() }
}

/// Lower-case hex SHA-256 of everything `reader` yields.
pub fn fingerprint(mut reader: impl Read) -> std::io::Result<String> {
  let mut hasher = Sha256::new();
  let mut buf = [0u8; 64 * 1024];
  loop {
    let n = reader.read(&mut buf)?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }
  Ok(hex::encode(hasher.finalize()))
}

// ─── File ────────────────────────────────────────────────────────────────────

/// A dataset file on disk. Without an explicit revision the file's content
/// hash is used.
#[derive(Debug, Clone)]
pub struct FileDataset {
  path:     PathBuf,
  revision: Option<String>,
}

impl FileDataset {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path:     path.into(),
      revision: None,
    }
  }

  pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
    self.revision = Some(revision.into());
    self
  }

  fn open_file(&self) -> Result<File> {
    File::open(&self.path).map_err(|source| Error::Open {
      path: self.path.clone(),
      source,
    })
  }
}

impl DatasetSource for FileDataset {
  fn revision(&self) -> Result<String> {
    if let Some(rev) = &self.revision {
      return Ok(rev.clone());
    }
    let file = self.open_file()?;
    fingerprint(BufReader::new(file)).map_err(|source| Error::Open {
      path: self.path.clone(),
      source,
    })
  }

  fn open(&self) -> Result<Box<dyn BufRead + Send>> {
    Ok(Box::new(BufReader::new(self.open_file()?)))
  }

  fn describe(&self) -> String { self.path.display().to_string() }
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// A dataset held in memory, e.g. one compiled into the binary.
#[derive(Debug, Clone)]
pub struct BytesDataset {
  bytes:    Arc<[u8]>,
  revision: String,
}

impl BytesDataset {
  pub fn new(bytes: impl Into<Arc<[u8]>>, revision: impl Into<String>) -> Self {
    Self {
      bytes:    bytes.into(),
      revision: revision.into(),
    }
  }

  /// Use the content hash as the revision.
  pub fn fingerprinted(bytes: impl Into<Arc<[u8]>>) -> Self {
    let bytes = bytes.into();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let revision = hex::encode(hasher.finalize());
    Self { bytes, revision }
  }
}

impl DatasetSource for BytesDataset {
  fn revision(&self) -> Result<String> { Ok(self.revision.clone()) }

  fn open(&self) -> Result<Box<dyn BufRead + Send>> {
    Ok(Box::new(Cursor::new(Arc::clone(&self.bytes))))
  }

  fn describe(&self) -> String {
    format!("in-memory dataset ({} bytes)", self.bytes.len())
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  #[test]
  fn file_revision_is_content_hash() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"abc").unwrap();
    let source = FileDataset::new(file.path());
    assert_eq!(
      source.revision().unwrap(),
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
  }

  #[test]
  fn explicit_revision_wins() {
    let source = FileDataset::new("/does/not/exist.csv").with_revision("v2024");
    assert_eq!(source.revision().unwrap(), "v2024");
    assert!(matches!(source.open(), Err(Error::Open { .. })));
  }

  #[test]
  fn bytes_dataset_reopens() {
    let source = BytesDataset::fingerprinted(b"line\n".to_vec());
    for _ in 0..2 {
      let mut s = String::new();
      source.open().unwrap().read_to_string(&mut s).unwrap();
      assert_eq!(s, "line\n");
    }
    assert_eq!(source.revision().unwrap().len(), 64);
  }
}
