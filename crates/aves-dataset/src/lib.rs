//! Reference dataset codec for Aves.
//!
//! Streams taxa out of the bundled CSV checklist. Pure synchronous; no
//! database or async dependencies. Records are decoded one at a time so the
//! whole file is never held in memory.
//!
//! # Quick start
//!
//! ```no_run
//! use aves_dataset::{DatasetSource, FileDataset, taxa};
//!
//! let source = FileDataset::new("birds.csv");
//! let revision = source.revision().unwrap();
//! for taxon in taxa(source.open().unwrap(), &revision).unwrap() {
//!   match taxon {
//!     Ok(t) => println!("{} {}", t.species_code, t.scientific_name),
//!     Err(e) if e.is_row_error() => eprintln!("skipped: {e}"),
//!     Err(e) => panic!("{e}"),
//!   }
//! }
//! ```

pub mod decode;
pub mod error;
pub mod records;
pub mod source;

use std::{collections::HashSet, io::BufRead};

use aves_core::taxon::Taxon;

pub use decode::ColumnMap;
pub use error::{Error, Result};
pub use records::{RawRecord, RecordReader};
pub use source::{BytesDataset, DatasetSource, FileDataset, fingerprint};

// ─── Taxon reader ────────────────────────────────────────────────────────────

/// Iterator over the taxa of one dataset.
///
/// Row errors ([`Error::is_row_error`]) are yielded in place and reading
/// continues. Any other error is yielded once and ends the iteration.
pub struct TaxonReader<R> {
  records:  RecordReader<R>,
  columns:  ColumnMap,
  revision: String,
  seen:     HashSet<String>,
  done:     bool,
}

/// Read the header from `reader` and return an iterator over its taxa.
pub fn taxa<R: BufRead>(reader: R, revision: &str) -> Result<TaxonReader<R>> {
  let mut records = RecordReader::new(reader);
  let header = records.next_record()?.ok_or(Error::MissingHeader)?;
  let columns = ColumnMap::from_header(&header)?;
  Ok(TaxonReader {
    records,
    columns,
    revision: revision.to_owned(),
    seen: HashSet::new(),
    done: false,
  })
}

impl<R> TaxonReader<R> {
  pub fn revision(&self) -> &str { &self.revision }
}

impl<R: BufRead> Iterator for TaxonReader<R> {
  type Item = Result<Taxon>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    let record = match self.records.next_record() {
      Ok(Some(record)) => record,
      Ok(None) => {
        self.done = true;
        return None;
      }
      Err(e) => {
        if !e.is_row_error() {
          self.done = true;
        }
        return Some(Err(e));
      }
    };

    let taxon = match self.columns.decode(&record, &self.revision) {
      Ok(t) => t,
      Err(e) => return Some(Err(e)),
    };
    if !self.seen.insert(taxon.species_code.clone()) {
      return Some(Err(Error::DuplicateCode {
        line: record.line,
        code: taxon.species_code,
      }));
    }
    Some(Ok(taxon))
  }
}
