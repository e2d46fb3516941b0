//! Header mapping and record → [`Taxon`] decoding.
//!
//! Pipeline:
//!   header record
//!     └─ ColumnMap::from_header()   → column indexes
//!   data record
//!     └─ ColumnMap::decode()        → Taxon | MalformedRow

use aves_core::taxon::{Language, LocalizedNames, Taxon};

use crate::{
  error::{Error, Result},
  records::RawRecord,
};

const SPECIES_CODE: &str = "species_code";
const SCIENTIFIC_NAME: &str = "scientific name";
const CATEGORY: &str = "category";

/// Positions of the known columns within a dataset's header.
#[derive(Debug, Clone)]
pub struct ColumnMap {
  species_code:    usize,
  scientific_name: usize,
  english_name:    usize,
  category:        usize,
  order:           Option<usize>,
  family:          Option<usize>,
  range:           Option<usize>,
  extinct:         Option<usize>,
  extinct_year:    Option<usize>,
  localized:       Vec<(Language, usize)>,
}

fn normalise_header(h: &str) -> String {
  h.trim().to_ascii_lowercase().replace('_', " ")
}

impl ColumnMap {
  /// Locate columns by (case-insensitive) header name. Extra columns are
  /// ignored; missing optional columns decode as absent.
  pub fn from_header(header: &RawRecord) -> Result<Self> {
    let names: Vec<String> = header.fields.iter().map(|h| normalise_header(h)).collect();
    let find = |wanted: &str| {
      let wanted = normalise_header(wanted);
      names.iter().position(|n| *n == wanted)
    };
    let require = |wanted: &'static str| find(wanted).ok_or(Error::MissingColumn(wanted));

    let localized = Language::LOCALIZED
      .iter()
      .filter_map(|&lang| find(lang.dataset_header()).map(|idx| (lang, idx)))
      .collect();

    Ok(Self {
      species_code: require(SPECIES_CODE)?,
      scientific_name: require(SCIENTIFIC_NAME)?,
      english_name: require(Language::En.dataset_header())?,
      category: require(CATEGORY)?,
      order: find("order"),
      family: find("family"),
      range: find("range"),
      extinct: find("extinct"),
      extinct_year: find("extinct year"),
      localized,
    })
  }

  /// Decode one data record. `revision` is stamped onto the taxon.
  pub fn decode(&self, record: &RawRecord, revision: &str) -> Result<Taxon> {
    let malformed = |reason: String| Error::MalformedRow {
      line: record.line,
      reason,
    };
    let required = |idx: usize, column: &str| {
      record
        .field(idx)
        .map(str::to_owned)
        .ok_or_else(|| malformed(format!("missing {column}")))
    };

    let scientific_name = required(self.scientific_name, SCIENTIFIC_NAME)?;
    if scientific_name.starts_with("Clements") {
      return Err(malformed("title row, not a taxon".to_string()));
    }
    let species_code = required(self.species_code, SPECIES_CODE)?;
    let english_name = required(self.english_name, "English name")?;
    let category = required(self.category, CATEGORY)?;

    let optional = |idx: Option<usize>| {
      idx
        .and_then(|i| record.field(i))
        .map(str::to_owned)
    };

    let extinct = match optional(self.extinct).as_deref() {
      None | Some("0") => false,
      Some("1") => true,
      Some(other) if other.eq_ignore_ascii_case("true") || other.eq_ignore_ascii_case("yes") => true,
      Some(other) if other.eq_ignore_ascii_case("false") || other.eq_ignore_ascii_case("no") => false,
      Some(other) => return Err(malformed(format!("invalid extinct flag {other:?}"))),
    };

    let extinct_year = optional(self.extinct_year)
      .map(|y| {
        y.parse::<i32>()
          .map_err(|_| malformed(format!("invalid extinct year {y:?}")))
      })
      .transpose()?;

    let mut localized = LocalizedNames::default();
    for &(lang, idx) in &self.localized {
      localized.set(lang, record.field(idx).map(str::to_owned));
    }

    Ok(Taxon {
      species_code,
      scientific_name,
      english_name,
      localized,
      order: optional(self.order),
      family: optional(self.family),
      category,
      range: optional(self.range),
      extinct: extinct || extinct_year.is_some(),
      extinct_year,
      source_revision: revision.to_owned(),
    })
  }
}
