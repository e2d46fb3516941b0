//! Reference-catalogue query parameters.
//!
//! Every constructor here validates its input, so a [`TaxonQuery`] that
//! reaches a store is always well-formed.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, taxon::Language};

/// Largest page a single query may request.
pub const MAX_PAGE_SIZE: i64 = 1000;

// ─── Sort field ──────────────────────────────────────────────────────────────

/// The columns a catalogue page may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
  /// The displayed (possibly localized) common name.
  #[default]
  Name,
  ScientificName,
  Family,
}

impl FromStr for SortField {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "name" => Ok(Self::Name),
      "scientific_name" | "scientificname" | "scientific name" => {
        Ok(Self::ScientificName)
      }
      "family" => Ok(Self::Family),
      other => Err(Error::invalid(format!("unknown sort field: {other:?}"))),
    }
  }
}

impl fmt::Display for SortField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Name => "name",
      Self::ScientificName => "scientific_name",
      Self::Family => "family",
    })
  }
}

// ─── Category filter ─────────────────────────────────────────────────────────

/// Restricts a query to one taxon category. `"all"` disables the filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
  #[default]
  All,
  Only(String),
}

impl CategoryFilter {
  pub fn category(&self) -> Option<&str> {
    match self {
      Self::All => None,
      Self::Only(c) => Some(c.as_str()),
    }
  }
}

impl From<&str> for CategoryFilter {
  fn from(s: &str) -> Self {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("all") {
      Self::All
    } else {
      Self::Only(s.to_owned())
    }
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for a paginated catalogue query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonQuery {
  /// Case-insensitive substring matched against the displayed name and the
  /// scientific name. Empty matches everything.
  pub search_text: String,
  pub sort:        SortField,
  pub ascending:   bool,
  pub page_size:   u32,
  /// 1-indexed page number.
  pub page_number: u32,
  pub category:    CategoryFilter,
  /// Language whose common name is displayed, searched and sorted on.
  pub language:    Language,
}

impl TaxonQuery {
  /// Build a query from raw caller input, rejecting bad pagination and
  /// unknown sort fields.
  pub fn new(
    search_text: &str,
    sort_field: &str,
    ascending: bool,
    page_size: i64,
    page_number: i64,
    category: &str,
  ) -> Result<Self> {
    let sort = sort_field.parse()?;
    let (page_size, page_number) = validate_page(page_size, page_number)?;
    Ok(Self {
      search_text: search_text.trim().to_owned(),
      sort,
      ascending,
      page_size,
      page_number,
      category: CategoryFilter::from(category),
      language: Language::En,
    })
  }

  pub fn with_language(mut self, language: Language) -> Self {
    self.language = language;
    self
  }

  /// Row offset of the first record on this page.
  pub fn offset(&self) -> u64 {
    u64::from(self.page_number - 1) * u64::from(self.page_size)
  }
}

fn validate_page(page_size: i64, page_number: i64) -> Result<(u32, u32)> {
  if page_number < 1 {
    return Err(Error::invalid(format!(
      "page number must be 1 or greater, got {page_number}"
    )));
  }
  if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
    return Err(Error::invalid(format!(
      "page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
    )));
  }
  let page_number = u32::try_from(page_number)
    .map_err(|_| Error::invalid(format!("page number too large: {page_number}")))?;
  // Bounded above by MAX_PAGE_SIZE.
  let page_size = page_size as u32;
  Ok((page_size, page_number))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn page_zero_is_rejected() {
    let err = TaxonQuery::new("", "name", true, 10, 0, "all").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
  }

  #[test]
  fn negative_page_is_rejected() {
    let err = TaxonQuery::new("", "name", true, 10, -3, "all").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
  }

  #[test]
  fn zero_page_size_is_rejected() {
    let err = TaxonQuery::new("", "name", true, 0, 1, "all").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
  }

  #[test]
  fn unknown_sort_field_is_rejected() {
    let err = TaxonQuery::new("", "wingspan", true, 10, 1, "all").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
  }

  #[test]
  fn all_category_is_no_filter() {
    let q = TaxonQuery::new("", "family", false, 25, 3, "ALL").unwrap();
    assert_eq!(q.category, CategoryFilter::All);
    assert_eq!(q.sort, SortField::Family);
    assert_eq!(q.offset(), 50);
  }

  #[test]
  fn category_is_kept_verbatim() {
    let q = TaxonQuery::new(" raven ", "scientific_name", true, 10, 1, "species")
      .unwrap();
    assert_eq!(q.category, CategoryFilter::Only("species".into()));
    assert_eq!(q.search_text, "raven");
  }
}
