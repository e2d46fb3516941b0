//! Taxon records, one row of the reference catalogue.
//!
//! Taxa are immutable once ingested. A new dataset revision replaces the whole
//! table; individual rows are never patched.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ─── Language ────────────────────────────────────────────────────────────────

/// The fixed set of languages with a common-name column in the catalogue.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Language {
  #[default]
  En,
  De,
  Es,
  Fr,
  It,
  Nl,
  Pt,
}

impl Language {
  /// Every language other than English, in column order.
  pub const LOCALIZED: [Language; 6] = [
    Language::De,
    Language::Es,
    Language::Fr,
    Language::It,
    Language::Nl,
    Language::Pt,
  ];

  /// The reference-store column holding this language's common name.
  pub fn column(self) -> &'static str {
    match self {
      Self::En => "english_name",
      Self::De => "name_de",
      Self::Es => "name_es",
      Self::Fr => "name_fr",
      Self::It => "name_it",
      Self::Nl => "name_nl",
      Self::Pt => "name_pt",
    }
  }

  /// The header naming this language's column in the bundled dataset.
  pub fn dataset_header(self) -> &'static str {
    match self {
      Self::En => "English name",
      Self::De => "German name",
      Self::Es => "Spanish name",
      Self::Fr => "French name",
      Self::It => "Italian name",
      Self::Nl => "Dutch name",
      Self::Pt => "Portuguese name",
    }
  }
}

// ─── Localized names ─────────────────────────────────────────────────────────

/// Common names in the non-English catalogue languages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedNames {
  pub de: Option<String>,
  pub es: Option<String>,
  pub fr: Option<String>,
  pub it: Option<String>,
  pub nl: Option<String>,
  pub pt: Option<String>,
}

impl LocalizedNames {
  /// The stored name for `language`. English lives on [`Taxon`] itself and
  /// always yields `None` here.
  pub fn get(&self, language: Language) -> Option<&str> {
    let slot = match language {
      Language::En => return None,
      Language::De => &self.de,
      Language::Es => &self.es,
      Language::Fr => &self.fr,
      Language::It => &self.it,
      Language::Nl => &self.nl,
      Language::Pt => &self.pt,
    };
    slot.as_deref()
  }

  pub fn set(&mut self, language: Language, name: Option<String>) {
    let slot = match language {
      Language::En => return,
      Language::De => &mut self.de,
      Language::Es => &mut self.es,
      Language::Fr => &mut self.fr,
      Language::It => &mut self.it,
      Language::Nl => &mut self.nl,
      Language::Pt => &mut self.pt,
    };
    *slot = name;
  }
}

// ─── Taxon ───────────────────────────────────────────────────────────────────

/// One catalogued species, subspecies, group or other taxon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
  /// Stable unique key, e.g. `comrav`.
  pub species_code:    String,
  pub scientific_name: String,
  pub english_name:    String,
  pub localized:       LocalizedNames,
  pub order:           Option<String>,
  pub family:          Option<String>,
  /// Taxon category as it appears in the dataset (`species`, `issf`, ...).
  pub category:        String,
  pub range:           Option<String>,
  pub extinct:         bool,
  pub extinct_year:    Option<i32>,
  /// Revision of the dataset this row was ingested from.
  pub source_revision: String,
}

impl Taxon {
  /// The name shown to a user reading in `language`, falling back to the
  /// English common name when no translation is stored.
  pub fn display_name(&self, language: Language) -> &str {
    self
      .localized
      .get(language)
      .unwrap_or(self.english_name.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raven() -> Taxon {
    Taxon {
      species_code:    "comrav".into(),
      scientific_name: "Corvus corax".into(),
      english_name:    "Common Raven".into(),
      localized:       LocalizedNames {
        de: Some("Kolkrabe".into()),
        ..LocalizedNames::default()
      },
      order:           Some("Passeriformes".into()),
      family:          Some("Corvidae (Crows, Jays, and Magpies)".into()),
      category:        "species".into(),
      range:           None,
      extinct:         false,
      extinct_year:    None,
      source_revision: "test".into(),
    }
  }

  #[test]
  fn display_name_prefers_translation() {
    let t = raven();
    assert_eq!(t.display_name(Language::De), "Kolkrabe");
    assert_eq!(t.display_name(Language::Fr), "Common Raven");
    assert_eq!(t.display_name(Language::En), "Common Raven");
  }

  #[test]
  fn language_parses_case_insensitively() {
    assert_eq!("DE".parse::<Language>().unwrap(), Language::De);
    assert_eq!("pt".parse::<Language>().unwrap(), Language::Pt);
    assert!("xx".parse::<Language>().is_err());
  }
}
