//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings in UTC, which sort
//! chronologically as text. Prediction lists are stored as compact JSON.
//! UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use aves_core::{
  sighting::{
    Coordinates, MediaRefs, Prediction, Sighting, SightingBody, SightingKind,
    SyncState,
  },
  taxon::{Language, LocalizedNames, Taxon},
};
use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Case folding ────────────────────────────────────────────────────────────

/// Unicode-aware case fold used for every case-insensitive comparison.
/// SQLite's own `NOCASE` only folds ASCII.
pub fn fold(s: &str) -> String { s.trim().to_lowercase() }

/// Register `fold(text)` on `conn` so queries can compare folded values.
pub fn register_fold(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    "fold",
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| {
      let value: Option<String> = ctx.get(0)?;
      Ok(value.map(|v| fold(&v)))
    },
  )
}

// ─── Predictions ─────────────────────────────────────────────────────────────

pub fn encode_predictions(p: Option<&Vec<Prediction>>) -> Result<Option<String>> {
  p.map(serde_json::to_string).transpose().map_err(Error::from)
}

pub fn decode_predictions(s: Option<&str>) -> Result<Option<Vec<Prediction>>> {
  s.map(serde_json::from_str).transpose().map_err(Error::from)
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<SightingKind> {
  SightingKind::from_str(s).map_err(|_| Error::Corrupt {
    column: "kind",
    value:  s.to_owned(),
  })
}

pub fn decode_sync_state(s: &str) -> Result<SyncState> {
  SyncState::from_str(s).map_err(|_| Error::Corrupt {
    column: "sync_state",
    value:  s.to_owned(),
  })
}

// ─── Taxa ────────────────────────────────────────────────────────────────────

/// Column list matching [`taxon_from_row`].
pub const TAXON_COLUMNS: &str = "species_code, scientific_name, english_name, \
   name_de, name_es, name_fr, name_it, name_nl, name_pt, taxon_order, family, \
   category, taxon_range, extinct, extinct_year, source_revision";

pub fn taxon_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Taxon> {
  let mut localized = LocalizedNames::default();
  for (i, lang) in Language::LOCALIZED.iter().enumerate() {
    localized.set(*lang, row.get(3 + i)?);
  }
  Ok(Taxon {
    species_code: row.get(0)?,
    scientific_name: row.get(1)?,
    english_name: row.get(2)?,
    localized,
    order: row.get(9)?,
    family: row.get(10)?,
    category: row.get(11)?,
    range: row.get(12)?,
    extinct: row.get::<_, i64>(13)? != 0,
    extinct_year: row.get(14)?,
    source_revision: row.get(15)?,
  })
}

// ─── Sightings ───────────────────────────────────────────────────────────────

/// Column list matching [`RawSighting::from_row`].
pub const SIGHTING_COLUMNS: &str = "sighting_id, kind, image_ref, video_ref, \
   audio_ref, note, latitude, longitude, observed_at, species_guess, \
   image_predictions, audio_predictions, created_at, updated_at, sync_state, \
   sync_error";

/// Raw values read directly from a `sightings` row.
pub struct RawSighting {
  pub sighting_id:       String,
  pub kind:              String,
  pub image_ref:         Option<String>,
  pub video_ref:         Option<String>,
  pub audio_ref:         Option<String>,
  pub note:              String,
  pub latitude:          Option<f64>,
  pub longitude:         Option<f64>,
  pub observed_at:       String,
  pub species_guess:     String,
  pub image_predictions: Option<String>,
  pub audio_predictions: Option<String>,
  pub created_at:        String,
  pub updated_at:        String,
  pub sync_state:        String,
  pub sync_error:        Option<String>,
}

impl RawSighting {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sighting_id:       row.get(0)?,
      kind:              row.get(1)?,
      image_ref:         row.get(2)?,
      video_ref:         row.get(3)?,
      audio_ref:         row.get(4)?,
      note:              row.get(5)?,
      latitude:          row.get(6)?,
      longitude:         row.get(7)?,
      observed_at:       row.get(8)?,
      species_guess:     row.get(9)?,
      image_predictions: row.get(10)?,
      audio_predictions: row.get(11)?,
      created_at:        row.get(12)?,
      updated_at:        row.get(13)?,
      sync_state:        row.get(14)?,
      sync_error:        row.get(15)?,
    })
  }

  pub fn into_sighting(self) -> Result<Sighting> {
    let location = match (self.latitude, self.longitude) {
      (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
      _ => None,
    };
    let body = SightingBody {
      kind: decode_kind(&self.kind)?,
      media: MediaRefs {
        image: self.image_ref,
        video: self.video_ref,
        audio: self.audio_ref,
      },
      note: self.note,
      location,
      observed_at: decode_dt(&self.observed_at)?,
      species_guess: self.species_guess,
      image_predictions: decode_predictions(self.image_predictions.as_deref())?,
      audio_predictions: decode_predictions(self.audio_predictions.as_deref())?,
    };
    Ok(Sighting {
      sighting_id: decode_uuid(&self.sighting_id)?,
      body,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      sync_state: decode_sync_state(&self.sync_state)?,
      sync_error: self.sync_error,
    })
  }
}

/// A [`SightingBody`] flattened into bindable column values.
pub struct EncodedBody {
  pub kind:              String,
  pub image_ref:         Option<String>,
  pub video_ref:         Option<String>,
  pub audio_ref:         Option<String>,
  pub note:              String,
  pub latitude:          Option<f64>,
  pub longitude:         Option<f64>,
  pub observed_at:       String,
  pub species_guess:     String,
  pub image_predictions: Option<String>,
  pub audio_predictions: Option<String>,
}

impl EncodedBody {
  pub fn new(body: &SightingBody) -> Result<Self> {
    Ok(Self {
      kind:              body.kind.to_string(),
      image_ref:         body.media.image.clone(),
      video_ref:         body.media.video.clone(),
      audio_ref:         body.media.audio.clone(),
      note:              body.note.clone(),
      latitude:          body.location.map(|c| c.latitude),
      longitude:         body.location.map(|c| c.longitude),
      observed_at:       encode_dt(body.observed_at),
      species_guess:     body.species_guess.clone(),
      image_predictions: encode_predictions(body.image_predictions.as_ref())?,
      audio_predictions: encode_predictions(body.audio_predictions.as_ref())?,
    })
  }
}
