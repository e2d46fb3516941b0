//! Sighting records: the user's private log of observed birds.
//!
//! Sightings are created on the device and persisted locally before any
//! network attempt. The sync reconciler owns [`SyncState`]; every other field
//! belongs to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Capture ─────────────────────────────────────────────────────────────────

/// How the sighting was captured.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SightingKind {
  Photo,
  Video,
  Audio,
  #[default]
  Manual,
}

/// Locations of captured media. Opaque to this layer; never dereferenced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRefs {
  pub image: Option<String>,
  pub video: Option<String>,
  pub audio: Option<String>,
}

/// A WGS 84 position. Latitude and longitude are always present together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  pub latitude:  f64,
  pub longitude: f64,
}

impl Coordinates {
  pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
    if !(-90.0..=90.0).contains(&latitude) {
      return Err(Error::invalid(format!("latitude out of range: {latitude}")));
    }
    if !(-180.0..=180.0).contains(&longitude) {
      return Err(Error::invalid(format!("longitude out of range: {longitude}")));
    }
    Ok(Self { latitude, longitude })
  }

  /// Pair up two optional columns; anything but both-or-neither is an error.
  pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<Self>> {
    match (latitude, longitude) {
      (Some(lat), Some(lon)) => Self::new(lat, lon).map(Some),
      (None, None) => Ok(None),
      _ => Err(Error::invalid(
        "latitude and longitude must be given together",
      )),
    }
  }
}

/// One label/confidence pair produced by an on-device classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
  pub label:      String,
  pub confidence: f32,
}

// ─── Body ────────────────────────────────────────────────────────────────────

/// The user-entered content of a sighting. Reconciliation never edits these
/// fields except when adopting a newer remote copy wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SightingBody {
  #[serde(default)]
  pub kind:              SightingKind,
  #[serde(default)]
  pub media:             MediaRefs,
  #[serde(default)]
  pub note:              String,
  pub location:          Option<Coordinates>,
  pub observed_at:       DateTime<Utc>,
  /// Free-text species guess, usually a scientific name.
  #[serde(default)]
  pub species_guess:     String,
  pub image_predictions: Option<Vec<Prediction>>,
  pub audio_predictions: Option<Vec<Prediction>>,
}

impl SightingBody {
  /// A manual sighting with only a species guess and an observation time.
  pub fn manual(species_guess: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
    Self {
      kind: SightingKind::Manual,
      media: MediaRefs::default(),
      note: String::new(),
      location: None,
      observed_at,
      species_guess: species_guess.into(),
      image_predictions: None,
      audio_predictions: None,
    }
  }
}

// ─── Sync state ──────────────────────────────────────────────────────────────

/// Where a sighting stands relative to the remote store.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
  /// Not yet confirmed written remotely. Pushed on the next sync.
  #[default]
  Unsynced,
  Synced,
  /// Permanently rejected by the remote; excluded from pushes until retried.
  SyncFailed,
}

// ─── Sighting ────────────────────────────────────────────────────────────────

/// A persisted sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
  /// Generated on the device; also the remote upsert key.
  pub sighting_id: Uuid,
  #[serde(flatten)]
  pub body:        SightingBody,
  pub created_at:  DateTime<Utc>,
  /// Last user edit; the last-write-wins clock.
  pub updated_at:  DateTime<Utc>,
  pub sync_state:  SyncState,
  /// Why the last push of this record failed, if it did.
  pub sync_error:  Option<String>,
}

/// Ordering for [`crate::store::SightingStore::get_all`], by observation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SightingOrder {
  #[default]
  NewestFirst,
  OldestFirst,
}

/// Count of local sightings per sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncSummary {
  pub unsynced:          u64,
  pub synced:            u64,
  pub sync_failed:       u64,
  pub pending_deletions: u64,
}

impl SyncSummary {
  pub fn total(&self) -> u64 { self.unsynced + self.synced + self.sync_failed }

  /// Records that still need a successful push.
  pub fn outstanding(&self) -> u64 { self.unsynced + self.sync_failed }
}

/// What happened when a remote copy was merged into the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
  /// Not present locally; inserted as synced.
  Inserted,
  /// Present locally but older; replaced by the remote copy.
  Updated,
  /// Local copy is as new or newer, or the id was deleted locally.
  Kept,
}
