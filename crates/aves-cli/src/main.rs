//! `aves`: bird sighting log and reference catalogue on this device.
//!
//! Keeps the catalogue and the sighting log in SQLite files under the data
//! directory, and syncs sightings with a hub served by `aves-server`.
//!
//! # Usage
//!
//! ```
//! aves --dataset ~/birds/clements.csv ingest
//! aves search raven --lang de
//! aves log "Corvus corax" --lat 52.5 --lon 13.4 --note "two, calling"
//! aves --hub-url http://hub.local:5240 --hub-user alice sync
//! ```

mod app;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use app::{App, Settings};
use aves_core::{
  query::TaxonQuery,
  sighting::{Coordinates, SightingBody, SightingKind, SightingOrder, SyncState},
  store::SightingStore,
  taxon::Language,
};
use aves_sync::HubConfig;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "aves", version, about = "Bird sightings and reference catalogue")]
struct Args {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE", env = "AVES_CONFIG")]
  config: Option<PathBuf>,

  /// Directory holding the local databases (default: ~/.local/share/aves).
  #[arg(long, env = "AVES_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Reference dataset CSV to load into the catalogue.
  #[arg(long, env = "AVES_DATASET")]
  dataset: Option<PathBuf>,

  /// Revision label for the dataset (default: its content hash).
  #[arg(long)]
  dataset_revision: Option<String>,

  /// Base URL of the sync hub.
  #[arg(long, env = "AVES_HUB_URL")]
  hub_url: Option<String>,

  #[arg(long, env = "AVES_HUB_USER")]
  hub_user: Option<String>,

  /// Hub password (plaintext).
  #[arg(long, env = "AVES_HUB_PASSWORD")]
  hub_password: Option<String>,

  /// Remote service answering localized-name lookups.
  #[arg(long, env = "AVES_NAMES_URL")]
  names_url: Option<String>,

  /// Print results as JSON.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Load the reference dataset if it is not loaded yet.
  Ingest,
  /// Search the catalogue by common or scientific name.
  Search {
    #[arg(default_value = "")]
    query:    String,
    /// name, scientific, code, family or order.
    #[arg(long, default_value = "name")]
    sort:     String,
    #[arg(long)]
    desc:     bool,
    #[arg(long, default_value_t = 20)]
    size:     i64,
    #[arg(long, default_value_t = 1)]
    page:     i64,
    /// species, or all.
    #[arg(long, default_value = "all")]
    category: String,
    #[arg(long, default_value = "en")]
    lang:     Language,
  },
  /// Count the taxa matching a search.
  Count {
    #[arg(default_value = "")]
    query:    String,
    #[arg(long, default_value = "all")]
    category: String,
    #[arg(long, default_value = "en")]
    lang:     Language,
  },
  /// Show one taxon by species code.
  Show {
    code: String,
    #[arg(long, default_value = "en")]
    lang: Language,
  },
  /// Common names for scientific names.
  Names {
    #[arg(required = true)]
    names: Vec<String>,
    #[arg(long, default_value = "en")]
    lang:  Language,
  },
  /// Record a sighting.
  Log {
    /// Species guess, usually a scientific name.
    species: String,
    #[arg(long, default_value = "")]
    note:    String,
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat:     Option<f64>,
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon:     Option<f64>,
    /// photo, video, audio or manual.
    #[arg(long, default_value = "manual")]
    kind:    SightingKind,
    /// Observation time, RFC 3339 (default: now).
    #[arg(long)]
    at:      Option<DateTime<Utc>>,
    /// Location of the captured media for photo, video or audio sightings.
    #[arg(long)]
    media:   Option<String>,
  },
  /// List logged sightings, newest first.
  Sightings {
    #[arg(long)]
    limit:        Option<usize>,
    #[arg(long)]
    oldest_first: bool,
    /// Only sightings in this sync state (unsynced, synced, sync_failed).
    #[arg(long)]
    state:        Option<SyncState>,
  },
  /// Delete a sighting here and, on the next sync, on the hub.
  Delete { id: Uuid },
  /// Push local changes to the hub and pull remote ones.
  Sync {
    /// Requeue sightings the hub rejected before syncing.
    #[arg(long)]
    retry_failed: bool,
  },
  /// Summarise the catalogue and the sighting log.
  Status,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default, Debug)]
struct ConfigFile {
  data_dir:         Option<PathBuf>,
  dataset:          Option<PathBuf>,
  dataset_revision: Option<String>,
  names_url:        Option<String>,
  #[serde(default)]
  hub:              HubFile,
}

#[derive(Deserialize, Default, Debug)]
struct HubFile {
  url:          Option<String>,
  #[serde(default)]
  username:     String,
  #[serde(default)]
  password:     String,
  timeout_secs: Option<u64>,
}

fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
  let Some(path) = path else {
    return Ok(ConfigFile::default());
  };
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading config file {}", path.display()))?;
  toml::from_str(&raw).context("parsing config file")
}

/// CLI flags override the config file, which overrides defaults.
fn settings(args: &Args, file: ConfigFile) -> Settings {
  let data_dir = args
    .data_dir
    .clone()
    .or(file.data_dir)
    .map(|p| expand_tilde(&p))
    .unwrap_or_else(default_data_dir);

  let hub = args.hub_url.clone().or(file.hub.url).map(|url| HubConfig {
    base_url: url,
    username: args.hub_user.clone().unwrap_or(file.hub.username),
    password: args.hub_password.clone().unwrap_or(file.hub.password),
    timeout:  std::time::Duration::from_secs(file.hub.timeout_secs.unwrap_or(10).max(1)),
  });

  Settings {
    data_dir,
    dataset: args
      .dataset
      .clone()
      .or(file.dataset)
      .map(|p| expand_tilde(&p)),
    dataset_revision: args.dataset_revision.clone().or(file.dataset_revision),
    hub,
    names_url: args.names_url.clone().or(file.names_url),
  }
}

fn default_data_dir() -> PathBuf {
  match std::env::var("HOME") {
    Ok(home) => PathBuf::from(home).join(".local/share/aves"),
    Err(_) => PathBuf::from("aves-data"),
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let file = load_config_file(args.config.as_deref())?;
  let app = App::open(settings(&args, file)).await?;
  run(&app, args.command, args.json).await
}

async fn run(app: &App, command: Command, json: bool) -> Result<()> {
  match command {
    Command::Ingest => {
      let report = app.ingest(render::progress).await?;
      if json {
        render::json(&report)?;
      } else {
        render::ingest_report(&report);
      }
    }

    Command::Search {
      query,
      sort,
      desc,
      size,
      page,
      category,
      lang,
    } => {
      app.ensure_catalogue(render::progress).await?;
      let q = TaxonQuery::new(&query, &sort, !desc, size, page, &category)?.with_language(lang);
      let rows = app.catalogue.listing_page(&q).await?;
      let total = app.catalogue.row_count(&query, &category, lang).await?;
      if json {
        render::json(&serde_json::json!({ "items": rows, "total": total }))?;
      } else {
        render::listing(&rows, total, page, size);
      }
    }

    Command::Count {
      query,
      category,
      lang,
    } => {
      app.ensure_catalogue(render::progress).await?;
      let count = app.catalogue.row_count(&query, &category, lang).await?;
      if json {
        render::json(&serde_json::json!({ "count": count }))?;
      } else {
        println!("{count}");
      }
    }

    Command::Show { code, lang } => {
      app.ensure_catalogue(render::progress).await?;
      let taxon = app.catalogue.get_by_code(&code).await?;
      if json {
        render::json(&taxon)?;
      } else {
        render::taxon(&taxon, lang);
      }
    }

    Command::Names { names, lang } => {
      let resolved = app.catalogue.resolve_localized_names(&names, lang).await;
      if json {
        render::json(&resolved)?;
      } else {
        render::names(&names, &resolved);
      }
    }

    Command::Log {
      species,
      note,
      lat,
      lon,
      kind,
      at,
      media,
    } => {
      let body = sighting_body(species, note, lat, lon, kind, at, media)?;
      let sighting = app.sightings.insert(body).await?;
      if json {
        render::json(&sighting)?;
      } else {
        render::sighting(&sighting);
      }
    }

    Command::Sightings {
      limit,
      oldest_first,
      state,
    } => {
      let mut sightings = match state {
        Some(state) => app.sightings.list_by_state(state).await?,
        None => {
          let order = if oldest_first {
            SightingOrder::OldestFirst
          } else {
            SightingOrder::NewestFirst
          };
          app.sightings.get_all(limit, order).await?
        }
      };
      if state.is_some() {
        if !oldest_first {
          sightings.reverse();
        }
        if let Some(limit) = limit {
          sightings.truncate(limit);
        }
      }
      if json {
        render::json(&sightings)?;
      } else {
        sightings.iter().for_each(render::sighting);
      }
    }

    Command::Delete { id } => {
      if !app.sightings.delete(id).await? {
        bail!("no sighting {id}");
      }
      if !json {
        println!("deleted {id}");
      }
    }

    Command::Sync { retry_failed } => {
      let report = app.sync(retry_failed).await?;
      if json {
        render::json(&report)?;
      } else {
        render::sync_report(&report);
      }
    }

    Command::Status => {
      let stamp = app.stamp().await?;
      let summary = app.sightings.sync_summary().await?;
      let hub = app.hub().map(|h| h.base_url.as_str());
      if json {
        render::json(&serde_json::json!({
          "reference": stamp,
          "sightings": summary,
          "hub": hub,
        }))?;
      } else {
        render::status(stamp.as_ref(), &summary, hub);
      }
    }
  }
  Ok(())
}

fn sighting_body(
  species: String,
  note: String,
  lat: Option<f64>,
  lon: Option<f64>,
  kind: SightingKind,
  at: Option<DateTime<Utc>>,
  media: Option<String>,
) -> Result<SightingBody> {
  let mut body = SightingBody::manual(species.trim(), at.unwrap_or_else(Utc::now));
  body.kind = kind;
  body.note = note;
  body.location = Coordinates::from_parts(lat, lon)?;
  match (kind, media) {
    (SightingKind::Photo, media) => body.media.image = media,
    (SightingKind::Video, media) => body.media.video = media,
    (SightingKind::Audio, media) => body.media.audio = media,
    (SightingKind::Manual, Some(_)) => bail!("--media needs --kind photo, video or audio"),
    (SightingKind::Manual, None) => {}
  }
  Ok(body)
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  fn args(extra: &[&str]) -> Args {
    let mut argv = vec!["aves"];
    argv.extend_from_slice(extra);
    argv.push("status");
    Args::try_parse_from(argv).unwrap()
  }

  #[test]
  fn flags_override_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      r#"
data_dir = "/var/lib/aves"
dataset = "/srv/clements.csv"

[hub]
url = "http://hub.local:5240"
username = "alice"
password = "from-file"
timeout_secs = 3
"#
    )
    .unwrap();

    let cfg = load_config_file(Some(file.path())).unwrap();
    let s = settings(&args(&["--hub-password", "from-flag"]), cfg);
    assert_eq!(s.data_dir, PathBuf::from("/var/lib/aves"));
    assert_eq!(s.dataset, Some(PathBuf::from("/srv/clements.csv")));
    let hub = s.hub.unwrap();
    assert_eq!(hub.base_url, "http://hub.local:5240");
    assert_eq!(hub.username, "alice");
    assert_eq!(hub.password, "from-flag");
    assert_eq!(hub.timeout, std::time::Duration::from_secs(3));
  }

  #[test]
  fn no_hub_without_url() {
    let s = settings(&args(&["--hub-user", "alice"]), ConfigFile::default());
    assert!(s.hub.is_none());

    let s = settings(&args(&["--hub-url", "http://hub.local"]), ConfigFile::default());
    assert_eq!(s.hub.unwrap().timeout, std::time::Duration::from_secs(10));
    assert!(s.dataset.is_none());
  }

  #[test]
  fn media_goes_to_the_kind_slot() {
    let body = sighting_body(
      " Corvus corax ".into(),
      String::new(),
      Some(52.5),
      Some(13.4),
      SightingKind::Audio,
      None,
      Some("file:///rec/1.m4a".into()),
    )
    .unwrap();
    assert_eq!(body.species_guess, "Corvus corax");
    assert_eq!(body.media.audio.as_deref(), Some("file:///rec/1.m4a"));
    assert!(body.media.image.is_none());
    assert!(body.location.is_some());
  }

  #[test]
  fn manual_sighting_rejects_media_and_bad_coordinates() {
    let media = sighting_body(
      "Pica pica".into(),
      String::new(),
      None,
      None,
      SightingKind::Manual,
      None,
      Some("x".into()),
    );
    assert!(media.is_err());

    let coords = sighting_body(
      "Pica pica".into(),
      String::new(),
      Some(123.0),
      Some(0.0),
      SightingKind::Manual,
      None,
      None,
    );
    assert!(coords.is_err());
  }
}
