//! Runtime server configuration, deserialised from `aves.toml` and
//! `AVES__`-prefixed environment variables.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:            String,
  #[serde(default = "default_port")]
  pub port:            u16,
  pub reference_db:    PathBuf,
  pub sightings_db:    PathBuf,
  pub dataset:         DatasetConfig,
  /// Start ingestion in the background as soon as the server is up.
  #[serde(default = "default_true")]
  pub ingest_on_start: bool,
  #[serde(default)]
  pub names:           NamesConfig,
  /// Hub this server's sightings sync with. Sync is disabled without it.
  pub remote:          Option<RemoteConfig>,
  /// Serve the hub routes from this server.
  pub hub:             Option<HubSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
  pub path:       PathBuf,
  /// Fixed revision marker; the file's content hash when unset.
  pub revision:   Option<String>,
  pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamesConfig {
  /// Base URL of a server answering `GET /names/{scientific_name}`.
  /// Names come from the local reference store when unset.
  pub url:        Option<String>,
  pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  pub url:          String,
  #[serde(default)]
  pub username:     String,
  #[serde(default)]
  pub password:     String,
  #[serde(default = "default_sync_timeout")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubSection {
  pub store_path:    PathBuf,
  pub username:      String,
  pub password_hash: String,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 5240 }

fn default_true() -> bool { true }

fn default_sync_timeout() -> u64 { 10 }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minimal_toml_fills_defaults() {
    let cfg: ServerConfig = toml_config(
      r#"
        reference_db = "ref.db"
        sightings_db = "sightings.db"
        [dataset]
        path = "taxonomy.csv"
      "#,
    );
    assert_eq!((cfg.host.as_str(), cfg.port), ("127.0.0.1", 5240));
    assert!(cfg.ingest_on_start);
    assert!(cfg.remote.is_none() && cfg.hub.is_none() && cfg.names.url.is_none());
  }

  #[test]
  fn remote_section_defaults_timeout() {
    let cfg: ServerConfig = toml_config(
      r#"
        reference_db = "ref.db"
        sightings_db = "sightings.db"
        [dataset]
        path = "taxonomy.csv"
        revision = "2024"
        [remote]
        url = "http://hub.local:5240"
      "#,
    );
    assert_eq!(cfg.dataset.revision.as_deref(), Some("2024"));
    let remote = cfg.remote.unwrap();
    assert_eq!(remote.timeout_secs, 10);
    assert!(remote.username.is_empty());
  }

  fn toml_config(raw: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(raw, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }
}
