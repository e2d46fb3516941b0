//! aves-server binary.
//!
//! Reads `aves.toml` (or the path given with `--config`), opens the SQLite
//! stores, starts loading the reference dataset in the background, and
//! serves the JSON API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `hub.password_hash`:
//!
//! ```
//! cargo run -p aves-api --bin aves-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use aves_api::{AppState, HubState, ServerConfig, auth::AuthConfig, config::RemoteConfig};
use aves_catalogue::{
  Catalogue, CatalogueConfig, HttpNameResolver, IngestConfig, Ingestor, NameSource, StoredNames,
};
use aves_dataset::{DatasetSource, FileDataset};
use aves_store_sqlite::{SqliteHub, SqliteReferenceStore, SqliteSightingStore};
use aves_sync::{HttpProbe, HttpRemote, HubConfig, Reconciler, SyncConfig};
use clap::Parser;
use reqwest::Url;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Aves sighting server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "aves.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let hash = aves_api::auth::hash_password(&password)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("AVES").separator("__"))
    .build()
    .context("failed to read config file")?;
  let cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // ── Stores ────────────────────────────────────────────────────────────
  let reference_path = expand_tilde(&cfg.reference_db);
  let reference = SqliteReferenceStore::open(&reference_path)
    .await
    .with_context(|| format!("failed to open reference store at {reference_path:?}"))?;
  let sightings_path = expand_tilde(&cfg.sightings_db);
  let sightings = SqliteSightingStore::open(&sightings_path)
    .await
    .with_context(|| format!("failed to open sighting store at {sightings_path:?}"))?;

  // ── Reference catalogue ───────────────────────────────────────────────
  let mut dataset = FileDataset::new(expand_tilde(&cfg.dataset.path));
  if let Some(revision) = &cfg.dataset.revision {
    dataset = dataset.with_revision(revision.clone());
  }
  let mut ingest_config = IngestConfig::default();
  if let Some(batch_size) = cfg.dataset.batch_size {
    ingest_config.batch_size = batch_size;
  }
  let source: Box<dyn DatasetSource> = Box::new(dataset);
  let ingestor = Ingestor::new(reference.clone(), source, ingest_config);

  let mut catalogue_config = CatalogueConfig::default();
  if let Some(ms) = cfg.names.timeout_ms {
    catalogue_config.resolve_timeout = Duration::from_millis(ms);
  }
  let names = match &cfg.names.url {
    Some(url) => {
      let base = Url::parse(url).with_context(|| format!("invalid names.url {url:?}"))?;
      NameSource::Http(
        HttpNameResolver::new(base, catalogue_config.resolve_timeout)
          .context("failed to build name resolver")?,
      )
    }
    None => NameSource::Stored(StoredNames::new(reference.clone())),
  };
  let catalogue = Catalogue::new(reference, sightings.clone(), names, catalogue_config);

  // ── Sync ──────────────────────────────────────────────────────────────
  let sync = match &cfg.remote {
    Some(remote) => Some(Arc::new(reconciler(remote, sightings.clone())?)),
    None => {
      tracing::info!("no remote configured; sync disabled");
      None
    }
  };

  // ── Hub ───────────────────────────────────────────────────────────────
  let hub = match &cfg.hub {
    Some(section) => {
      let path = expand_tilde(&section.store_path);
      let store = SqliteHub::open(&path)
        .await
        .with_context(|| format!("failed to open hub store at {path:?}"))?;
      Some(HubState {
        store,
        auth: Arc::new(AuthConfig {
          username:      section.username.clone(),
          password_hash: section.password_hash.clone(),
        }),
      })
    }
    None => None,
  };

  let state = AppState {
    ingestor,
    catalogue: Arc::new(catalogue),
    sightings,
    sync,
  };

  if cfg.ingest_on_start {
    let ingestor = state.ingestor.clone();
    tokio::spawn(async move {
      // The outcome is logged and kept in the ingestor's state.
      let _ = ingestor.ensure_ready().await;
    });
  }

  let app = aves_api::router(state, hub);
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

fn reconciler(
  remote: &RemoteConfig,
  sightings: SqliteSightingStore,
) -> anyhow::Result<Reconciler<SqliteSightingStore, HttpRemote, HttpProbe>> {
  let timeout = Duration::from_secs(remote.timeout_secs);
  let client = HttpRemote::new(HubConfig {
    base_url: remote.url.clone(),
    username: remote.username.clone(),
    password: remote.password.clone(),
    timeout,
  })
  .context("failed to build sync client")?;
  let health = format!("{}/hub/health", remote.url.trim_end_matches('/'));
  let probe = HttpProbe::new(&health, Duration::from_secs(2)).context("failed to build probe")?;
  Ok(Reconciler::new(
    sightings,
    client,
    probe,
    SyncConfig {
      request_timeout: timeout,
      ..SyncConfig::default()
    },
  ))
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
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
