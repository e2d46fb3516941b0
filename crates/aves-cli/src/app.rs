//! The device-side services the CLI drives, opened from [`Settings`].

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use aves_catalogue::{
  Catalogue, CatalogueConfig, HttpNameResolver, IngestConfig, Ingestor, NameSource, StoredNames,
};
use aves_core::{
  progress::{IngestPhase, IngestProgress, IngestReport},
  store::{DatasetStamp, ReferenceStore, SightingStore},
};
use aves_dataset::FileDataset;
use aves_store_sqlite::{SqliteReferenceStore, SqliteSightingStore};
use aves_sync::{HttpProbe, HttpRemote, HubConfig, Reconciler, SyncConfig, SyncReport};
use reqwest::Url;
use tokio::sync::broadcast::error::RecvError;

// ─── Settings ─────────────────────────────────────────────────────────────────

/// Everything the CLI needs, after merging flags, environment and config
/// file.
#[derive(Debug, Clone)]
pub struct Settings {
  /// Holds `reference.db` and `sightings.db`.
  pub data_dir:         PathBuf,
  pub dataset:          Option<PathBuf>,
  pub dataset_revision: Option<String>,
  pub hub:              Option<HubConfig>,
  pub names_url:        Option<String>,
}

// ─── App ──────────────────────────────────────────────────────────────────────

pub type CliCatalogue =
  Catalogue<SqliteReferenceStore, SqliteSightingStore, NameSource<SqliteReferenceStore>>;

pub struct App {
  pub reference: SqliteReferenceStore,
  pub sightings: SqliteSightingStore,
  pub catalogue: CliCatalogue,
  ingestor:      Option<Ingestor<SqliteReferenceStore, FileDataset>>,
  hub:           Option<HubConfig>,
}

impl App {
  pub async fn open(settings: Settings) -> Result<Self> {
    std::fs::create_dir_all(&settings.data_dir)
      .with_context(|| format!("creating data directory {}", settings.data_dir.display()))?;

    let reference = SqliteReferenceStore::open(settings.data_dir.join("reference.db"))
      .await
      .context("opening reference store")?;
    let sightings = SqliteSightingStore::open(settings.data_dir.join("sightings.db"))
      .await
      .context("opening sighting store")?;

    let ingestor = settings.dataset.map(|path| {
      let mut dataset = FileDataset::new(path);
      if let Some(revision) = settings.dataset_revision {
        dataset = dataset.with_revision(revision);
      }
      Ingestor::new(reference.clone(), dataset, IngestConfig::default())
    });

    let config = CatalogueConfig::default();
    let names = match settings.names_url {
      Some(url) => {
        let base = Url::parse(&url).with_context(|| format!("invalid names URL {url:?}"))?;
        NameSource::Http(
          HttpNameResolver::new(base, config.resolve_timeout)
            .context("building name resolver")?,
        )
      }
      None => NameSource::Stored(StoredNames::new(reference.clone())),
    };
    let catalogue = Catalogue::new(reference.clone(), sightings.clone(), names, config);

    Ok(Self {
      reference,
      sightings,
      catalogue,
      ingestor,
      hub: settings.hub,
    })
  }

  /// Load the dataset if the local catalogue does not hold it yet, passing
  /// every progress event to `on_progress` as it arrives.
  pub async fn ingest(&self, mut on_progress: impl FnMut(&IngestProgress)) -> Result<IngestReport> {
    let ingestor = self
      .ingestor
      .as_ref()
      .ok_or_else(|| {
        anyhow!("no dataset configured; pass --dataset or set `dataset` in the config file")
      })?;

    let mut events = ingestor.subscribe();
    let run = ingestor.ensure_ready();
    tokio::pin!(run);
    loop {
      tokio::select! {
        result = &mut run => {
          while let Ok(event) = events.try_recv() {
            on_progress(&event);
          }
          return Ok(result?);
        }
        event = events.recv() => match event {
          Ok(event) => on_progress(&event),
          Err(RecvError::Lagged(_)) => {}
          Err(RecvError::Closed) => break,
        },
      }
    }
    Ok(run.await?)
  }

  /// Make sure catalogue reads see a complete dataset. Ingests first when a
  /// dataset is configured; otherwise the store must already hold one.
  pub async fn ensure_catalogue(&self, mut on_progress: impl FnMut(&IngestProgress)) -> Result<()> {
    if self.ingestor.is_some() {
      self
        .ingest(|p| {
          if p.phase != IngestPhase::Complete {
            on_progress(p)
          }
        })
        .await?;
      return Ok(());
    }
    match self.stamp().await? {
      Some(stamp) if stamp.complete => Ok(()),
      _ => bail!("the reference catalogue is empty; run `aves ingest --dataset <FILE>` first"),
    }
  }

  pub async fn stamp(&self) -> Result<Option<DatasetStamp>> {
    self
      .reference
      .dataset_stamp()
      .await
      .context("reading reference store")
  }

  pub fn hub(&self) -> Option<&HubConfig> { self.hub.as_ref() }

  /// Run one reconciliation against the configured hub.
  pub async fn sync(&self, retry_failed: bool) -> Result<SyncReport> {
    let hub = self
      .hub
      .clone()
      .ok_or_else(|| anyhow!("no hub configured; pass --hub-url or set [hub] in the config file"))?;

    if retry_failed {
      let requeued = self
        .sightings
        .retry_failed()
        .await
        .context("requeueing failed sightings")?;
      tracing::info!(requeued, "failed sightings requeued");
    }

    let health = format!("{}/hub/health", hub.base_url.trim_end_matches('/'));
    let probe = HttpProbe::new(&health, Duration::from_secs(2))?;
    let config = SyncConfig {
      request_timeout: hub.timeout,
      ..SyncConfig::default()
    };
    let remote = HttpRemote::new(hub)?;
    let reconciler = Reconciler::new(self.sightings.clone(), remote, probe, config);
    Ok(reconciler.reconcile().await)
  }
}
