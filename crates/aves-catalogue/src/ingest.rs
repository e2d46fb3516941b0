//! The ingestion pipeline: bundled dataset → reference store.
//!
//! ```text
//! ensure_ready()
//!   ├─ stamp matches revision and is complete ─► Ready (nothing parsed)
//!   └─ spawn run
//!        ├─ parsing pass   (blocking thread)  count valid records
//!        ├─ begin_revision                    wipe, or resume same revision
//!        ├─ insert pass    decoder ─mpsc─► writer, one transaction per batch
//!        ├─ build_indexes
//!        └─ mark_complete                     ─► Ready(report)
//! ```
//!
//! At most one run is in flight per [`Ingestor`]. Callers arriving while it
//! runs wait for the same outcome; progress is observed through
//! [`Ingestor::subscribe`].

use std::{sync::Arc, time::Instant};

use aves_core::{
  progress::{IngestPhase, IngestProgress, IngestReport, ReadyState},
  store::ReferenceStore,
  taxon::Taxon,
};
use aves_dataset::{DatasetSource, taxa};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
  config::IngestConfig,
  error::{Error, Result},
};

/// Name reported in the per-table progress breakdown.
pub const TAXA_TABLE: &str = "taxa";

/// Final result of a run as seen by attached callers.
type Outcome = Option<Result<IngestReport, String>>;

/// Owns the reference store's readiness and drives ingestion runs.
///
/// Cloning is cheap; clones share state and the in-flight run.
pub struct Ingestor<R, S> {
  inner: Arc<Inner<R, S>>,
}

impl<R, S> Clone for Ingestor<R, S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

struct Inner<R, S> {
  store:    R,
  source:   S,
  config:   IngestConfig,
  state:    Mutex<ReadyState>,
  progress: broadcast::Sender<IngestProgress>,
  outcome:  watch::Sender<Outcome>,
}

impl<R, S> Ingestor<R, S>
where
  R: ReferenceStore + 'static,
  S: DatasetSource,
{
  pub fn new(store: R, source: S, config: IngestConfig) -> Self {
    let (progress, _) = broadcast::channel(config.progress_buffer.max(1));
    let (outcome, _) = watch::channel(None);
    Self {
      inner: Arc::new(Inner {
        store,
        source,
        config,
        state: Mutex::new(ReadyState::Uninitialized),
        progress,
        outcome,
      }),
    }
  }

  /// Receive progress events of every run started after this call.
  ///
  /// Subscribe before calling [`Ingestor::ensure_ready`] to see a run from
  /// its first event. Dropping the receiver never affects the run.
  pub fn subscribe(&self) -> broadcast::Receiver<IngestProgress> {
    self.inner.progress.subscribe()
  }

  pub async fn status(&self) -> ReadyState { self.inner.state.lock().await.clone() }

  pub fn store(&self) -> &R { &self.inner.store }

  /// Make sure the reference store holds the complete current dataset.
  ///
  /// Starts a run if none is in flight, otherwise attaches to the running
  /// one. After a failure, calling again retries; committed batches are
  /// kept and skipped.
  pub async fn ensure_ready(&self) -> Result<IngestReport> {
    let mut outcome = {
      let mut state = self.inner.state.lock().await;
      match &*state {
        ReadyState::Ready { report } => return Ok(report.clone()),
        ReadyState::Ingesting => self.inner.outcome.subscribe(),
        ReadyState::Uninitialized | ReadyState::Failed { .. } => {
          *state = ReadyState::Ingesting;
          self.inner.outcome.send_replace(None);
          let rx = self.inner.outcome.subscribe();
          self.spawn_run();
          rx
        }
      }
    };

    let finished = outcome
      .wait_for(Option::is_some)
      .await
      .map_err(|_| Error::Task("ingestion task went away".to_string()))?
      .clone();
    match finished {
      Some(Ok(report)) => Ok(report),
      Some(Err(reason)) => Err(Error::IngestFailed(reason)),
      None => Err(Error::Task("ingestion finished without an outcome".to_string())),
    }
  }

  /// Run on a task of its own so the state is settled even if every caller
  /// is dropped, and a panic becomes a `Failed` state.
  fn spawn_run(&self) {
    let inner = Arc::clone(&self.inner);
    tokio::spawn(async move {
      let run = tokio::spawn({
        let inner = Arc::clone(&inner);
        async move { inner.run().await }
      });
      let result = match run.await {
        Ok(result) => result,
        Err(e) => Err(Error::Task(e.to_string())),
      };
      inner.finish(result).await;
    });
  }
}

impl<R, S> Inner<R, S>
where
  R: ReferenceStore + 'static,
  S: DatasetSource,
{
  fn emit(&self, progress: IngestProgress) {
    // No subscribers is fine.
    let _ = self.progress.send(progress);
  }

  async fn finish(&self, result: Result<IngestReport>) {
    let mut state = self.state.lock().await;
    let outcome = match result {
      Ok(report) => {
        *state = ReadyState::Ready {
          report: report.clone(),
        };
        Ok(report)
      }
      Err(e) => {
        error!(error = %e, "reference ingestion failed");
        *state = ReadyState::Failed {
          reason: e.to_string(),
        };
        Err(e.to_string())
      }
    };
    self.outcome.send_replace(Some(outcome));
  }

  async fn blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Self) -> Result<T> + Send + 'static,
  {
    let inner = Arc::clone(self);
    tokio::task::spawn_blocking(move || f(&inner))
      .await
      .map_err(|e| Error::Task(e.to_string()))?
  }

  async fn run(self: Arc<Self>) -> Result<IngestReport> {
    let started = Instant::now();
    let revision = self.blocking(|inner| Ok(inner.source.revision()?)).await?;

    if let Some(stamp) = self.store.dataset_stamp().await.map_err(Error::read)? {
      if stamp.complete && stamp.revision == revision {
        info!(%revision, rows = stamp.loaded, "reference data already loaded");
        self.emit(
          IngestProgress::new(IngestPhase::Complete, stamp.loaded, stamp.total)
            .with_table(TAXA_TABLE, stamp.loaded, stamp.total),
        );
        return Ok(IngestReport {
          revision,
          loaded: stamp.loaded,
          total: stamp.total,
          skipped: 0,
          resumed_from: stamp.loaded,
          elapsed_ms: started.elapsed().as_millis() as u64,
          reused: true,
        });
      }
    }

    info!(source = %self.source.describe(), %revision, "reference ingestion started");

    // ── Parsing pass ────────────────────────────────────────────────────
    self.emit(
      IngestProgress::new(IngestPhase::Parsing, 0, 0).with_message("reading dataset"),
    );
    let (total, skipped) = {
      let revision = revision.clone();
      self.blocking(move |inner| inner.count_records(&revision)).await?
    };
    self.emit(
      IngestProgress::new(IngestPhase::Parsing, 0, total)
        .with_message(format!("{total} records, {skipped} skipped")),
    );

    // ── Insert pass ─────────────────────────────────────────────────────
    let stamp = self
      .store
      .begin_revision(revision.clone(), total)
      .await
      .map_err(Error::write)?;
    let resumed_from = stamp.loaded;
    if resumed_from > 0 {
      info!(%revision, resumed_from, "resuming interrupted ingestion");
    }
    self.emit(
      IngestProgress::new(IngestPhase::Inserting, resumed_from, total)
        .with_table(TAXA_TABLE, resumed_from, total),
    );

    let (tx, mut rx) = mpsc::channel::<Vec<Taxon>>(self.config.channel_capacity.max(1));
    let decoder = {
      let inner = Arc::clone(&self);
      let revision = revision.clone();
      tokio::task::spawn_blocking(move || inner.decode_batches(&revision, resumed_from, tx))
    };

    let mut loaded = resumed_from;
    while let Some(batch) = rx.recv().await {
      let rows = batch.len();
      match self.store.insert_batch(revision.clone(), batch).await {
        Ok(count) => loaded = count,
        Err(e) => {
          // Closing the channel stops the decoder at its next send.
          drop(rx);
          let _ = decoder.await;
          return Err(Error::write(e));
        }
      }
      debug!(rows, loaded, total, "batch committed");
      self.emit(
        IngestProgress::new(IngestPhase::Inserting, loaded, total)
          .with_table(TAXA_TABLE, loaded, total),
      );
      tokio::task::yield_now().await;
    }
    decoder.await.map_err(|e| Error::Task(e.to_string()))??;

    if loaded != total {
      return Err(Error::DatasetChanged {
        expected: total,
        loaded,
      });
    }

    // ── Indexing ────────────────────────────────────────────────────────
    self.emit(
      IngestProgress::new(IngestPhase::Indexing, loaded, total)
        .with_table(TAXA_TABLE, loaded, total)
        .with_message("building indexes"),
    );
    self.store.build_indexes().await.map_err(Error::write)?;
    self.emit(
      IngestProgress::new(IngestPhase::Indexing, loaded, total)
        .with_table(TAXA_TABLE, loaded, total)
        .with_message("indexes built"),
    );

    self
      .store
      .mark_complete(revision.clone())
      .await
      .map_err(Error::write)?;
    self.emit(
      IngestProgress::new(IngestPhase::Complete, total, total)
        .with_table(TAXA_TABLE, total, total),
    );

    let report = IngestReport {
      revision,
      loaded,
      total,
      skipped,
      resumed_from,
      elapsed_ms: started.elapsed().as_millis() as u64,
      reused: false,
    };
    info!(
      revision = %report.revision,
      rows = report.loaded,
      skipped = report.skipped,
      elapsed_ms = report.elapsed_ms,
      "reference ingestion complete"
    );
    Ok(report)
  }

  /// First pass: count valid records and log the ones that will be skipped.
  fn count_records(&self, revision: &str) -> Result<(u64, u64)> {
    let milestone = self.config.parse_milestone.max(1);
    let mut valid = 0u64;
    let mut skipped = 0u64;

    for item in taxa(self.source.open()?, revision)? {
      match item {
        Ok(_) => {
          valid += 1;
          if valid % milestone == 0 {
            self.emit(
              IngestProgress::new(IngestPhase::Parsing, 0, 0)
                .with_message(format!("parsed {valid} records")),
            );
          }
        }
        Err(e) if e.is_row_error() => {
          skipped += 1;
          warn!(error = %e, "skipping dataset row");
        }
        Err(e) => return Err(e.into()),
      }
    }
    Ok((valid, skipped))
  }

  /// Second pass: decode again, skip the first `skip` valid records (already
  /// committed), and hand the rest to the writer in batches.
  fn decode_batches(&self, revision: &str, skip: u64, tx: mpsc::Sender<Vec<Taxon>>) -> Result<()> {
    let batch_size = self.config.batch_size.max(1);
    let mut seen = 0u64;
    let mut batch = Vec::with_capacity(batch_size);

    for item in taxa(self.source.open()?, revision)? {
      let taxon = match item {
        Ok(t) => t,
        Err(e) if e.is_row_error() => continue,
        Err(e) => return Err(e.into()),
      };
      seen += 1;
      if seen <= skip {
        continue;
      }
      batch.push(taxon);
      if batch.len() == batch_size {
        let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
        if tx.blocking_send(full).is_err() {
          // The writer stopped; it reports why.
          return Ok(());
        }
      }
    }
    if !batch.is_empty() {
      let _ = tx.blocking_send(batch);
    }
    Ok(())
  }
}
