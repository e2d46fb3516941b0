//! The sync reconciler.
//!
//! ```text
//! Idle ─► CheckingConnectivity ─┬─ offline ─► Idle (Offline)
//!                               └─ online  ─► Pushing ─► Pulling ─► Idle
//! ```
//!
//! Pushing sends pending deletions first, then every `unsynced` sighting one
//! at a time. Pulling pages through the remote feed from the stored cursor.
//! Remote failures are recorded per record and never stop the run; a local
//! store failure does.

use std::{future::Future, time::Instant};

use aves_core::{
  remote::{RemoteError, RemoteSighting, UpsertOutcome},
  sighting::{MergeOutcome, SyncState},
  store::{Connectivity, RemoteSightingStore, SightingStore},
};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::{
  config::SyncConfig,
  error::{Error, Result},
  report::{PushFailure, SyncOutcome, SyncPhase, SyncReport},
};

pub struct Reconciler<L, R, C> {
  local:        L,
  remote:       R,
  connectivity: C,
  config:       SyncConfig,
  running:      Mutex<()>,
  phase:        watch::Sender<SyncPhase>,
}

impl<L, R, C> Reconciler<L, R, C>
where
  L: SightingStore,
  R: RemoteSightingStore,
  C: Connectivity,
{
  pub fn new(local: L, remote: R, connectivity: C, config: SyncConfig) -> Self {
    let (phase, _) = watch::channel(SyncPhase::Idle);
    Self {
      local,
      remote,
      connectivity,
      config,
      running: Mutex::new(()),
      phase,
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<SyncPhase> { self.phase.subscribe() }

  pub fn phase(&self) -> SyncPhase { *self.phase.borrow() }

  pub fn local(&self) -> &L { &self.local }

  /// Run one reconciliation.
  ///
  /// A call made while another run is in flight returns at once with
  /// [`SyncOutcome::Coalesced`].
  pub async fn reconcile(&self) -> SyncReport {
    let Ok(_guard) = self.running.try_lock() else {
      debug!("sync already running; trigger coalesced");
      let mut report = SyncReport::new(SyncOutcome::Coalesced);
      self.fill_summary(&mut report).await;
      return report;
    };

    let started = Instant::now();
    let mut report = SyncReport::new(SyncOutcome::Completed);

    self.phase.send_replace(SyncPhase::CheckingConnectivity);
    report.outcome = if !self.connectivity.is_online().await {
      info!("offline; sync skipped");
      SyncOutcome::Offline
    } else {
      match self.exchange(&mut report).await {
        Ok(()) if report.had_failures() => SyncOutcome::Partial,
        Ok(()) => SyncOutcome::Completed,
        Err(e) => {
          error!(error = %e, "sync run failed");
          SyncOutcome::Failed {
            reason: e.to_string(),
          }
        }
      }
    };

    self.fill_summary(&mut report).await;
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    self.phase.send_replace(SyncPhase::Idle);

    info!(
      outcome = ?report.outcome,
      pushed = report.pushed,
      failed = report.push_failures.len(),
      deleted = report.deleted,
      pulled = report.pulled,
      updated = report.updated,
      elapsed_ms = report.elapsed_ms,
      "{}",
      report.summary()
    );
    report
  }

  async fn fill_summary(&self, report: &mut SyncReport) {
    match self.local.sync_summary().await {
      Ok(summary) => {
        report.unsynced_remaining = summary.outstanding();
        report.total = summary.total();
      }
      Err(e) => warn!(error = %e, "could not read sync summary"),
    }
  }

  async fn exchange(&self, report: &mut SyncReport) -> Result<()> {
    self.phase.send_replace(SyncPhase::Pushing);
    self.push_deletions(report).await?;
    self.push_records(report).await?;
    self.phase.send_replace(SyncPhase::Pulling);
    self.pull(report).await
  }

  /// Bound a remote call by the configured timeout.
  async fn remote_call<T>(
    &self,
    call: impl Future<Output = Result<T, RemoteError>>,
  ) -> Result<T, RemoteError> {
    tokio::time::timeout(self.config.request_timeout, call)
      .await
      .unwrap_or(Err(RemoteError::Timeout(self.config.request_timeout)))
  }

  async fn push_deletions(&self, report: &mut SyncReport) -> Result<()> {
    let pending = self.local.pending_deletions().await.map_err(Error::local)?;
    for id in pending {
      match self.remote_call(self.remote.delete(id)).await {
        Ok(()) => {
          self
            .local
            .clear_pending_deletion(id)
            .await
            .map_err(Error::local)?;
          report.deleted += 1;
          debug!(sighting_id = %id, "deletion pushed");
        }
        Err(e) => {
          warn!(sighting_id = %id, error = %e, "deletion push failed");
          report.push_failures.push(PushFailure {
            sighting_id: id,
            reason:      e.to_string(),
            permanent:   false,
          });
        }
      }
      tokio::task::yield_now().await;
    }
    Ok(())
  }

  async fn push_records(&self, report: &mut SyncReport) -> Result<()> {
    let pending = self
      .local
      .list_by_state(SyncState::Unsynced)
      .await
      .map_err(Error::local)?;

    for sighting in pending {
      let id = sighting.sighting_id;
      match self.remote_call(self.remote.upsert(RemoteSighting::from(&sighting))).await {
        Ok(outcome) => {
          if outcome == UpsertOutcome::Stale {
            debug!(sighting_id = %id, "remote holds a newer copy");
          }
          let marked = self
            .local
            .mark_synced(id, sighting.updated_at)
            .await
            .map_err(Error::local)?;
          if marked {
            report.pushed += 1;
          } else {
            debug!(sighting_id = %id, "edited while pushing; stays unsynced");
          }
        }
        Err(e) => {
          let permanent = e.is_permanent();
          let state = if permanent {
            SyncState::SyncFailed
          } else {
            SyncState::Unsynced
          };
          warn!(sighting_id = %id, error = %e, permanent, "push failed");
          let marked = self
            .local
            .mark_push_failed(id, sighting.updated_at, state, e.to_string())
            .await
            .map_err(Error::local)?;
          if !marked {
            debug!(sighting_id = %id, "edited while pushing; stays unsynced");
          }
          report.push_failures.push(PushFailure {
            sighting_id: id,
            reason: e.to_string(),
            permanent,
          });
        }
      }
      tokio::task::yield_now().await;
    }
    Ok(())
  }

  async fn pull(&self, report: &mut SyncReport) -> Result<()> {
    let mut cursor = self.local.sync_cursor().await.map_err(Error::local)?;
    loop {
      let page = match self
        .remote_call(self.remote.list_since(cursor.clone(), self.config.page_size))
        .await
      {
        Ok(page) => page,
        Err(e) => {
          warn!(error = %e, "pull failed");
          report.pull_error = Some(e.to_string());
          return Ok(());
        }
      };

      for record in page.records {
        let id = record.sighting_id;
        match self.local.apply_remote(record).await.map_err(Error::local)? {
          MergeOutcome::Inserted => report.pulled += 1,
          MergeOutcome::Updated => report.updated += 1,
          MergeOutcome::Kept => debug!(sighting_id = %id, "local copy kept"),
        }
      }

      let advanced = page.next_cursor.is_some() && page.next_cursor != cursor;
      if advanced && let Some(next) = page.next_cursor {
        self
          .local
          .set_sync_cursor(next.clone())
          .await
          .map_err(Error::local)?;
        cursor = Some(next);
      }
      if !page.has_more {
        return Ok(());
      }
      if !advanced {
        warn!("remote feed reports more records without advancing; stopping pull");
        report.pull_error = Some("remote feed did not advance".to_string());
        return Ok(());
      }
      tokio::task::yield_now().await;
    }
  }
}
