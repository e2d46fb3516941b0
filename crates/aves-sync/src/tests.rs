//! Reconciliation tests: devices backed by in-memory sighting stores syncing
//! with an in-memory hub through a scriptable wrapper.

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use aves_core::{
  remote::{RemoteCursor, RemoteError, RemotePage, RemoteSighting, UpsertOutcome},
  sighting::{SightingBody, SyncState},
  store::{RemoteSightingStore, SightingStore},
};
use aves_store_sqlite::{SqliteHub, SqliteSightingStore};
use chrono::Utc;
use uuid::Uuid;

use crate::{ManualConnectivity, Reconciler, SyncConfig, SyncOutcome, SyncPhase};

// ─── Scripted remote ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct ScriptedRemote {
  hub:        SqliteHub,
  failing:    Arc<std::sync::Mutex<HashMap<Uuid, RemoteError>>>,
  fail_pull:  Arc<AtomicBool>,
  upserts:    Arc<AtomicUsize>,
  delay:      Option<Duration>,
  /// Applied to the device's store while the next upsert is in flight.
  edit:       Arc<std::sync::Mutex<Option<(SqliteSightingStore, SightingBody)>>>,
}

impl ScriptedRemote {
  async fn new() -> Self {
    Self {
      hub:       SqliteHub::open_in_memory().await.unwrap(),
      failing:   Arc::default(),
      fail_pull: Arc::default(),
      upserts:   Arc::default(),
      delay:     None,
      edit:      Arc::default(),
    }
  }

  fn fail(&self, id: Uuid, error: RemoteError) {
    self.failing.lock().unwrap().insert(id, error);
  }

  fn heal(&self) { self.failing.lock().unwrap().clear(); }

  fn edit_during_next_upsert(&self, store: SqliteSightingStore, body: SightingBody) {
    *self.edit.lock().unwrap() = Some((store, body));
  }
}

impl RemoteSightingStore for ScriptedRemote {
  async fn upsert(&self, record: RemoteSighting) -> Result<UpsertOutcome, RemoteError> {
    self.upserts.fetch_add(1, Ordering::SeqCst);
    if let Some(d) = self.delay {
      tokio::time::sleep(d).await;
    }
    let edit = self.edit.lock().unwrap().take();
    if let Some((store, body)) = edit {
      store.update(record.sighting_id, body).await.unwrap();
    }
    let scripted = self.failing.lock().unwrap().get(&record.sighting_id).cloned();
    if let Some(e) = scripted {
      return Err(e);
    }
    self.hub.upsert(record).await
  }

  async fn list_since(
    &self,
    cursor: Option<RemoteCursor>,
    limit: usize,
  ) -> Result<RemotePage, RemoteError> {
    if self.fail_pull.load(Ordering::SeqCst) {
      return Err(RemoteError::Unreachable("connection reset".into()));
    }
    self.hub.list_since(cursor, limit).await
  }

  async fn delete(&self, id: Uuid) -> Result<(), RemoteError> { self.hub.delete(id).await }
}

type Device = Reconciler<SqliteSightingStore, ScriptedRemote, ManualConnectivity>;

async fn device(remote: &ScriptedRemote, online: &ManualConnectivity) -> Device {
  Reconciler::new(
    SqliteSightingStore::open_in_memory().await.unwrap(),
    remote.clone(),
    online.clone(),
    SyncConfig {
      page_size: 2,
      ..SyncConfig::default()
    },
  )
}

async fn log(device: &Device, species: &str) -> Uuid {
  device
    .local()
    .insert(SightingBody::manual(species, Utc::now()))
    .await
    .unwrap()
    .sighting_id
}

async fn state_of(device: &Device, id: Uuid) -> SyncState {
  device.local().get(id).await.unwrap().unwrap().sync_state
}

// ─── Push ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_record_does_not_block_the_others() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(true);
  let dev = device(&remote, &online).await;

  let first = log(&dev, "Corvus corax").await;
  let second = log(&dev, "Corvus corone").await;
  let third = log(&dev, "Pica pica").await;
  remote.fail(second, RemoteError::Unreachable("connection reset".into()));

  let report = dev.reconcile().await;
  assert_eq!(report.outcome, SyncOutcome::Partial);
  assert_eq!(report.pushed, 2);
  assert_eq!(report.push_failures.len(), 1);
  assert_eq!(report.push_failures[0].sighting_id, second);
  assert!(!report.push_failures[0].permanent);
  assert_eq!(report.summary(), "1 of 3 sightings not yet synced");

  assert_eq!(state_of(&dev, first).await, SyncState::Synced);
  assert_eq!(state_of(&dev, third).await, SyncState::Synced);
  let failed = dev.local().get(second).await.unwrap().unwrap();
  assert_eq!(failed.sync_state, SyncState::Unsynced);
  assert!(failed.sync_error.unwrap().contains("connection reset"));

  // Next run once the remote recovers picks it up.
  remote.heal();
  let report = dev.reconcile().await;
  assert_eq!(report.outcome, SyncOutcome::Completed);
  assert_eq!(report.pushed, 1);
  assert_eq!(report.unsynced_remaining, 0);
  assert_eq!(dev.local().get(second).await.unwrap().unwrap().sync_error, None);
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(true);
  let dev = device(&remote, &online).await;
  for species in ["Corvus corax", "Corvus corone", "Pica pica"] {
    log(&dev, species).await;
  }

  let first = dev.reconcile().await;
  assert_eq!((first.outcome, first.pushed), (SyncOutcome::Completed, 3));
  let before = dev.local().get_all(None, Default::default()).await.unwrap();

  let second = dev.reconcile().await;
  assert_eq!(second.outcome, SyncOutcome::Completed);
  assert_eq!((second.pushed, second.pulled, second.updated), (0, 0, 0));
  assert_eq!(remote.hub.record_count().await.unwrap(), 3);
  assert_eq!(remote.upserts.load(Ordering::SeqCst), 3);
  assert_eq!(dev.local().get_all(None, Default::default()).await.unwrap(), before);
}

#[tokio::test]
async fn offline_run_attempts_nothing() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(false);
  let dev = device(&remote, &online).await;
  let id = log(&dev, "Corvus corax").await;

  let report = dev.reconcile().await;
  assert_eq!(report.outcome, SyncOutcome::Offline);
  assert_eq!(report.summary(), "1 of 1 sightings not yet synced");
  assert_eq!(remote.upserts.load(Ordering::SeqCst), 0);
  assert_eq!(state_of(&dev, id).await, SyncState::Unsynced);

  online.set_online(true);
  assert_eq!(dev.reconcile().await.outcome, SyncOutcome::Completed);
  assert_eq!(state_of(&dev, id).await, SyncState::Synced);
}

#[tokio::test]
async fn rejected_record_waits_for_retry() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(true);
  let dev = device(&remote, &online).await;
  let id = log(&dev, "Corvus corax").await;
  remote.fail(id, RemoteError::Rejected("422 Unprocessable Entity".into()));

  let report = dev.reconcile().await;
  assert!(report.push_failures[0].permanent);
  assert_eq!(state_of(&dev, id).await, SyncState::SyncFailed);

  // Not attempted again until the user retries.
  remote.heal();
  dev.reconcile().await;
  assert_eq!(remote.upserts.load(Ordering::SeqCst), 1);
  assert_eq!(state_of(&dev, id).await, SyncState::SyncFailed);

  assert_eq!(dev.local().retry_failed().await.unwrap(), 1);
  let report = dev.reconcile().await;
  assert_eq!(report.pushed, 1);
  assert_eq!(state_of(&dev, id).await, SyncState::Synced);
}

#[tokio::test]
async fn edit_during_rejected_push_stays_unsynced() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(true);
  let dev = device(&remote, &online).await;
  let id = log(&dev, "Corvus corax").await;
  remote.fail(id, RemoteError::Rejected("422 Unprocessable Entity".into()));
  remote.edit_during_next_upsert(
    dev.local().clone(),
    SightingBody::manual("Corvus corone", Utc::now()),
  );

  let report = dev.reconcile().await;
  assert_eq!(report.outcome, SyncOutcome::Partial);
  assert!(report.push_failures[0].permanent);

  let current = dev.local().get(id).await.unwrap().unwrap();
  assert_eq!(current.body.species_guess, "Corvus corone");
  assert_eq!(current.sync_state, SyncState::Unsynced);
  assert!(current.sync_error.is_none());

  // The edit goes out on the next run once the hub accepts it.
  remote.heal();
  let report = dev.reconcile().await;
  assert_eq!(report.pushed, 1);
  assert_eq!(state_of(&dev, id).await, SyncState::Synced);
}

#[tokio::test]
async fn slow_remote_times_out_per_record() {
  let mut remote = ScriptedRemote::new().await;
  remote.delay = Some(Duration::from_secs(5));
  let online = ManualConnectivity::new(true);
  let dev = Reconciler::new(
    SqliteSightingStore::open_in_memory().await.unwrap(),
    remote.clone(),
    online,
    SyncConfig {
      request_timeout: Duration::from_millis(50),
      ..SyncConfig::default()
    },
  );
  let id = dev
    .local()
    .insert(SightingBody::manual("Corvus corax", Utc::now()))
    .await
    .unwrap()
    .sighting_id;

  let report = dev.reconcile().await;
  assert_eq!(report.outcome, SyncOutcome::Partial);
  assert!(report.push_failures[0].reason.contains("timed out"));
  assert_eq!(
    dev.local().get(id).await.unwrap().unwrap().sync_state,
    SyncState::Unsynced
  );
}

#[tokio::test]
async fn concurrent_trigger_is_coalesced() {
  let mut remote = ScriptedRemote::new().await;
  remote.delay = Some(Duration::from_millis(100));
  let online = ManualConnectivity::new(true);
  let dev = device(&remote, &online).await;
  log(&dev, "Corvus corax").await;

  let (a, b) = tokio::join!(dev.reconcile(), dev.reconcile());
  assert_eq!(a.outcome, SyncOutcome::Completed);
  assert_eq!(b.outcome, SyncOutcome::Coalesced);
  assert_eq!(remote.upserts.load(Ordering::SeqCst), 1);
  assert_eq!(dev.phase(), SyncPhase::Idle);
}

// ─── Pull ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pull_brings_other_devices_records_in_synced() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(true);
  let phone = device(&remote, &online).await;
  let tablet = device(&remote, &online).await;

  for species in ["Corvus corax", "Corvus corone", "Pica pica"] {
    log(&phone, species).await;
  }
  phone.reconcile().await;

  // Page size 2: the pull takes two pages.
  let report = tablet.reconcile().await;
  assert_eq!((report.outcome, report.pulled), (SyncOutcome::Completed, 3));
  let pulled = tablet.local().get_all(None, Default::default()).await.unwrap();
  assert_eq!(pulled.len(), 3);
  assert!(pulled.iter().all(|s| s.sync_state == SyncState::Synced));
  assert!(tablet.local().sync_cursor().await.unwrap().is_some());

  let again = tablet.reconcile().await;
  assert_eq!((again.pulled, again.updated), (0, 0));
}

#[tokio::test]
async fn pull_failure_keeps_pushed_records_synced() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(true);
  let dev = device(&remote, &online).await;
  let id = log(&dev, "Corvus corax").await;
  remote.fail_pull.store(true, Ordering::SeqCst);

  let report = dev.reconcile().await;
  assert_eq!(report.outcome, SyncOutcome::Partial);
  assert!(report.pull_error.is_some());
  assert_eq!(report.pushed, 1);
  assert_eq!(state_of(&dev, id).await, SyncState::Synced);
}

#[tokio::test]
async fn newer_remote_edit_wins() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(true);
  let phone = device(&remote, &online).await;
  let tablet = device(&remote, &online).await;

  let id = log(&phone, "Corvus corax").await;
  phone.reconcile().await;
  tablet.reconcile().await;

  let mut older = SightingBody::manual("Corvus corone", Utc::now());
  older.note = "phone edit".into();
  phone.local().update(id, older).await.unwrap().unwrap();
  tokio::time::sleep(Duration::from_millis(5)).await;
  let mut newer = SightingBody::manual("Corvus frugilegus", Utc::now());
  newer.note = "tablet edit".into();
  tablet.local().update(id, newer).await.unwrap().unwrap();

  tablet.reconcile().await;
  let report = phone.reconcile().await;
  assert_eq!(report.outcome, SyncOutcome::Completed);
  assert_eq!(report.updated, 1);

  let on_phone = phone.local().get(id).await.unwrap().unwrap();
  assert_eq!(on_phone.body.note, "tablet edit");
  assert_eq!(on_phone.sync_state, SyncState::Synced);
  assert_eq!(remote.hub.get(id).await.unwrap().unwrap().body.note, "tablet edit");
}

// ─── Deletions ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn deletion_reaches_the_hub_and_is_not_resurrected() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(true);
  let dev = device(&remote, &online).await;
  let id = log(&dev, "Corvus corax").await;
  dev.reconcile().await;
  assert_eq!(remote.hub.record_count().await.unwrap(), 1);

  assert!(dev.local().delete(id).await.unwrap());
  let report = dev.reconcile().await;
  assert_eq!(report.deleted, 1);
  assert_eq!(remote.hub.record_count().await.unwrap(), 0);
  assert!(dev.local().pending_deletions().await.unwrap().is_empty());
  assert!(dev.local().get(id).await.unwrap().is_none());
}

#[tokio::test]
async fn deletion_while_offline_is_pushed_later() {
  let remote = ScriptedRemote::new().await;
  let online = ManualConnectivity::new(true);
  let dev = device(&remote, &online).await;
  let id = log(&dev, "Corvus corax").await;
  dev.reconcile().await;

  online.set_online(false);
  dev.local().delete(id).await.unwrap();
  dev.reconcile().await;
  assert_eq!(dev.local().pending_deletions().await.unwrap(), vec![id]);

  online.set_online(true);
  let report = dev.reconcile().await;
  assert_eq!((report.deleted, report.pulled), (1, 0));
  assert!(dev.local().get(id).await.unwrap().is_none());
}
