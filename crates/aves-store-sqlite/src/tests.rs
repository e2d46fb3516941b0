//! Integration tests for the SQLite stores against in-memory databases.

use aves_core::{
  query::{CategoryFilter, TaxonQuery},
  remote::{RemoteCursor, RemoteSighting, UpsertOutcome},
  sighting::{
    Coordinates, MergeOutcome, Prediction, SightingBody, SightingKind, SightingOrder,
    SyncState,
  },
  store::{ReferenceStore, RemoteSightingStore, SightingStore},
  taxon::{Language, LocalizedNames, Taxon},
};
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::{Error, SqliteHub, SqliteReferenceStore, SqliteSightingStore};

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn taxon(code: &str, scientific: &str, english: &str, family: &str, category: &str) -> Taxon {
  Taxon {
    species_code:    code.into(),
    scientific_name: scientific.into(),
    english_name:    english.into(),
    localized:       LocalizedNames::default(),
    order:           Some("Passeriformes".into()),
    family:          Some(family.into()),
    category:        category.into(),
    range:           None,
    extinct:         false,
    extinct_year:    None,
    source_revision: "rev-1".into(),
  }
}

fn corvids() -> Vec<Taxon> {
  let mut raven = taxon("comrav", "Corvus corax", "Common Raven", "Corvidae", "species");
  raven.localized.de = Some("Kolkrabe".into());
  vec![
    raven,
    taxon("carcro1", "Corvus corone", "Carrion Crow", "Corvidae", "species"),
  ]
}

async fn reference_with(taxa: Vec<Taxon>) -> SqliteReferenceStore {
  let s = SqliteReferenceStore::open_in_memory()
    .await
    .expect("in-memory store");
  let total = taxa.len() as u64;
  s.begin_revision("rev-1".into(), total).await.unwrap();
  s.insert_batch("rev-1".into(), taxa).await.unwrap();
  s.build_indexes().await.unwrap();
  s.mark_complete("rev-1".into()).await.unwrap();
  s
}

fn query(search: &str, sort: &str, asc: bool, size: i64, page: i64, cat: &str) -> TaxonQuery {
  TaxonQuery::new(search, sort, asc, size, page, cat).unwrap()
}

async fn sightings() -> SqliteSightingStore {
  SqliteSightingStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(minute: u32) -> chrono::DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 5, 1, 6, minute, 0).unwrap()
}

// ─── Reference: loading ──────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_store_has_no_stamp() {
  let s = SqliteReferenceStore::open_in_memory().await.unwrap();
  assert!(s.dataset_stamp().await.unwrap().is_none());
}

#[tokio::test]
async fn batches_accumulate_loaded_count() {
  let s = SqliteReferenceStore::open_in_memory().await.unwrap();
  let stamp = s.begin_revision("rev-1".into(), 3).await.unwrap();
  assert_eq!(stamp.loaded, 0);
  assert!(!stamp.complete);

  let mut taxa = corvids();
  taxa.push(taxon("eurmag1", "Pica pica", "Eurasian Magpie", "Corvidae", "species"));
  let last = taxa.pop().unwrap();
  assert_eq!(s.insert_batch("rev-1".into(), taxa).await.unwrap(), 2);
  assert_eq!(s.insert_batch("rev-1".into(), vec![last]).await.unwrap(), 3);

  let stamp = s.dataset_stamp().await.unwrap().unwrap();
  assert_eq!((stamp.loaded, stamp.total, stamp.complete), (3, 3, false));
}

#[tokio::test]
async fn same_revision_resumes_committed_rows() {
  let s = SqliteReferenceStore::open_in_memory().await.unwrap();
  s.begin_revision("rev-1".into(), 2).await.unwrap();
  s.insert_batch("rev-1".into(), corvids()[..1].to_vec()).await.unwrap();

  let resumed = s.begin_revision("rev-1".into(), 2).await.unwrap();
  assert_eq!(resumed.loaded, 1);
  assert!(s.get_by_code("comrav".into()).await.unwrap().is_some());
}

#[tokio::test]
async fn new_revision_replaces_the_table() {
  let s = reference_with(corvids()).await;
  let stamp = s.begin_revision("rev-2".into(), 1).await.unwrap();
  assert_eq!(stamp.loaded, 0);
  assert!(s.get_by_code("comrav".into()).await.unwrap().is_none());
  assert_eq!(
    s.row_count(String::new(), CategoryFilter::All, Language::En)
      .await
      .unwrap(),
    0
  );
}

#[tokio::test]
async fn batch_for_another_revision_is_rejected() {
  let s = SqliteReferenceStore::open_in_memory().await.unwrap();
  s.begin_revision("rev-1".into(), 2).await.unwrap();
  let err = s.insert_batch("rev-9".into(), corvids()).await.unwrap_err();
  assert!(matches!(err, Error::RevisionMismatch { .. }));

  let err = s.mark_complete("rev-9".into()).await.unwrap_err();
  assert!(matches!(err, Error::RevisionMismatch { found: Some(ref f), .. } if f == "rev-1"));
}

#[tokio::test]
async fn mark_complete_sets_flag() {
  let s = reference_with(corvids()).await;
  let stamp = s.dataset_stamp().await.unwrap().unwrap();
  assert!(stamp.complete);
  assert_eq!(stamp.loaded, stamp.total);
}

// ─── Reference: queries ──────────────────────────────────────────────────────

#[tokio::test]
async fn search_matches_common_name_only_where_it_should() {
  let s = reference_with(corvids()).await;
  let page = s
    .query_page(&query("raven", "name", true, 10, 1, "all"))
    .await
    .unwrap();
  assert_eq!(page.len(), 1);
  assert_eq!(page[0].english_name, "Common Raven");
}

#[tokio::test]
async fn search_matches_scientific_name_case_insensitively() {
  let s = reference_with(corvids()).await;
  let n = s
    .row_count("CORVUS".into(), CategoryFilter::All, Language::En)
    .await
    .unwrap();
  assert_eq!(n, 2);
}

#[tokio::test]
async fn empty_search_matches_everything() {
  let s = reference_with(corvids()).await;
  let page = s.query_page(&query("", "name", true, 10, 1, "all")).await.unwrap();
  assert_eq!(page.len(), 2);
}

#[tokio::test]
async fn page_past_the_end_is_empty() {
  let s = reference_with(corvids()).await;
  let page = s.query_page(&query("", "name", true, 10, 5, "all")).await.unwrap();
  assert!(page.is_empty());
}

#[tokio::test]
async fn pages_split_results_in_order() {
  let s = reference_with(corvids()).await;
  let first = s.query_page(&query("", "name", true, 1, 1, "all")).await.unwrap();
  let second = s.query_page(&query("", "name", true, 1, 2, "all")).await.unwrap();
  assert_eq!(first[0].english_name, "Carrion Crow");
  assert_eq!(second[0].english_name, "Common Raven");
}

#[tokio::test]
async fn sorts_descending_by_scientific_name() {
  let s = reference_with(corvids()).await;
  let page = s
    .query_page(&query("", "scientific_name", false, 10, 1, "all"))
    .await
    .unwrap();
  let names: Vec<_> = page.iter().map(|t| t.scientific_name.as_str()).collect();
  assert_eq!(names, vec!["Corvus corone", "Corvus corax"]);
}

#[tokio::test]
async fn category_filter_restricts_rows() {
  let mut taxa = corvids();
  taxa.push(taxon(
    "comrav1",
    "Corvus corax tibetanus",
    "Common Raven (Tibetan)",
    "Corvidae",
    "issf",
  ));
  let s = reference_with(taxa).await;

  let all = s
    .row_count("raven".into(), CategoryFilter::All, Language::En)
    .await
    .unwrap();
  let species = s
    .row_count("raven".into(), CategoryFilter::from("species"), Language::En)
    .await
    .unwrap();
  assert_eq!((all, species), (2, 1));
}

#[tokio::test]
async fn localized_display_name_is_searched_and_falls_back() {
  let s = reference_with(corvids()).await;
  let q = query("kolkrabe", "name", true, 10, 1, "all").with_language(Language::De);
  let page = s.query_page(&q).await.unwrap();
  assert_eq!(page.len(), 1);
  assert_eq!(page[0].display_name(Language::De), "Kolkrabe");

  // No German name stored for the crow: its English name is displayed.
  let q = query("carrion", "name", true, 10, 1, "all").with_language(Language::De);
  assert_eq!(s.query_page(&q).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unicode_search_folds_case() {
  let mut ostrich = taxon("ostric2", "Struthio camelus", "Common Ostrich", "Struthionidae", "species");
  ostrich.localized.de = Some("Strauß".into());
  ostrich.localized.es = Some("Avestruz Común".into());
  let s = reference_with(vec![ostrich]).await;

  let q = query("COMÚN", "name", true, 10, 1, "all").with_language(Language::Es);
  assert_eq!(s.query_page(&q).await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_by_code_round_trips_all_columns() {
  let mut t = taxon("laysnip1", "Zapornia palmeri", "Laysan Rail", "Rallidae", "species");
  t.extinct = true;
  t.extinct_year = Some(1944);
  t.range = Some("Laysan Island".into());
  t.localized.fr = Some("Râle de Laysan".into());
  let s = reference_with(vec![t.clone()]).await;

  let fetched = s.get_by_code("laysnip1".into()).await.unwrap().unwrap();
  assert_eq!(fetched, t);
  assert!(s.get_by_code("nope".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn find_by_scientific_name_ignores_case() {
  let s = reference_with(corvids()).await;
  let t = s
    .find_by_scientific_name("corvus CORAX".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(t.species_code, "comrav");
}

// ─── Sightings: user operations ──────────────────────────────────────────────

#[tokio::test]
async fn insert_then_get() {
  let s = sightings().await;
  let mut body = SightingBody::manual("Corvus corax", at(0));
  body.kind = SightingKind::Photo;
  body.location = Some(Coordinates::new(52.5, 13.4).unwrap());
  body.image_predictions = Some(vec![Prediction {
    label:      "Corvus corax".into(),
    confidence: 0.5,
  }]);

  let saved = s.insert(body).await.unwrap();
  assert_eq!(saved.sync_state, SyncState::Unsynced);

  let fetched = s.get(saved.sighting_id).await.unwrap().unwrap();
  assert_eq!(fetched, saved);
}

#[tokio::test]
async fn insert_survives_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("sightings.db");

  let id = {
    let s = SqliteSightingStore::open(&path).await.unwrap();
    s.insert(SightingBody::manual("Pica pica", at(3)))
      .await
      .unwrap()
      .sighting_id
  };

  let reopened = SqliteSightingStore::open(&path).await.unwrap();
  let all = reopened.get_all(None, SightingOrder::NewestFirst).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].sighting_id, id);
  assert_eq!(all[0].sync_state, SyncState::Unsynced);
}

#[tokio::test]
async fn get_all_orders_and_limits() {
  let s = sightings().await;
  for minute in [10, 30, 20] {
    s.insert(SightingBody::manual("Pica pica", at(minute)))
      .await
      .unwrap();
  }

  let newest = s.get_all(Some(2), SightingOrder::NewestFirst).await.unwrap();
  let minutes: Vec<_> = newest.iter().map(|x| x.body.observed_at).collect();
  assert_eq!(minutes, vec![at(30), at(20)]);

  let oldest = s.get_all(None, SightingOrder::OldestFirst).await.unwrap();
  assert_eq!(oldest.len(), 3);
  assert_eq!(oldest[0].body.observed_at, at(10));
}

#[tokio::test]
async fn exists_by_scientific_name_is_case_insensitive() {
  let s = sightings().await;
  assert!(!s.exists_by_scientific_name("Corvus corax".into()).await.unwrap());

  s.insert(SightingBody::manual("corvus CORAX", at(0)))
    .await
    .unwrap();
  assert!(s.exists_by_scientific_name("Corvus corax".into()).await.unwrap());
  assert!(!s.exists_by_scientific_name("Corvus corone".into()).await.unwrap());
}

#[tokio::test]
async fn logged_names_returns_folded_subset() {
  let s = sightings().await;
  s.insert(SightingBody::manual("Corvus corax", at(0)))
    .await
    .unwrap();

  let logged = s
    .logged_names(vec!["CORVUS CORAX".into(), "Pica pica".into()])
    .await
    .unwrap();
  assert_eq!(logged.len(), 1);
  assert!(logged.contains("corvus corax"));
  assert!(s.logged_names(Vec::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_resets_to_unsynced_and_bumps_version() {
  let s = sightings().await;
  let saved = s.insert(SightingBody::manual("Pica pica", at(0))).await.unwrap();
  assert!(s.mark_synced(saved.sighting_id, saved.updated_at).await.unwrap());

  let mut body = saved.body.clone();
  body.note = "two birds".into();
  let updated = s.update(saved.sighting_id, body).await.unwrap().unwrap();
  assert_eq!(updated.sync_state, SyncState::Unsynced);
  assert!(updated.updated_at > saved.updated_at);
  assert_eq!(updated.created_at, saved.created_at);

  let fetched = s.get(saved.sighting_id).await.unwrap().unwrap();
  assert_eq!(fetched.body.note, "two birds");

  assert!(s
    .update(Uuid::new_v4(), SightingBody::manual("x", at(0)))
    .await
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn delete_schedules_remote_deletion() {
  let s = sightings().await;
  let saved = s.insert(SightingBody::manual("Pica pica", at(0))).await.unwrap();

  assert!(s.delete(saved.sighting_id).await.unwrap());
  assert!(!s.delete(saved.sighting_id).await.unwrap());
  assert!(s.get(saved.sighting_id).await.unwrap().is_none());
  assert_eq!(s.pending_deletions().await.unwrap(), vec![saved.sighting_id]);

  s.clear_pending_deletion(saved.sighting_id).await.unwrap();
  assert!(s.pending_deletions().await.unwrap().is_empty());
}

// ─── Sightings: reconciler operations ────────────────────────────────────────

#[tokio::test]
async fn mark_synced_ignores_edited_records() {
  let s = sightings().await;
  let saved = s.insert(SightingBody::manual("Pica pica", at(0))).await.unwrap();
  let pushed_version = saved.updated_at;

  s.update(saved.sighting_id, SightingBody::manual("Pica pica", at(1)))
    .await
    .unwrap();
  assert!(!s.mark_synced(saved.sighting_id, pushed_version).await.unwrap());
  assert_eq!(
    s.get(saved.sighting_id).await.unwrap().unwrap().sync_state,
    SyncState::Unsynced
  );
}

#[tokio::test]
async fn failures_are_recorded_and_retried() {
  let s = sightings().await;
  let a = s.insert(SightingBody::manual("A a", at(0))).await.unwrap();
  let b = s.insert(SightingBody::manual("B b", at(1))).await.unwrap();

  assert!(
    s.mark_push_failed(a.sighting_id, a.updated_at, SyncState::Unsynced, "timeout".into())
      .await
      .unwrap()
  );
  assert!(
    s.mark_push_failed(b.sighting_id, b.updated_at, SyncState::SyncFailed, "rejected".into())
      .await
      .unwrap()
  );

  let a = s.get(a.sighting_id).await.unwrap().unwrap();
  assert_eq!(a.sync_error.as_deref(), Some("timeout"));

  let summary = s.sync_summary().await.unwrap();
  assert_eq!((summary.unsynced, summary.sync_failed), (1, 1));

  assert_eq!(s.retry_failed().await.unwrap(), 1);
  let unsynced = s.list_by_state(SyncState::Unsynced).await.unwrap();
  assert_eq!(unsynced.len(), 2);

  let b = s.get(b.sighting_id).await.unwrap().unwrap();
  assert_eq!(b.sync_state, SyncState::Unsynced);
  assert!(b.sync_error.is_none());
}

#[tokio::test]
async fn mark_push_failed_ignores_edited_records() {
  let s = sightings().await;
  let saved = s.insert(SightingBody::manual("Corvus corax", at(0))).await.unwrap();
  let pushed_version = saved.updated_at;

  s.update(saved.sighting_id, SightingBody::manual("Corvus corone", at(1)))
    .await
    .unwrap();
  let marked = s
    .mark_push_failed(saved.sighting_id, pushed_version, SyncState::SyncFailed, "rejected".into())
    .await
    .unwrap();
  assert!(!marked);

  let current = s.get(saved.sighting_id).await.unwrap().unwrap();
  assert_eq!(current.sync_state, SyncState::Unsynced);
  assert!(current.sync_error.is_none());
}

#[tokio::test]
async fn apply_remote_inserts_unknown_records_as_synced() {
  let s = sightings().await;
  let remote = RemoteSighting {
    sighting_id: Uuid::new_v4(),
    body:        SightingBody::manual("Corvus corax", at(5)),
    updated_at:  at(6),
  };
  assert_eq!(s.apply_remote(remote.clone()).await.unwrap(), MergeOutcome::Inserted);
  assert_eq!(s.apply_remote(remote.clone()).await.unwrap(), MergeOutcome::Kept);

  let local = s.get(remote.sighting_id).await.unwrap().unwrap();
  assert_eq!(local.sync_state, SyncState::Synced);
  assert_eq!(local.updated_at, at(6));
}

#[tokio::test]
async fn apply_remote_is_last_write_wins() {
  let s = sightings().await;
  let saved = s.insert(SightingBody::manual("Pica pica", at(0))).await.unwrap();

  let older = RemoteSighting {
    sighting_id: saved.sighting_id,
    body:        SightingBody::manual("Old guess", at(0)),
    updated_at:  saved.updated_at - Duration::seconds(10),
  };
  assert_eq!(s.apply_remote(older).await.unwrap(), MergeOutcome::Kept);

  let newer = RemoteSighting {
    sighting_id: saved.sighting_id,
    body:        SightingBody::manual("Corvus corax", at(0)),
    updated_at:  saved.updated_at + Duration::seconds(10),
  };
  assert_eq!(s.apply_remote(newer).await.unwrap(), MergeOutcome::Updated);

  let local = s.get(saved.sighting_id).await.unwrap().unwrap();
  assert_eq!(local.body.species_guess, "Corvus corax");
  assert_eq!(local.sync_state, SyncState::Synced);
  assert_eq!(local.created_at, saved.created_at);
}

#[tokio::test]
async fn apply_remote_does_not_resurrect_deleted_records() {
  let s = sightings().await;
  let saved = s.insert(SightingBody::manual("Pica pica", at(0))).await.unwrap();
  s.delete(saved.sighting_id).await.unwrap();

  let remote = RemoteSighting::from(&saved);
  assert_eq!(s.apply_remote(remote).await.unwrap(), MergeOutcome::Kept);
  assert!(s.get(saved.sighting_id).await.unwrap().is_none());
}

#[tokio::test]
async fn cursor_is_persisted() {
  let s = sightings().await;
  assert!(s.sync_cursor().await.unwrap().is_none());
  s.set_sync_cursor(RemoteCursor("4".into())).await.unwrap();
  s.set_sync_cursor(RemoteCursor("9".into())).await.unwrap();
  assert_eq!(s.sync_cursor().await.unwrap(), Some(RemoteCursor("9".into())));
}

// ─── Hub ─────────────────────────────────────────────────────────────────────

fn remote(guess: &str, minute: u32) -> RemoteSighting {
  RemoteSighting {
    sighting_id: Uuid::new_v4(),
    body:        SightingBody::manual(guess, at(0)),
    updated_at:  at(minute),
  }
}

#[tokio::test]
async fn hub_upsert_is_idempotent() {
  let hub = SqliteHub::open_in_memory().await.unwrap();
  let r = remote("Pica pica", 1);
  assert_eq!(hub.upsert(r.clone()).await.unwrap(), UpsertOutcome::Applied);
  assert_eq!(hub.upsert(r.clone()).await.unwrap(), UpsertOutcome::Applied);
  assert_eq!(hub.record_count().await.unwrap(), 1);

  let page = hub.list_since(None, 10).await.unwrap();
  assert_eq!(page.records.len(), 1);
}

#[tokio::test]
async fn hub_rejects_older_versions() {
  let hub = SqliteHub::open_in_memory().await.unwrap();
  let newer = remote("Pica pica", 5);
  hub.upsert(newer.clone()).await.unwrap();

  let older = RemoteSighting {
    updated_at: at(1),
    body: SightingBody::manual("Stale guess", at(0)),
    ..newer.clone()
  };
  assert_eq!(hub.upsert(older).await.unwrap(), UpsertOutcome::Stale);
  let stored = hub.get(newer.sighting_id).await.unwrap().unwrap();
  assert_eq!(stored.body.species_guess, "Pica pica");
}

#[tokio::test]
async fn hub_feed_pages_with_cursor() {
  let hub = SqliteHub::open_in_memory().await.unwrap();
  for minute in 0..3 {
    hub.upsert(remote("Pica pica", minute)).await.unwrap();
  }

  let first = hub.list_since(None, 2).await.unwrap();
  assert_eq!(first.records.len(), 2);
  assert!(first.has_more);

  let second = hub.list_since(first.next_cursor.clone(), 2).await.unwrap();
  assert_eq!(second.records.len(), 1);
  assert!(!second.has_more);

  let empty = hub.list_since(second.next_cursor.clone(), 2).await.unwrap();
  assert!(empty.records.is_empty());
  assert_eq!(empty.next_cursor, second.next_cursor);
}

#[tokio::test]
async fn hub_updated_records_reappear_in_feed() {
  let hub = SqliteHub::open_in_memory().await.unwrap();
  let r = remote("Pica pica", 1);
  hub.upsert(r.clone()).await.unwrap();
  let cursor = hub.list_since(None, 10).await.unwrap().next_cursor;

  let edited = RemoteSighting {
    updated_at: at(2),
    ..r.clone()
  };
  hub.upsert(edited).await.unwrap();
  let page = hub.list_since(cursor, 10).await.unwrap();
  assert_eq!(page.records.len(), 1);
  assert_eq!(page.records[0].updated_at, at(2));
}

#[tokio::test]
async fn hub_rejects_garbage_cursor_and_tolerates_unknown_delete() {
  let hub = SqliteHub::open_in_memory().await.unwrap();
  let err = hub
    .list_since(Some(RemoteCursor("abc".into())), 10)
    .await
    .unwrap_err();
  assert!(err.is_permanent());
  hub.delete(Uuid::new_v4()).await.unwrap();
}
