//! [`SqliteSightingStore`], the SQLite implementation of [`SightingStore`].

use std::{collections::HashSet, path::Path};

use aves_core::{
  remote::{RemoteCursor, RemoteSighting},
  sighting::{
    MergeOutcome, Sighting, SightingBody, SightingOrder, SyncState, SyncSummary,
  },
  store::SightingStore,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  encode::{
    EncodedBody, RawSighting, SIGHTING_COLUMNS, decode_dt, decode_sync_state,
    decode_uuid, encode_dt, encode_uuid, fold, register_fold,
  },
  schema::SIGHTING_SCHEMA,
  Error, Result,
};

const CURSOR_KEY: &str = "remote_cursor";

// ─── Store ───────────────────────────────────────────────────────────────────

/// The user's sighting log backed by a single SQLite file.
///
/// The file is opened with `synchronous = FULL`, so a write that has returned
/// survives a crash or power loss. Cloning is cheap.
#[derive(Clone)]
pub struct SqliteSightingStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteSightingStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SIGHTING_SCHEMA)?;
        register_fold(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_raw(&self, sql: String, params: Vec<String>) -> Result<Vec<Sighting>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawSighting::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSighting::into_sighting).collect()
  }
}

/// The next value of a record's last-write-wins clock: now, but always
/// strictly after `previous`.
fn next_version(previous: DateTime<Utc>) -> DateTime<Utc> {
  let now = Utc::now();
  if now > previous {
    now
  } else {
    previous + Duration::microseconds(1)
  }
}

fn write_body(
  conn: &rusqlite::Connection,
  id: &str,
  body: &EncodedBody,
  updated_at: &str,
  state: SyncState,
) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE sightings SET
       kind = ?2, image_ref = ?3, video_ref = ?4, audio_ref = ?5, note = ?6,
       latitude = ?7, longitude = ?8, observed_at = ?9, species_guess = ?10,
       image_predictions = ?11, audio_predictions = ?12,
       updated_at = ?13, sync_state = ?14, sync_error = NULL
     WHERE sighting_id = ?1",
    rusqlite::params![
      id,
      body.kind,
      body.image_ref,
      body.video_ref,
      body.audio_ref,
      body.note,
      body.latitude,
      body.longitude,
      body.observed_at,
      body.species_guess,
      body.image_predictions,
      body.audio_predictions,
      updated_at,
      state.to_string(),
    ],
  )
}

fn insert_row(
  conn: &rusqlite::Connection,
  id: &str,
  body: &EncodedBody,
  created_at: &str,
  updated_at: &str,
  state: SyncState,
) -> rusqlite::Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO sightings ({SIGHTING_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, NULL)"
    ),
    rusqlite::params![
      id,
      body.kind,
      body.image_ref,
      body.video_ref,
      body.audio_ref,
      body.note,
      body.latitude,
      body.longitude,
      body.observed_at,
      body.species_guess,
      body.image_predictions,
      body.audio_predictions,
      created_at,
      updated_at,
      state.to_string(),
    ],
  )?;
  Ok(())
}

// ─── SightingStore impl ──────────────────────────────────────────────────────

impl SightingStore for SqliteSightingStore {
  type Error = Error;

  // ── User operations ───────────────────────────────────────────────────────

  async fn insert(&self, body: SightingBody) -> Result<Sighting> {
    let now = Utc::now();
    let sighting = Sighting {
      sighting_id: Uuid::new_v4(),
      body,
      created_at: now,
      updated_at: now,
      sync_state: SyncState::Unsynced,
      sync_error: None,
    };

    let id_str = encode_uuid(sighting.sighting_id);
    let at_str = encode_dt(now);
    let encoded = EncodedBody::new(&sighting.body)?;

    self
      .conn
      .call(move |conn| {
        insert_row(conn, &id_str, &encoded, &at_str, &at_str, SyncState::Unsynced)?;
        Ok(())
      })
      .await?;

    tracing::debug!(id = %sighting.sighting_id, "sighting saved");
    Ok(sighting)
  }

  async fn get(&self, id: Uuid) -> Result<Option<Sighting>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SIGHTING_COLUMNS} FROM sightings WHERE sighting_id = ?1"),
              rusqlite::params![id_str],
              RawSighting::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSighting::into_sighting).transpose()
  }

  async fn get_all(&self, limit: Option<usize>, order: SightingOrder) -> Result<Vec<Sighting>> {
    let dir = match order {
      SightingOrder::NewestFirst => "DESC",
      SightingOrder::OldestFirst => "ASC",
    };
    let mut sql = format!(
      "SELECT {SIGHTING_COLUMNS} FROM sightings ORDER BY observed_at {dir}, created_at {dir}"
    );
    if let Some(n) = limit {
      sql.push_str(&format!(" LIMIT {n}"));
    }
    self.fetch_raw(sql, Vec::new()).await
  }

  async fn update(&self, id: Uuid, body: SightingBody) -> Result<Option<Sighting>> {
    let Some(existing) = self.get(id).await? else {
      return Ok(None);
    };

    let updated = Sighting {
      body,
      updated_at: next_version(existing.updated_at),
      sync_state: SyncState::Unsynced,
      sync_error: None,
      ..existing
    };

    let id_str = encode_uuid(id);
    let at_str = encode_dt(updated.updated_at);
    let encoded = EncodedBody::new(&updated.body)?;

    let changed = self
      .conn
      .call(move |conn| Ok(write_body(conn, &id_str, &encoded, &at_str, SyncState::Unsynced)?))
      .await?;

    // Deleted between the read and the write.
    if changed == 0 {
      return Ok(None);
    }
    Ok(Some(updated))
  }

  async fn delete(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let now = encode_dt(Utc::now());
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let removed = tx.execute(
          "DELETE FROM sightings WHERE sighting_id = ?1",
          rusqlite::params![id_str],
        )?;
        if removed > 0 {
          tx.execute(
            "INSERT OR REPLACE INTO pending_deletions (sighting_id, deleted_at)
             VALUES (?1, ?2)",
            rusqlite::params![id_str, now],
          )?;
        }
        tx.commit()?;
        Ok(removed > 0)
      })
      .await?;
    Ok(removed)
  }

  async fn exists_by_scientific_name(&self, scientific_name: String) -> Result<bool> {
    let needle = fold(&scientific_name);
    if needle.is_empty() {
      return Ok(false);
    }
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM sightings WHERE fold(species_guess) = ?1 LIMIT 1",
              rusqlite::params![needle],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn logged_names(&self, scientific_names: Vec<String>) -> Result<HashSet<String>> {
    let wanted: Vec<String> = scientific_names
      .iter()
      .map(|n| fold(n))
      .filter(|n| !n.is_empty())
      .collect::<HashSet<_>>()
      .into_iter()
      .collect();
    if wanted.is_empty() {
      return Ok(HashSet::new());
    }

    let placeholders = (1..=wanted.len())
      .map(|i| format!("?{i}"))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "SELECT DISTINCT fold(species_guess) FROM sightings
       WHERE fold(species_guess) IN ({placeholders})"
    );

    let found = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(wanted), |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(found)
  }

  async fn list_by_state(&self, state: SyncState) -> Result<Vec<Sighting>> {
    let sql = format!(
      "SELECT {SIGHTING_COLUMNS} FROM sightings WHERE sync_state = ?1
       ORDER BY created_at ASC, sighting_id ASC"
    );
    self.fetch_raw(sql, vec![state.to_string()]).await
  }

  async fn sync_summary(&self) -> Result<SyncSummary> {
    let (counts, pending) = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT sync_state, COUNT(*) FROM sightings GROUP BY sync_state")?;
        let counts = stmt
          .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let pending: i64 =
          conn.query_row("SELECT COUNT(*) FROM pending_deletions", [], |r| r.get(0))?;
        Ok((counts, pending))
      })
      .await?;

    let mut summary = SyncSummary {
      pending_deletions: pending as u64,
      ..SyncSummary::default()
    };
    for (state, n) in counts {
      let n = n as u64;
      match decode_sync_state(&state)? {
        SyncState::Unsynced => summary.unsynced = n,
        SyncState::Synced => summary.synced = n,
        SyncState::SyncFailed => summary.sync_failed = n,
      }
    }
    Ok(summary)
  }

  async fn retry_failed(&self) -> Result<u64> {
    let changed = self
      .conn
      .call(|conn| {
        Ok(conn.execute(
          "UPDATE sightings SET sync_state = 'unsynced', sync_error = NULL
           WHERE sync_state = 'sync_failed'",
          [],
        )?)
      })
      .await?;
    Ok(changed as u64)
  }

  // ── Reconciler operations ─────────────────────────────────────────────────

  async fn mark_synced(&self, id: Uuid, pushed_version: DateTime<Utc>) -> Result<bool> {
    let id_str = encode_uuid(id);
    let version = encode_dt(pushed_version);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sightings SET sync_state = 'synced', sync_error = NULL
           WHERE sighting_id = ?1 AND updated_at = ?2",
          rusqlite::params![id_str, version],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn mark_push_failed(
    &self,
    id: Uuid,
    pushed_version: DateTime<Utc>,
    state: SyncState,
    reason: String,
  ) -> Result<bool> {
    let id_str = encode_uuid(id);
    let version = encode_dt(pushed_version);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sightings SET sync_state = ?3, sync_error = ?4
           WHERE sighting_id = ?1 AND updated_at = ?2",
          rusqlite::params![id_str, version, state.to_string(), reason],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn apply_remote(&self, remote: RemoteSighting) -> Result<MergeOutcome> {
    let id_str = encode_uuid(remote.sighting_id);
    let remote_at = remote.updated_at;
    let remote_at_str = encode_dt(remote_at);
    let encoded = EncodedBody::new(&remote.body)?;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let tombstoned = tx
          .query_row(
            "SELECT 1 FROM pending_deletions WHERE sighting_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if tombstoned {
          return Ok(MergeOutcome::Kept);
        }

        let local: Option<String> = tx
          .query_row(
            "SELECT updated_at FROM sightings WHERE sighting_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        let outcome = match local {
          None => {
            insert_row(&tx, &id_str, &encoded, &remote_at_str, &remote_at_str, SyncState::Synced)?;
            MergeOutcome::Inserted
          }
          Some(local) => {
            let local_at =
              decode_dt(&local).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            if remote_at > local_at {
              write_body(&tx, &id_str, &encoded, &remote_at_str, SyncState::Synced)?;
              MergeOutcome::Updated
            } else {
              MergeOutcome::Kept
            }
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;
    Ok(outcome)
  }

  async fn pending_deletions(&self) -> Result<Vec<Uuid>> {
    let ids = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT sighting_id FROM pending_deletions ORDER BY deleted_at ASC")?;
        let rows = stmt
          .query_map([], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn clear_pending_deletion(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM pending_deletions WHERE sighting_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn sync_cursor(&self) -> Result<Option<RemoteCursor>> {
    let value = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM sync_meta WHERE key = ?1",
              rusqlite::params![CURSOR_KEY],
              |r| r.get::<_, String>(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(value.map(RemoteCursor))
  }

  async fn set_sync_cursor(&self, cursor: RemoteCursor) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value",
          rusqlite::params![CURSOR_KEY, cursor.0],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
