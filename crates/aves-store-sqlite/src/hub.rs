//! [`SqliteHub`]: the server-side sighting store every device syncs with.
//!
//! Each accepted write takes the next value of a monotonic counter; the
//! list-since cursor is that counter rendered as a decimal string.

use std::path::Path;

use aves_core::{
  remote::{RemoteCursor, RemoteError, RemotePage, RemoteSighting, UpsertOutcome},
  sighting::SightingBody,
  store::RemoteSightingStore,
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  encode::{decode_dt, decode_uuid, encode_dt, encode_uuid},
  schema::HUB_SCHEMA,
  Error, Result,
};

/// Largest page `list_since` returns, whatever the caller asks for.
pub const MAX_FEED_PAGE: usize = 500;

#[derive(Clone)]
pub struct SqliteHub {
  conn: tokio_rusqlite::Connection,
}

impl SqliteHub {
  /// Open (or create) a hub at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let hub = Self { conn };
    hub.init_schema().await?;
    Ok(hub)
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let hub = Self { conn };
    hub.init_schema().await?;
    Ok(hub)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(HUB_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of records held.
  pub async fn record_count(&self) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM hub_sightings", [], |r| r.get(0))?))
      .await?;
    Ok(n as u64)
  }

  pub async fn get(&self, id: Uuid) -> Result<Option<RemoteSighting>> {
    let id_str = encode_uuid(id);
    let row = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT sighting_id, body_json, updated_at FROM hub_sightings
               WHERE sighting_id = ?1",
              rusqlite::params![id_str],
              |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?)),
            )
            .optional()?,
        )
      })
      .await?;
    row.map(decode_record).transpose()
  }

  async fn upsert_inner(&self, record: RemoteSighting) -> Result<UpsertOutcome> {
    let id_str = encode_uuid(record.sighting_id);
    let incoming = record.updated_at;
    let at_str = encode_dt(incoming);
    let body_json = serde_json::to_string(&record.body)?;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let stored: Option<String> = tx
          .query_row(
            "SELECT updated_at FROM hub_sightings WHERE sighting_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        if let Some(stored) = stored {
          let stored_at =
            decode_dt(&stored).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
          if stored_at > incoming {
            return Ok(UpsertOutcome::Stale);
          }
          if stored_at == incoming {
            // Same version re-sent; nothing changes and the feed stays put.
            return Ok(UpsertOutcome::Applied);
          }
        }

        tx.execute("UPDATE hub_clock SET revision = revision + 1 WHERE id = 1", [])?;
        let revision: i64 =
          tx.query_row("SELECT revision FROM hub_clock WHERE id = 1", [], |r| r.get(0))?;
        tx.execute(
          "INSERT INTO hub_sightings (sighting_id, body_json, updated_at, revision)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(sighting_id) DO UPDATE SET
             body_json = excluded.body_json,
             updated_at = excluded.updated_at,
             revision = excluded.revision",
          rusqlite::params![id_str, body_json, at_str, revision],
        )?;
        tx.commit()?;
        Ok(UpsertOutcome::Applied)
      })
      .await?;
    Ok(outcome)
  }

  async fn list_inner(&self, after: i64, limit: usize) -> Result<(Vec<RemoteSighting>, Option<i64>, bool)> {
    let limit = limit.clamp(1, MAX_FEED_PAGE);
    let (rows, has_more) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT sighting_id, body_json, updated_at, revision FROM hub_sightings
           WHERE revision > ?1 ORDER BY revision ASC LIMIT ?2",
        )?;
        let mut rows = stmt
          .query_map(rusqlite::params![after, (limit + 1) as i64], |r| {
            Ok((
              r.get::<_, String>(0)?,
              r.get::<_, String>(1)?,
              r.get::<_, String>(2)?,
              r.get::<_, i64>(3)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        Ok((rows, has_more))
      })
      .await?;

    let last = rows.last().map(|r| r.3);
    let records = rows
      .into_iter()
      .map(|(id, body, at, _)| decode_record((id, body, at)))
      .collect::<Result<Vec<_>>>()?;
    Ok((records, last, has_more))
  }

  async fn delete_inner(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM hub_sightings WHERE sighting_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn decode_record((id, body, at): (String, String, String)) -> Result<RemoteSighting> {
  let body: SightingBody = serde_json::from_str(&body)?;
  Ok(RemoteSighting {
    sighting_id: decode_uuid(&id)?,
    body,
    updated_at: decode_dt(&at)?,
  })
}

fn parse_cursor(cursor: Option<&RemoteCursor>) -> Result<i64, RemoteError> {
  match cursor {
    None => Ok(0),
    Some(c) => c
      .as_str()
      .parse::<i64>()
      .ok()
      .filter(|n| *n >= 0)
      .ok_or_else(|| RemoteError::Rejected(format!("invalid cursor {:?}", c.as_str()))),
  }
}

fn server_error(e: Error) -> RemoteError {
  tracing::error!(error = %e, "hub store failure");
  RemoteError::Server(e.to_string())
}

// ─── RemoteSightingStore impl ────────────────────────────────────────────────

impl RemoteSightingStore for SqliteHub {
  async fn upsert(&self, record: RemoteSighting) -> Result<UpsertOutcome, RemoteError> {
    self.upsert_inner(record).await.map_err(server_error)
  }

  async fn list_since(
    &self,
    cursor: Option<RemoteCursor>,
    limit: usize,
  ) -> Result<RemotePage, RemoteError> {
    let after = parse_cursor(cursor.as_ref())?;
    let (records, last, has_more) = self.list_inner(after, limit).await.map_err(server_error)?;
    let next_cursor = match last {
      Some(rev) => Some(RemoteCursor(rev.to_string())),
      None => cursor,
    };
    Ok(RemotePage {
      records,
      next_cursor,
      has_more,
    })
  }

  async fn delete(&self, id: Uuid) -> Result<(), RemoteError> {
    self.delete_inner(id).await.map_err(server_error)
  }
}
