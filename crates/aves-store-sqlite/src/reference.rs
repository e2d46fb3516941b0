//! [`SqliteReferenceStore`], the SQLite implementation of [`ReferenceStore`].

use std::path::Path;

use aves_core::{
  query::{CategoryFilter, SortField, TaxonQuery},
  store::{DatasetStamp, ReferenceStore},
  taxon::{Language, Taxon},
};
use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value};

use crate::{
  encode::{TAXON_COLUMNS, encode_dt, fold, register_fold, taxon_from_row},
  schema::{DROP_REFERENCE_INDEXES, REFERENCE_INDEXES, REFERENCE_SCHEMA},
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The reference catalogue backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteReferenceStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteReferenceStore {
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
        conn.execute_batch(REFERENCE_SCHEMA)?;
        register_fold(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Read the single `dataset_meta` row, if any.
fn read_stamp(conn: &rusqlite::Connection) -> rusqlite::Result<Option<DatasetStamp>> {
  conn
    .query_row(
      "SELECT revision, total, loaded, complete FROM dataset_meta WHERE id = 1",
      [],
      |r| {
        Ok(DatasetStamp {
          revision: r.get(0)?,
          total:    r.get::<_, i64>(1)? as u64,
          loaded:   r.get::<_, i64>(2)? as u64,
          complete: r.get::<_, i64>(3)? != 0,
        })
      },
    )
    .optional()
}

// ─── Query building ──────────────────────────────────────────────────────────

/// SQL expression for the name displayed in `language`.
fn display_expr(language: Language) -> String {
  match language {
    Language::En => "english_name".to_owned(),
    other => format!("COALESCE({}, english_name)", other.column()),
  }
}

/// `WHERE` clause and its parameters for a search/category filter.
fn filter_clause(
  search_text: &str,
  category: &CategoryFilter,
  language: Language,
) -> (String, Vec<Value>) {
  let mut clauses = Vec::new();
  let mut params = Vec::new();

  let needle = fold(search_text);
  if !needle.is_empty() {
    params.push(Value::Text(needle));
    let idx = params.len();
    clauses.push(format!(
      "(instr(fold({}), ?{idx}) > 0 OR instr(fold(scientific_name), ?{idx}) > 0)",
      display_expr(language),
    ));
  }
  if let Some(cat) = category.category() {
    params.push(Value::Text(cat.to_owned()));
    clauses.push(format!("category = ?{}", params.len()));
  }

  let sql = if clauses.is_empty() {
    String::new()
  } else {
    format!(" WHERE {}", clauses.join(" AND "))
  };
  (sql, params)
}

fn order_clause(query: &TaxonQuery) -> String {
  let dir = if query.ascending { "ASC" } else { "DESC" };
  let key = match query.sort {
    SortField::Name => format!("fold({})", display_expr(query.language)),
    SortField::ScientificName => "scientific_name COLLATE NOCASE".to_owned(),
    SortField::Family => "family COLLATE NOCASE".to_owned(),
  };
  format!(" ORDER BY {key} {dir}, species_code {dir}")
}

// ─── ReferenceStore impl ─────────────────────────────────────────────────────

impl ReferenceStore for SqliteReferenceStore {
  type Error = Error;

  async fn dataset_stamp(&self) -> Result<Option<DatasetStamp>> {
    let stamp = self.conn.call(|conn| Ok(read_stamp(conn)?)).await?;
    Ok(stamp)
  }

  async fn begin_revision(&self, revision: String, total: u64) -> Result<DatasetStamp> {
    let now = encode_dt(Utc::now());
    let stamp = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = read_stamp(&tx)?;

        let stamp = match current {
          Some(s) if s.revision == revision => {
            tx.execute(
              "UPDATE dataset_meta SET total = ?1, updated_at = ?2 WHERE id = 1",
              rusqlite::params![total as i64, now],
            )?;
            DatasetStamp { total, ..s }
          }
          _ => {
            tx.execute_batch(DROP_REFERENCE_INDEXES)?;
            tx.execute("DELETE FROM taxa", [])?;
            tx.execute(
              "INSERT OR REPLACE INTO dataset_meta
                 (id, revision, total, loaded, complete, updated_at)
               VALUES (1, ?1, ?2, 0, 0, ?3)",
              rusqlite::params![revision, total as i64, now],
            )?;
            DatasetStamp {
              revision,
              total,
              loaded: 0,
              complete: false,
            }
          }
        };
        tx.commit()?;
        Ok(stamp)
      })
      .await?;
    Ok(stamp)
  }

  async fn insert_batch(&self, revision: String, batch: Vec<Taxon>) -> Result<u64> {
    let now = encode_dt(Utc::now());
    let expected = revision.clone();

    // `Err(found)` when the store is loading another revision.
    let outcome: std::result::Result<u64, Option<String>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = read_stamp(&tx)?;
        match current {
          Some(ref s) if s.revision == revision => {}
          other => return Ok(Err(other.map(|s| s.revision))),
        }

        {
          let mut stmt = tx.prepare_cached(&format!(
            "INSERT OR REPLACE INTO taxa ({TAXON_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
          ))?;
          for t in &batch {
            stmt.execute(rusqlite::params![
              t.species_code,
              t.scientific_name,
              t.english_name,
              t.localized.de,
              t.localized.es,
              t.localized.fr,
              t.localized.it,
              t.localized.nl,
              t.localized.pt,
              t.order,
              t.family,
              t.category,
              t.range,
              t.extinct as i64,
              t.extinct_year,
              t.source_revision,
            ])?;
          }
        }

        let loaded: i64 = tx.query_row("SELECT COUNT(*) FROM taxa", [], |r| r.get(0))?;
        tx.execute(
          "UPDATE dataset_meta SET loaded = ?1, updated_at = ?2 WHERE id = 1",
          rusqlite::params![loaded, now],
        )?;
        tx.commit()?;
        Ok(Ok(loaded as u64))
      })
      .await?;

    outcome.map_err(|found| Error::RevisionMismatch { expected, found })
  }

  async fn build_indexes(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(REFERENCE_INDEXES)?;
        conn.execute_batch("ANALYZE taxa;")?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn mark_complete(&self, revision: String) -> Result<()> {
    let now = encode_dt(Utc::now());
    let expected = revision.clone();
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE dataset_meta SET complete = 1, updated_at = ?2
           WHERE id = 1 AND revision = ?1",
          rusqlite::params![revision, now],
        )?)
      })
      .await?;

    if changed == 0 {
      let found = self.dataset_stamp().await?.map(|s| s.revision);
      return Err(Error::RevisionMismatch { expected, found });
    }
    Ok(())
  }

  async fn query_page<'a>(&'a self, query: &'a TaxonQuery) -> Result<Vec<Taxon>> {
    let (where_sql, mut params) =
      filter_clause(&query.search_text, &query.category, query.language);
    params.push(Value::Integer(i64::from(query.page_size)));
    let limit_idx = params.len();
    params.push(Value::Integer(query.offset() as i64));
    let offset_idx = params.len();

    let sql = format!(
      "SELECT {TAXON_COLUMNS} FROM taxa{where_sql}{order} LIMIT ?{limit_idx} OFFSET ?{offset_idx}",
      order = order_clause(query),
    );

    let taxa = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), taxon_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(taxa)
  }

  async fn row_count(
    &self,
    search_text: String,
    category: CategoryFilter,
    language: Language,
  ) -> Result<u64> {
    let (where_sql, params) = filter_clause(&search_text, &category, language);
    let sql = format!("SELECT COUNT(*) FROM taxa{where_sql}");

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&sql, rusqlite::params_from_iter(params), |r| r.get(0))?)
      })
      .await?;
    Ok(count as u64)
  }

  async fn get_by_code(&self, code: String) -> Result<Option<Taxon>> {
    let taxon = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TAXON_COLUMNS} FROM taxa WHERE species_code = ?1"),
              rusqlite::params![code.trim()],
              taxon_from_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(taxon)
  }

  async fn find_by_scientific_name(&self, scientific_name: String) -> Result<Option<Taxon>> {
    let needle = fold(&scientific_name);
    let taxon = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {TAXON_COLUMNS} FROM taxa WHERE fold(scientific_name) = ?1
                 ORDER BY CASE category WHEN 'species' THEN 0 ELSE 1 END, species_code
                 LIMIT 1"
              ),
              rusqlite::params![needle],
              taxon_from_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(taxon)
  }
}
