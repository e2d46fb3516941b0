//! SQL schemas for the Aves SQLite stores.
//!
//! The reference catalogue and the sighting log live in separate database
//! files; neither schema references the other. Each DDL string is executed
//! once when a store is opened and is idempotent thanks to
//! `CREATE ... IF NOT EXISTS`.

/// Reference catalogue. `taxa` is wiped and reloaded per dataset revision.
pub const REFERENCE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS taxa (
    species_code    TEXT PRIMARY KEY,
    scientific_name TEXT NOT NULL,
    english_name    TEXT NOT NULL,
    name_de         TEXT,
    name_es         TEXT,
    name_fr         TEXT,
    name_it         TEXT,
    name_nl         TEXT,
    name_pt         TEXT,
    taxon_order     TEXT,
    family          TEXT,
    category        TEXT NOT NULL,
    taxon_range     TEXT,
    extinct         INTEGER NOT NULL DEFAULT 0,
    extinct_year    INTEGER,
    source_revision TEXT NOT NULL
);

-- Single row describing the revision held in `taxa`.
CREATE TABLE IF NOT EXISTS dataset_meta (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    revision   TEXT NOT NULL,
    total      INTEGER NOT NULL,
    loaded     INTEGER NOT NULL,
    complete   INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

PRAGMA user_version = 1;
";

/// Secondary indexes, built once every row of a revision is present.
pub const REFERENCE_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS taxa_scientific_idx ON taxa(scientific_name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS taxa_english_idx    ON taxa(english_name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS taxa_category_idx   ON taxa(category);
CREATE INDEX IF NOT EXISTS taxa_family_idx     ON taxa(family COLLATE NOCASE);
";

/// Dropped before a reload so bulk inserts do not maintain them row by row.
pub const DROP_REFERENCE_INDEXES: &str = "
DROP INDEX IF EXISTS taxa_scientific_idx;
DROP INDEX IF EXISTS taxa_english_idx;
DROP INDEX IF EXISTS taxa_category_idx;
DROP INDEX IF EXISTS taxa_family_idx;
";

/// The user's sighting log.
pub const SIGHTING_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = FULL;

CREATE TABLE IF NOT EXISTS sightings (
    sighting_id       TEXT PRIMARY KEY,
    kind              TEXT NOT NULL,   -- 'photo' | 'video' | 'audio' | 'manual'
    image_ref         TEXT,
    video_ref         TEXT,
    audio_ref         TEXT,
    note              TEXT NOT NULL DEFAULT '',
    latitude          REAL,
    longitude         REAL,
    observed_at       TEXT NOT NULL,   -- RFC 3339 UTC
    species_guess     TEXT NOT NULL DEFAULT '',
    image_predictions TEXT,            -- JSON array or NULL
    audio_predictions TEXT,            -- JSON array or NULL
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,   -- last-write-wins clock
    sync_state        TEXT NOT NULL DEFAULT 'unsynced',
    sync_error        TEXT,
    CHECK ((latitude IS NULL) = (longitude IS NULL))
);

-- Ids deleted locally whose remote deletion has not been confirmed.
CREATE TABLE IF NOT EXISTS pending_deletions (
    sighting_id TEXT PRIMARY KEY,
    deleted_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS sightings_state_idx    ON sightings(sync_state);
CREATE INDEX IF NOT EXISTS sightings_observed_idx ON sightings(observed_at);

PRAGMA user_version = 1;
";

/// Server-side copy of every device's sightings.
pub const HUB_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS hub_sightings (
    sighting_id TEXT PRIMARY KEY,
    body_json   TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    revision    INTEGER NOT NULL UNIQUE
);

-- Monotonic change counter backing the list-since cursor.
CREATE TABLE IF NOT EXISTS hub_clock (
    id       INTEGER PRIMARY KEY CHECK (id = 1),
    revision INTEGER NOT NULL
);

INSERT OR IGNORE INTO hub_clock (id, revision) VALUES (1, 0);

PRAGMA user_version = 1;
";
