//! SQLite backends for the Aves data layer.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The reference catalogue, the sighting
//! log and the hub each own a separate database file.

mod encode;
mod hub;
mod reference;
mod schema;
mod sighting;

pub mod error;

pub use error::{Error, Result};
pub use hub::{MAX_FEED_PAGE, SqliteHub};
pub use reference::SqliteReferenceStore;
pub use sighting::SqliteSightingStore;

#[cfg(test)]
mod tests;
