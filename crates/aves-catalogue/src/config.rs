//! Tunables for ingestion and catalogue queries.

use std::time::Duration;

/// How the ingestion pipeline batches and reports its work.
#[derive(Debug, Clone)]
pub struct IngestConfig {
  /// Rows per insert transaction.
  pub batch_size:       usize,
  /// Emit a parsing progress event every this many decoded records.
  pub parse_milestone:  u64,
  /// Batches the decoder may run ahead of the writer.
  pub channel_capacity: usize,
  /// Capacity of the progress broadcast; slow subscribers skip events.
  pub progress_buffer:  usize,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      batch_size:       500,
      parse_milestone:  2_000,
      channel_capacity: 4,
      progress_buffer:  256,
    }
  }
}

/// Localized-name resolution limits.
#[derive(Debug, Clone)]
pub struct CatalogueConfig {
  /// Upper bound on a whole `resolve_localized_names` call.
  pub resolve_timeout:     Duration,
  /// Resolver calls in flight at once.
  pub resolve_concurrency: usize,
}

impl Default for CatalogueConfig {
  fn default() -> Self {
    Self {
      resolve_timeout:     Duration::from_secs(3),
      resolve_concurrency: 8,
    }
  }
}
