//! Tunables for reconciliation runs.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncConfig {
  /// Upper bound on any single remote call.
  pub request_timeout: Duration,
  /// Records requested per `list_since` page.
  pub page_size:       usize,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      request_timeout: Duration::from_secs(10),
      page_size:       100,
    }
  }
}
