//! Sighting synchronisation for Aves.
//!
//! [`Reconciler`] exchanges the local sighting log with a remote store:
//! local changes are pushed as create-or-update keyed by the sighting id, and
//! remote changes are pulled through a cursor. Conflicts resolve by
//! last-write-wins on `updated_at`.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod reconciler;
pub mod remote;
pub mod report;

pub use config::SyncConfig;
pub use connectivity::{HttpProbe, ManualConnectivity};
pub use error::{Error, Result};
pub use reconciler::Reconciler;
pub use remote::{HttpRemote, HubConfig};
pub use report::{PushFailure, SyncOutcome, SyncPhase, SyncReport};

#[cfg(test)]
mod tests;
