//! Core types and trait definitions for the Aves sighting log.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! reference catalogue, the sighting store and the sync reconciler all speak
//! in terms of the types and traits defined here.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod progress;
pub mod query;
pub mod remote;
pub mod sighting;
pub mod store;
pub mod taxon;

pub use error::{Error, Result};
