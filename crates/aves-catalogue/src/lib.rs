//! Reference catalogue services for Aves: the ingestion pipeline that loads
//! the bundled dataset into a [`aves_core::store::ReferenceStore`], and the
//! query service answering search, listing and localized-name requests.

pub mod catalogue;
pub mod config;
pub mod error;
pub mod ingest;
pub mod resolver;

pub use catalogue::{Catalogue, TaxonListing};
pub use config::{CatalogueConfig, IngestConfig};
pub use error::{Error, Result};
pub use ingest::{Ingestor, TAXA_TABLE};
pub use resolver::{HttpNameResolver, NameSource, StoredNames};
