//! The reference query service.

use std::{
  collections::{HashMap, HashSet},
  sync::Mutex,
};

use aves_core::{
  query::{CategoryFilter, TaxonQuery},
  store::{NameResolver, ReferenceStore, SightingStore},
  taxon::{Language, Taxon},
};
use futures_util::{StreamExt as _, stream};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
  config::CatalogueConfig,
  error::{Error, Result},
};

/// A taxon as shown in a catalogue listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxonListing {
  #[serde(flatten)]
  pub taxon:        Taxon,
  /// Common name in the query's language, falling back to English.
  pub display_name: String,
  /// At least one sighting names this taxon's scientific name.
  pub logged:       bool,
}

type CacheKey = (String, Language);

/// Answers catalogue queries against the reference store and joins them
/// with the sighting log.
///
/// Localized names fetched from the resolver are cached for the lifetime of
/// the value, absent results included.
pub struct Catalogue<R, L, N> {
  reference: R,
  sightings: L,
  resolver:  N,
  config:    CatalogueConfig,
  names:     Mutex<HashMap<CacheKey, Option<String>>>,
}

impl<R, L, N> Catalogue<R, L, N>
where
  R: ReferenceStore,
  L: SightingStore,
  N: NameResolver,
{
  pub fn new(reference: R, sightings: L, resolver: N, config: CatalogueConfig) -> Self {
    Self {
      reference,
      sightings,
      resolver,
      config,
      names: Mutex::new(HashMap::new()),
    }
  }

  pub async fn query_page(&self, query: &TaxonQuery) -> Result<Vec<Taxon>> {
    self.reference.query_page(query).await.map_err(Error::read)
  }

  pub async fn row_count(
    &self,
    search_text: &str,
    category: &str,
    language: Language,
  ) -> Result<u64> {
    self
      .reference
      .row_count(
        search_text.trim().to_owned(),
        CategoryFilter::from(category),
        language,
      )
      .await
      .map_err(Error::read)
  }

  /// Look a taxon up by species code. A miss is
  /// [`aves_core::Error::NotFound`], an expected outcome.
  pub async fn get_by_code(&self, code: &str) -> Result<Taxon> {
    self
      .reference
      .get_by_code(code.to_owned())
      .await
      .map_err(Error::read)?
      .ok_or_else(|| aves_core::Error::NotFound(format!("taxon {code:?}")).into())
  }

  /// One page of taxa, each flagged with whether it has been logged.
  pub async fn listing_page(&self, query: &TaxonQuery) -> Result<Vec<TaxonListing>> {
    let taxa = self.query_page(query).await?;
    let names = taxa.iter().map(|t| t.scientific_name.clone()).collect();
    let logged = self
      .sightings
      .logged_names(names)
      .await
      .map_err(Error::read)?;

    Ok(
      taxa
        .into_iter()
        .map(|taxon| TaxonListing {
          display_name: taxon.display_name(query.language).to_owned(),
          logged: logged.contains(&taxon.scientific_name.trim().to_lowercase()),
          taxon,
        })
        .collect(),
    )
  }

  /// The common name held in the reference store for `scientific_name`.
  pub async fn stored_name(
    &self,
    scientific_name: &str,
    language: Language,
  ) -> Result<Option<String>> {
    let taxon = self
      .reference
      .find_by_scientific_name(scientific_name.to_owned())
      .await
      .map_err(Error::read)?;
    Ok(taxon.and_then(|t| match language {
      Language::En => Some(t.english_name),
      other => t.localized.get(other).map(str::to_owned),
    }))
  }

  pub async fn exists_by_scientific_name(&self, scientific_name: &str) -> Result<bool> {
    self
      .sightings
      .exists_by_scientific_name(scientific_name.to_owned())
      .await
      .map_err(Error::read)
  }

  /// Resolve display names for `scientific_names` in `language`.
  ///
  /// Names whose lookup fails are left out of the map. If the lookups do not
  /// finish within the configured timeout the whole call yields an empty map
  /// and callers show the stored name instead.
  pub async fn resolve_localized_names(
    &self,
    scientific_names: &[String],
    language: Language,
  ) -> HashMap<String, Option<String>> {
    let wanted: HashSet<&str> = scientific_names
      .iter()
      .map(|n| n.trim())
      .filter(|n| !n.is_empty())
      .collect();

    let mut resolved = HashMap::new();
    let mut misses = Vec::new();
    {
      let cache = self.cache();
      for name in wanted {
        match cache.get(&(name.to_owned(), language)) {
          Some(hit) => {
            resolved.insert(name.to_owned(), hit.clone());
          }
          None => misses.push(name.to_owned()),
        }
      }
    }
    if misses.is_empty() {
      return resolved;
    }

    let lookups = stream::iter(misses)
      .map(|name| async move {
        let result = self.resolver.resolve(name.clone(), language).await;
        (name, result)
      })
      .buffer_unordered(self.config.resolve_concurrency.max(1))
      .collect::<Vec<_>>();

    let results = match tokio::time::timeout(self.config.resolve_timeout, lookups).await {
      Ok(results) => results,
      Err(_) => {
        warn!(
          %language,
          timeout_ms = self.config.resolve_timeout.as_millis() as u64,
          "name resolution timed out"
        );
        return HashMap::new();
      }
    };

    let mut cache = self.cache();
    for (name, result) in results {
      match result {
        Ok(localized) => {
          cache.insert((name.clone(), language), localized.clone());
          resolved.insert(name, localized);
        }
        Err(e) => debug!(%name, %language, error = %e, "name resolution failed"),
      }
    }
    resolved
  }

  /// Number of cached (name, language) lookups.
  pub fn cached_names(&self) -> usize { self.cache().len() }

  fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Option<String>>> {
    // A poisoned cache only ever holds completed entries.
    self.names.lock().unwrap_or_else(|e| e.into_inner())
  }
}
