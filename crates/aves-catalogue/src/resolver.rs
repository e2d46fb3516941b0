//! [`NameResolver`] implementations.

use std::time::Duration;

use aves_core::{
  remote::RemoteError,
  store::{NameResolver, ReferenceStore},
  taxon::Language,
};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

// ─── HTTP ────────────────────────────────────────────────────────────────────

/// Resolves names through another server's `GET /names/{scientific_name}`.
#[derive(Clone)]
pub struct HttpNameResolver {
  client:  reqwest::Client,
  base:    Url,
  timeout: Duration,
}

#[derive(Deserialize)]
struct NameResponse {
  name: Option<String>,
}

impl HttpNameResolver {
  pub fn new(base: Url, timeout: Duration) -> Result<Self, RemoteError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| RemoteError::Unreachable(e.to_string()))?;
    Ok(Self {
      client,
      base,
      timeout,
    })
  }

  fn name_url(&self, scientific_name: &str, language: Language) -> Result<Url, RemoteError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| RemoteError::Rejected(format!("{} cannot be a base URL", self.base)))?
      .pop_if_empty()
      .push("names")
      .push(scientific_name);
    url
      .query_pairs_mut()
      .append_pair("lang", &language.to_string());
    Ok(url)
  }

  fn transport_error(&self, e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
      RemoteError::Timeout(self.timeout)
    } else {
      RemoteError::Unreachable(e.to_string())
    }
  }
}

impl NameResolver for HttpNameResolver {
  async fn resolve(
    &self,
    scientific_name: String,
    language: Language,
  ) -> Result<Option<String>, RemoteError> {
    let url = self.name_url(&scientific_name, language)?;
    let response = self.client.get(url).send().await.map_err(|e| self.transport_error(e))?;

    match response.status() {
      StatusCode::NOT_FOUND => Ok(None),
      s if s.is_success() => {
        let body: NameResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        Ok(body.name)
      }
      s if s.is_client_error() => Err(RemoteError::Rejected(s.to_string())),
      s => Err(RemoteError::Server(s.to_string())),
    }
  }
}

// ─── Reference store ─────────────────────────────────────────────────────────

/// Resolves names from the local reference store's language columns. Used
/// when no remote resolver is configured.
#[derive(Clone)]
pub struct StoredNames<R> {
  store: R,
}

impl<R> StoredNames<R> {
  pub fn new(store: R) -> Self { Self { store } }
}

impl<R: ReferenceStore> NameResolver for StoredNames<R> {
  async fn resolve(
    &self,
    scientific_name: String,
    language: Language,
  ) -> Result<Option<String>, RemoteError> {
    let taxon = self
      .store
      .find_by_scientific_name(scientific_name)
      .await
      .map_err(|e| RemoteError::Server(e.to_string()))?;
    Ok(taxon.and_then(|t| match language {
      Language::En => Some(t.english_name),
      other => t.localized.get(other).map(str::to_owned),
    }))
  }
}

// ─── Either ──────────────────────────────────────────────────────────────────

/// The resolver a front end was configured with: another server's name
/// endpoint, or the local reference store.
#[derive(Clone)]
pub enum NameSource<R> {
  Http(HttpNameResolver),
  Stored(StoredNames<R>),
}

impl<R: ReferenceStore> NameResolver for NameSource<R> {
  async fn resolve(
    &self,
    scientific_name: String,
    language: Language,
  ) -> Result<Option<String>, RemoteError> {
    match self {
      Self::Http(r) => r.resolve(scientific_name, language).await,
      Self::Stored(r) => r.resolve(scientific_name, language).await,
    }
  }
}
