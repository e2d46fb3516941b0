//! HTTP client for a hub served by `aves-server`.

use std::time::Duration;

use aves_core::{
  remote::{RemoteCursor, RemoteError, RemotePage, RemoteSighting, UpsertOutcome},
  store::RemoteSightingStore,
};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Where the hub lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct HubConfig {
  /// Server root; hub routes live under `{base_url}/hub`.
  pub base_url: String,
  pub username: String,
  pub password: String,
  pub timeout:  Duration,
}

/// [`RemoteSightingStore`] over the hub's JSON routes.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpRemote {
  client: reqwest::Client,
  base:   Url,
  config: HubConfig,
}

impl HttpRemote {
  pub fn new(config: HubConfig) -> Result<Self> {
    let base = Url::parse(&config.base_url).map_err(|e| Error::InvalidUrl {
      url:    config.base_url.clone(),
      reason: e.to_string(),
    })?;
    if base.cannot_be_a_base() {
      return Err(Error::InvalidUrl {
        url:    config.base_url.clone(),
        reason: "not a base URL".to_string(),
      });
    }
    let client = reqwest::Client::builder().timeout(config.timeout).build()?;
    Ok(Self {
      client,
      base,
      config,
    })
  }

  /// `{base}/hub/sightings[/{id}]`
  fn url(&self, id: Option<Uuid>) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty().push("hub").push("sightings");
      if let Some(id) = id {
        segments.push(&id.to_string());
      }
    }
    url
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    if self.config.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.username, Some(&self.config.password))
    }
  }

  async fn send(&self, req: RequestBuilder) -> Result<Response, RemoteError> {
    let resp = self
      .auth(req)
      .send()
      .await
      .map_err(|e| self.transport_error(e))?;
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, body))
  }

  fn transport_error(&self, e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
      RemoteError::Timeout(self.config.timeout)
    } else {
      RemoteError::Unreachable(e.to_string())
    }
  }
}

/// Map a non-success status. A 4xx is a permanent rejection of this record
/// unless it is about the connection rather than the record.
fn status_error(status: StatusCode, body: String) -> RemoteError {
  let detail = if body.is_empty() {
    status.to_string()
  } else {
    format!("{status}: {body}")
  };
  match status {
    StatusCode::UNAUTHORIZED
    | StatusCode::FORBIDDEN
    | StatusCode::REQUEST_TIMEOUT
    | StatusCode::TOO_MANY_REQUESTS => RemoteError::Server(detail),
    s if s.is_client_error() => RemoteError::Rejected(detail),
    _ => RemoteError::Server(detail),
  }
}

impl RemoteSightingStore for HttpRemote {
  async fn upsert(&self, record: RemoteSighting) -> Result<UpsertOutcome, RemoteError> {
    let req = self.client.put(self.url(Some(record.sighting_id))).json(&record);
    let resp = self.send(req).await?;
    resp.json().await.map_err(|e| self.transport_error(e))
  }

  async fn list_since(
    &self,
    cursor: Option<RemoteCursor>,
    limit: usize,
  ) -> Result<RemotePage, RemoteError> {
    let mut url = self.url(None);
    {
      let mut query = url.query_pairs_mut();
      if let Some(cursor) = &cursor {
        query.append_pair("since", cursor.as_str());
      }
      query.append_pair("limit", &limit.to_string());
    }
    let resp = self.send(self.client.get(url)).await?;
    resp.json().await.map_err(|e| self.transport_error(e))
  }

  async fn delete(&self, id: Uuid) -> Result<(), RemoteError> {
    let resp = self
      .auth(self.client.delete(self.url(Some(id))))
      .send()
      .await
      .map_err(|e| self.transport_error(e))?;
    match resp.status() {
      s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
      s => Err(status_error(s, resp.text().await.unwrap_or_default())),
    }
  }
}
