//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use aves_core::remote::RemoteError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized")]
  Unauthorized,

  /// The reference catalogue has not been loaded, or its load failed.
  #[error("reference data not ready: {0}")]
  NotReady(String),

  /// A feature this server was not configured with.
  #[error("unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

impl From<aves_core::Error> for ApiError {
  fn from(e: aves_core::Error) -> Self {
    match e {
      aves_core::Error::InvalidArgument(m) => Self::BadRequest(m),
      aves_core::Error::NotFound(m) => Self::NotFound(m),
    }
  }
}

impl From<aves_catalogue::Error> for ApiError {
  fn from(e: aves_catalogue::Error) -> Self {
    match e {
      aves_catalogue::Error::Core(core) => core.into(),
      aves_catalogue::Error::IngestFailed(reason) => Self::NotReady(reason),
      other => Self::store(other),
    }
  }
}

impl From<RemoteError> for ApiError {
  fn from(e: RemoteError) -> Self {
    match e {
      RemoteError::Rejected(m) => Self::BadRequest(m),
      other => Self::store(other),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::NotReady(_) | ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Store(e) => {
        tracing::error!(error = %e, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"aves hub\""),
      );
    }
    response
  }
}
