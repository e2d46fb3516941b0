//! JSON API over the Aves data layer.
//!
//! [`router`] serves the reference catalogue, the sighting log and sync for
//! one device. With a [`HubState`] it also serves the hub routes other
//! devices sync against.

pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod reference;
pub mod sightings;
pub mod state;
pub mod sync;

use axum::{
  Router,
  routing::{get, post},
};
use aves_core::store::{Connectivity, RemoteSightingStore};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiError;
pub use hub::HubState;
pub use state::AppState;

/// Build the server's router.
pub fn router<R, C>(state: AppState<R, C>, hub: Option<HubState>) -> Router
where
  R: RemoteSightingStore + 'static,
  C: Connectivity + 'static,
{
  let app = Router::new()
    // Reference catalogue
    .route("/reference/ensure", post(reference::ensure::<R, C>))
    .route("/reference/status", get(reference::status::<R, C>))
    .route("/reference/taxa", get(reference::list::<R, C>))
    .route("/reference/taxa/count", get(reference::count::<R, C>))
    .route("/reference/taxa/{code}", get(reference::get_one::<R, C>))
    .route("/reference/names", get(reference::resolve::<R, C>))
    .route("/names/{scientific_name}", get(reference::stored_name::<R, C>))
    // Sightings
    .route("/sightings", get(sightings::list::<R, C>).post(sightings::create::<R, C>))
    .route("/sightings/retry", post(sightings::retry_failed::<R, C>))
    .route(
      "/sightings/{id}",
      get(sightings::get_one::<R, C>)
        .put(sightings::update::<R, C>)
        .delete(sightings::delete::<R, C>),
    )
    // Sync
    .route("/sync", get(sync::status::<R, C>).post(sync::run::<R, C>))
    .with_state(state);

  let app = match hub {
    Some(hub) => app.merge(hub::router(hub)),
    None => app,
  };
  app.layer(TraceLayer::new_for_http())
}
