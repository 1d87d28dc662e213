//! HTTP server for Eyedentify.
//!
//! Mounts the JSON API under `/api` behind operator Basic authentication,
//! plus the sign-in endpoint and the photo storage routes.

pub mod auth;
pub mod error;
pub mod etag;
pub mod storage;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  middleware,
  routing::{get, post},
};
use eyedentify_core::store::CitizenStore;
use eyedentify_store_sqlite::DiskObjectStorage;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{CredentialStore, require_operator};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `EYEDENTIFY_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:        String,
  pub port:        u16,
  /// Public origin used to build object URLs, e.g. `http://localhost:8080`.
  pub base_url:    String,
  pub store_path:  PathBuf,
  pub storage_dir: PathBuf,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:   Arc<S>,
  pub storage: Arc<DiskObjectStorage>,
  pub config:  Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      storage: Arc::clone(&self.storage),
      config:  Arc::clone(&self.config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full server [`Router`].
pub fn router<S>(state: AppState<S>) -> Router
where
  S: CitizenStore + CredentialStore,
{
  let api = eyedentify_api::api_router(Arc::clone(&state.store)).layer(
    middleware::from_fn_with_state(state.clone(), require_operator::<S>),
  );

  Router::new()
    .route("/auth/sign-in", post(auth::sign_in::<S>))
    .route(
      "/storage/{bucket}/{*key}",
      get(storage::get_object::<S>).put(storage::put_object::<S>),
    )
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────
