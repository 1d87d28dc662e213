//! JSON REST API over the Eyedentify record store.
//!
//! Exposes an axum [`Router`] backed by any
//! [`eyedentify_core::store::CitizenStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", eyedentify_api::api_router(store.clone()))
//! ```

pub mod citizens;
pub mod error;
pub mod operators;

use std::sync::Arc;

use axum::{Router, routing::get};
use eyedentify_core::store::CitizenStore;

pub use error::ApiError;

/// Build the API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S: CitizenStore>(store: Arc<S>) -> Router<()> {
  Router::new()
    // Citizens
    .route("/citizens", get(citizens::list::<S>).post(citizens::create::<S>))
    .route("/citizens/count", get(citizens::count::<S>))
    .route("/citizens/lookup", get(citizens::lookup::<S>))
    // Identifiers
    .route("/cni/max-sequence", get(citizens::max_sequence::<S>))
    // Operators
    .route("/operators/{user_id}", get(operators::get_one::<S>))
    .with_state(store)
}
