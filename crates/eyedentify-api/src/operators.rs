//! Handler for `GET /operators/{user_id}`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use eyedentify_core::{citizen::Operator, store::CitizenStore};

use crate::error::ApiError;

/// `GET /operators/{user_id}`, 404 if not found.
pub async fn get_one<S: CitizenStore>(
  State(store): State<Arc<S>>,
  Path(user_id): Path<String>,
) -> Result<Json<Operator>, ApiError> {
  store
    .find_operator(&user_id)
    .await
    .map_err(ApiError::from_store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("operator {user_id}")))
}
