//! Handlers for `/citizens` and `/cni` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/citizens` | Optional `?order_by=<column>`, newest first |
//! | `POST` | `/citizens` | Body: a `NewCitizen`; 409 on a taken national ID |
//! | `GET`  | `/citizens/count` | `{"count": n}` |
//! | `GET`  | `/citizens/lookup` | `?field=<column>&value=<v>`; 404 if absent |
//! | `GET`  | `/cni/max-sequence` | `?year=<yyyy>` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use eyedentify_core::{
  citizen::{NewCitizen, RawRecord},
  store::CitizenStore,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub order_by: Option<String>,
}

/// `GET /citizens[?order_by=<column>]`
pub async fn list<S: CitizenStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<RawRecord>>, ApiError> {
  let rows = store
    .list_citizens(params.order_by.as_deref())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(rows))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /citizens`
pub async fn create<S: CitizenStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewCitizen>,
) -> Result<impl IntoResponse, ApiError> {
  let national_id = body.national_id;
  let row = store
    .insert_citizen(body)
    .await
    .map_err(ApiError::from_store)?;
  tracing::info!(%national_id, "citizen inserted");
  Ok((StatusCode::CREATED, Json(row)))
}

// ─── Count ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CountBody {
  pub count: u64,
}

/// `GET /citizens/count`
pub async fn count<S: CitizenStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<CountBody>, ApiError> {
  let count = store.count_citizens().await.map_err(ApiError::from_store)?;
  Ok(Json(CountBody { count }))
}

// ─── Lookup ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LookupParams {
  pub field: String,
  pub value: String,
}

/// `GET /citizens/lookup?field=<column>&value=<v>`
pub async fn lookup<S: CitizenStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<LookupParams>,
) -> Result<Json<RawRecord>, ApiError> {
  store
    .find_citizen(&params.field, &params.value)
    .await
    .map_err(ApiError::from_store)?
    .map(Json)
    .ok_or_else(|| {
      ApiError::NotFound(format!("no citizen with {} = {}", params.field, params.value))
    })
}

// ─── Max sequence ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SequenceParams {
  pub year: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SequenceBody {
  pub year:         i32,
  pub max_sequence: Option<u32>,
}

/// `GET /cni/max-sequence?year=<yyyy>`
pub async fn max_sequence<S: CitizenStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<SequenceParams>,
) -> Result<Json<SequenceBody>, ApiError> {
  let max_sequence = store
    .max_sequence_for_year(params.year)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(SequenceBody { year: params.year, max_sequence }))
}
