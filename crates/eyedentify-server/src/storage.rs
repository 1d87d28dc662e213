//! Photo storage routes over [`DiskObjectStorage`].
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `PUT`  | `/storage/{bucket}/{*key}` | Authenticated; 201 `{"url"}`, 409 if the key exists |
//! | `GET`  | `/storage/{bucket}/{*key}` | Public; `ETag`, 304 on `If-None-Match` |

use axum::{
  Json,
  body::{Body, Bytes},
  extract::{Path, State},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use eyedentify_core::store::{CitizenStore, ObjectStorage};
use eyedentify_store_sqlite::content_type_for;
use serde_json::json;

use crate::{
  AppState,
  auth::{Authenticated, CredentialStore},
  error::{Error, Result},
  etag::{compute_etag, if_none_match},
};

/// `PUT /storage/{bucket}/{*key}`
pub async fn put_object<S>(
  State(state): State<AppState<S>>,
  Authenticated(operator): Authenticated,
  Path((bucket, key)): Path<(String, String)>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<impl IntoResponse>
where
  S: CitizenStore + CredentialStore,
{
  if body.is_empty() {
    return Err(Error::BadRequest("empty upload".to_owned()));
  }
  let content_type = headers
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_else(|| content_type_for(&key))
    .to_owned();

  let size = body.len();
  let url = state
    .storage
    .upload(&bucket, &key, body, &content_type)
    .await
    .map_err(Error::from_store)?;
  tracing::info!(%bucket, %key, size, user_id = %operator.user_id, "object stored");
  Ok((StatusCode::CREATED, Json(json!({ "url": url }))))
}

/// `GET /storage/{bucket}/{*key}`
pub async fn get_object<S>(
  State(state): State<AppState<S>>,
  Path((bucket, key)): Path<(String, String)>,
  headers: HeaderMap,
) -> Result<Response>
where
  S: CitizenStore + CredentialStore,
{
  let bytes = state
    .storage
    .get(&bucket, &key)
    .await
    .map_err(Error::from_store)?
    .ok_or(Error::NotFound)?;

  let etag = compute_etag(&bytes);
  let not_modified = headers
    .get(header::IF_NONE_MATCH)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| if_none_match(v, &etag));
  if not_modified {
    return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
  }

  Ok(
    (
      [
        (header::CONTENT_TYPE, content_type_for(&key).to_owned()),
        (header::ETAG, etag),
      ],
      Body::from(bytes),
    )
      .into_response(),
  )
}
