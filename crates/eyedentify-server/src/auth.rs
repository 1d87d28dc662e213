//! Operator authentication: HTTP Basic credentials checked against argon2
//! hashes in the operator table.

use std::future::Future;

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::{
  Json,
  extract::{FromRequestParts, Request, State},
  http::{HeaderMap, header, request::Parts},
  middleware::Next,
  response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use eyedentify_core::{
  citizen::{Operator, OperatorAccount},
  session::AuthUser,
  store::{CitizenStore, StoreError},
};
use eyedentify_store_sqlite::SqliteStore;
use rand_core::OsRng;
use serde::Deserialize;

use crate::{AppState, error::{Error, Result}};

// ─── Credential lookup ───────────────────────────────────────────────────────

/// Where operator accounts and their password hashes live.
pub trait CredentialStore: Send + Sync + 'static {
  type Error: StoreError;

  /// The account registered under `email`, compared case-insensitively.
  fn operator_account<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<OperatorAccount>, Self::Error>> + Send + 'a;
}

impl CredentialStore for SqliteStore {
  type Error = eyedentify_store_sqlite::Error;

  async fn operator_account(
    &self,
    email: &str,
  ) -> Result<Option<OperatorAccount>, Self::Error> {
    self.find_operator_account(email).await
  }
}

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Hash `password` into an argon2 PHC string with a fresh salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

fn verify_password(password: &str, phc: &str) -> Result<()> {
  let parsed_hash = PasswordHash::new(phc).map_err(|_| Error::Unauthorized)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)
}

// ─── Basic auth ──────────────────────────────────────────────────────────────

/// Decode the `Authorization: Basic` header into `(email, password)`.
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String)> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds   = String::from_utf8(decoded).map_err(|_| Error::Unauthorized)?;

  let (email, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;
  Ok((email.to_owned(), password.to_owned()))
}

/// Check `email` and `password` against the stored account.
pub async fn verify_operator<S: CredentialStore>(
  store: &S,
  email: &str,
  password: &str,
) -> Result<Operator> {
  let account = store
    .operator_account(email)
    .await
    .map_err(Error::from_store)?
    .ok_or(Error::Unauthorized)?;
  verify_password(password, &account.password_hash)?;
  Ok(account.operator)
}

/// Verify the Basic credentials carried by `headers`.
pub async fn verify_auth<S: CredentialStore>(
  headers: &HeaderMap,
  store: &S,
) -> Result<Operator> {
  let (email, password) = basic_credentials(headers)?;
  verify_operator(store, &email, &password).await
}

// ─── Extractor & middleware ──────────────────────────────────────────────────

/// Present in a handler means the request carried valid operator
/// credentials.
pub struct Authenticated(pub Operator);

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: CitizenStore + CredentialStore,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    if let Some(operator) = parts.extensions.get::<Operator>() {
      return Ok(Authenticated(operator.clone()));
    }
    let operator = verify_auth(&parts.headers, state.store.as_ref()).await?;
    Ok(Authenticated(operator))
  }
}

/// Reject the request with 401 unless it carries operator credentials. The
/// verified [`Operator`] is stored in the request extensions.
pub async fn require_operator<S>(
  State(state): State<AppState<S>>,
  mut req: Request,
  next: Next,
) -> Result<Response>
where
  S: CitizenStore + CredentialStore,
{
  let operator = verify_auth(req.headers(), state.store.as_ref()).await?;
  tracing::debug!(user_id = %operator.user_id, "operator authenticated");
  req.extensions_mut().insert(operator);
  Ok(next.run(req).await)
}

// ─── Sign-in ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SignInBody {
  pub email:    String,
  pub password: String,
}

/// `POST /auth/sign-in`: exchange email and password for the operator's
/// identity. The client then sends the same credentials as Basic auth.
pub async fn sign_in<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<SignInBody>,
) -> Result<Json<AuthUser>>
where
  S: CitizenStore + CredentialStore,
{
  let operator = verify_operator(state.store.as_ref(), &body.email, &body.password)
    .await
    .inspect_err(|_| tracing::warn!(email = %body.email, "sign-in rejected"))?;
  tracing::info!(user_id = %operator.user_id, "operator signed in");
  Ok(Json(AuthUser {
    user_id:      operator.user_id,
    email:        operator.email,
    display_name: Some(operator.display_name),
  }))
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  fn headers(value: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    h
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  #[test]
  fn decodes_credentials() {
    let (email, password) =
      basic_credentials(&headers(&basic("awa@example.sn", "pa:ss"))).unwrap();
    assert_eq!(email, "awa@example.sn");
    assert_eq!(password, "pa:ss");
  }

  #[test]
  fn missing_header() {
    assert!(matches!(basic_credentials(&HeaderMap::new()), Err(Error::Unauthorized)));
  }

  #[test]
  fn invalid_base64() {
    let h = headers("Basic !!!not-base64!!!");
    assert!(matches!(basic_credentials(&h), Err(Error::Unauthorized)));
  }

  #[test]
  fn wrong_scheme() {
    let h = headers("Bearer abc");
    assert!(matches!(basic_credentials(&h), Err(Error::Unauthorized)));
  }

  #[test]
  fn password_hash_round_trip() {
    let phc = hash_password("secret").unwrap();
    assert!(verify_password("secret", &phc).is_ok());
    assert!(verify_password("wrong", &phc).is_err());
    assert!(verify_password("secret", "not-a-phc-string").is_err());
  }

  #[tokio::test]
  async fn verify_operator_against_sqlite() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let phc = hash_password("secret").unwrap();
    store.add_operator("Ibou@Example.sn", "Ibrahima Ba", &phc).await.unwrap();

    let op = verify_operator(&store, "ibou@example.sn", "secret").await.unwrap();
    assert_eq!(op.display_name, "Ibrahima Ba");
    assert!(matches!(
      verify_operator(&store, "ibou@example.sn", "nope").await,
      Err(Error::Unauthorized)
    ));
    assert!(matches!(
      verify_operator(&store, "ghost@example.sn", "secret").await,
      Err(Error::Unauthorized)
    ));
  }
}
