//! Async HTTP client for the Eyedentify server.
//!
//! [`ApiClient`] implements the core ports ([`CitizenStore`],
//! [`ObjectStorage`], [`Authenticator`]) so the wizard, directory, and
//! identification workflows run against the server unchanged.

use std::{
  sync::{PoisonError, RwLock},
  time::Duration,
};

use bytes::Bytes;
use eyedentify_core::{
  citizen::{NewCitizen, Operator, RawRecord},
  session::{AuthUser, Authenticator},
  store::{CitizenStore, ObjectStorage, StoreError},
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{status}: {message}")]
  Status { status: StatusCode, message: String },
}

impl Error {
  pub fn status(&self) -> Option<StatusCode> {
    match self {
      Self::Status { status, .. } => Some(*status),
      Self::Http(e) => e.status(),
    }
  }
}

impl StoreError for Error {
  fn is_unique_violation(&self) -> bool {
    self.status() == Some(StatusCode::CONFLICT)
  }

  fn is_invalid_query(&self) -> bool {
    self.status() == Some(StatusCode::BAD_REQUEST)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Deserialize)]
struct ErrorBody {
  error: String,
}

/// Pass successful responses through; turn the rest into
/// [`Error::Status`] carrying the server's message.
async fn check(resp: Response) -> Result<Response> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let message = match resp.json::<ErrorBody>().await {
    Ok(body) => body.error,
    Err(_) => status.to_string(),
  };
  Err(Error::Status { status, message })
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// Connection settings for the server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout:  Duration,
}

#[derive(Clone)]
struct Credentials {
  email:    String,
  password: String,
}

pub struct ApiClient {
  client:      Client,
  base_url:    String,
  credentials: RwLock<Option<Credentials>>,
  session:     watch::Sender<Option<AuthUser>>,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder().timeout(config.timeout).build()?;
    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
      credentials: RwLock::new(None),
      session: watch::Sender::new(None),
    })
  }

  pub fn base_url(&self) -> &str { &self.base_url }

  fn api(&self, path: &str) -> String {
    format!("{}/api{path}", self.base_url)
  }

  fn authed(&self, req: RequestBuilder) -> RequestBuilder {
    let creds = self
      .credentials
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone();
    match creds {
      Some(c) => req.basic_auth(c.email, Some(c.password)),
      None => req,
    }
  }

  async fn get_json<T: serde::de::DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, &str)],
  ) -> Result<T> {
    let resp = self
      .authed(self.client.get(self.api(path)))
      .query(query)
      .send()
      .await?;
    Ok(check(resp).await?.json().await?)
  }

  /// Like [`Self::get_json`], with 404 mapped to `None`.
  async fn get_optional<T: serde::de::DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, &str)],
  ) -> Result<Option<T>> {
    match self.get_json(path, query).await {
      Ok(value) => Ok(Some(value)),
      Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
      Err(e) => Err(e),
    }
  }
}

// ─── CitizenStore ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SequenceBody {
  max_sequence: Option<u32>,
}

#[derive(Deserialize)]
struct CountBody {
  count: u64,
}

impl CitizenStore for ApiClient {
  type Error = Error;

  async fn max_sequence_for_year(&self, year: i32) -> Result<Option<u32>> {
    let year = year.to_string();
    let body: SequenceBody =
      self.get_json("/cni/max-sequence", &[("year", &year)]).await?;
    Ok(body.max_sequence)
  }

  async fn list_citizens(&self, order_by: Option<&str>) -> Result<Vec<RawRecord>> {
    let query: Vec<(&str, &str)> =
      order_by.map(|column| ("order_by", column)).into_iter().collect();
    self.get_json("/citizens", &query).await
  }

  async fn find_citizen(
    &self,
    field: &str,
    value: &str,
  ) -> Result<Option<RawRecord>> {
    self
      .get_optional("/citizens/lookup", &[("field", field), ("value", value)])
      .await
  }

  async fn count_citizens(&self) -> Result<u64> {
    let body: CountBody = self.get_json("/citizens/count", &[]).await?;
    Ok(body.count)
  }

  async fn insert_citizen(&self, citizen: NewCitizen) -> Result<RawRecord> {
    debug!(national_id = %citizen.national_id, "POST /citizens");
    let resp = self
      .authed(self.client.post(self.api("/citizens")))
      .json(&citizen)
      .send()
      .await?;
    Ok(check(resp).await?.json().await?)
  }

  async fn find_operator(&self, user_id: &str) -> Result<Option<Operator>> {
    self.get_optional(&format!("/operators/{user_id}"), &[]).await
  }
}

// ─── ObjectStorage ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct UploadBody {
  url: String,
}

impl ObjectStorage for ApiClient {
  type Error = Error;

  async fn upload(
    &self,
    bucket: &str,
    key: &str,
    bytes: Bytes,
    content_type: &str,
  ) -> Result<String> {
    let resp = self
      .authed(self.client.put(self.public_url(bucket, key)))
      .header(reqwest::header::CONTENT_TYPE, content_type)
      .body(bytes)
      .send()
      .await?;
    let body: UploadBody = check(resp).await?.json().await?;
    Ok(body.url)
  }

  fn public_url(&self, bucket: &str, key: &str) -> String {
    format!("{}/storage/{bucket}/{key}", self.base_url)
  }
}

// ─── Authenticator ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SignInBody<'a> {
  email:    &'a str,
  password: &'a str,
}

impl Authenticator for ApiClient {
  type Error = Error;

  async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
    let resp = self
      .client
      .post(format!("{}/auth/sign-in", self.base_url))
      .json(&SignInBody { email, password })
      .send()
      .await?;
    let user: AuthUser = check(resp).await?.json().await?;

    *self.credentials.write().unwrap_or_else(PoisonError::into_inner) =
      Some(Credentials {
        email:    email.to_owned(),
        password: password.to_owned(),
      });
    info!(user_id = %user.user_id, "signed in");
    self.session.send_replace(Some(user.clone()));
    Ok(user)
  }

  async fn sign_out(&self) -> Result<()> {
    *self.credentials.write().unwrap_or_else(PoisonError::into_inner) = None;
    self.session.send_replace(None);
    info!("signed out");
    Ok(())
  }

  async fn current_session(&self) -> Result<Option<AuthUser>> {
    Ok(self.session.borrow().clone())
  }

  fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
    self.session.subscribe()
  }
}
