//! The authentication port and the application's session container.
//!
//! [`SessionContainer`] owns the only copy of "who is signed in". It is
//! created once at startup, handed to whatever needs it, and stops listening
//! for changes when shut down or dropped.

use std::{
  future::Future,
  sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// The identity the authenticator vouches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
  pub user_id:      String,
  pub email:        String,
  #[serde(default)]
  pub display_name: Option<String>,
}

impl AuthUser {
  pub fn label(&self) -> &str {
    self.display_name.as_deref().unwrap_or(&self.email)
  }
}

pub trait Authenticator: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  fn sign_in<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AuthUser, Self::Error>> + Send + 'a;

  fn sign_out(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn current_session(
    &self,
  ) -> impl Future<Output = Result<Option<AuthUser>, Self::Error>> + Send + '_;

  /// Notifications of every sign-in and sign-out.
  fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
  pub user:    Option<AuthUser>,
  /// True until the initial session lookup has finished.
  pub loading: bool,
}

impl AuthState {
  pub fn is_authenticated(&self) -> bool { self.user.is_some() }
}

pub struct SessionContainer<A> {
  auth:     Arc<A>,
  state:    Arc<RwLock<AuthState>>,
  listener: Option<JoinHandle<()>>,
}

impl<A: Authenticator> SessionContainer<A> {
  /// Subscribe to changes, read the current session, and start mirroring
  /// notifications into the container's state.
  pub async fn start(auth: Arc<A>) -> Self {
    let state = Arc::new(RwLock::new(AuthState { user: None, loading: true }));
    let mut changes = auth.subscribe();

    let user = auth.current_session().await.unwrap_or_else(|e| {
      warn!(error = %e, "could not read current session");
      None
    });
    set_user(&state, user);

    let mirror = Arc::clone(&state);
    let listener = tokio::spawn(async move {
      while changes.changed().await.is_ok() {
        let user = changes.borrow_and_update().clone();
        debug!(signed_in = user.is_some(), "auth state changed");
        set_user(&mirror, user);
      }
    });

    Self { auth, state, listener: Some(listener) }
  }

  pub fn state(&self) -> AuthState {
    self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn current_user(&self) -> Option<AuthUser> { self.state().user }

  pub fn authenticator(&self) -> &Arc<A> { &self.auth }

  pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
    let user = self
      .auth
      .sign_in(email, password)
      .await
      .map_err(|e| Error::Auth(e.to_string()))?;
    info!(user_id = %user.user_id, "signed in");
    set_user(&self.state, Some(user.clone()));
    Ok(user)
  }

  pub async fn sign_out(&self) -> Result<()> {
    self.auth.sign_out().await.map_err(|e| Error::Auth(e.to_string()))?;
    set_user(&self.state, None);
    Ok(())
  }

  /// Stop listening for auth changes. Idempotent.
  pub fn shutdown(&mut self) {
    if let Some(listener) = self.listener.take() {
      listener.abort();
    }
  }

  pub fn is_listening(&self) -> bool {
    self.listener.as_ref().is_some_and(|l| !l.is_finished())
  }
}

impl<A> Drop for SessionContainer<A> {
  fn drop(&mut self) {
    if let Some(listener) = self.listener.take() {
      listener.abort();
    }
  }
}

fn set_user(state: &RwLock<AuthState>, user: Option<AuthUser>) {
  let mut state = state.write().unwrap_or_else(PoisonError::into_inner);
  state.user = user;
  state.loading = false;
}
