//! Session management for the legacy server.
//!
//! One authenticated [`Session`] per named environment, handed out by the
//! [`SessionPool`]. A session is only a cookie: the legacy server decides
//! when it expires and tells us through 401/403 on the next request.

pub mod cookie;
pub mod pool;

pub use cookie::{CookieFile, StoredCookie, FALLBACK_COOKIE_NAME, SESSION_COOKIE_NAME};
pub use pool::SessionPool;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::breaker::SessionLimitBreaker;
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;
use crate::transport::{HttpRequest, Transport, TransportError};

/// Path of the login handshake, relative to the REST endpoint.
pub const INFO_PATH: &str = "$info";

#[derive(Debug, Default)]
struct SessionState {
    cookie: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

/// Authenticated connection context for one environment.
///
/// Refreshes are serialized per session: concurrent callers that find no
/// cookie wait for one login instead of each opening their own.
pub struct Session {
    environment: String,
    endpoint: String,
    transport: Arc<dyn Transport>,
    breaker: Arc<SessionLimitBreaker>,
    store: Arc<CookieFile>,
    policy: RetryPolicy,
    timeout: Duration,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(
        environment: impl Into<String>,
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        breaker: Arc<SessionLimitBreaker>,
        store: Arc<CookieFile>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            environment: environment.into(),
            endpoint: endpoint.into(),
            transport,
            breaker,
            store,
            policy,
            timeout,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current in-memory cookie, without logging in.
    pub async fn cookie(&self) -> Option<String> {
        self.state.lock().await.cookie.clone()
    }

    /// When the current cookie was obtained.
    pub async fn created_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.created_at
    }

    /// Cookie for the next request, logging in if there is none.
    ///
    /// A cookie persisted by an earlier run is reused before a new login is
    /// attempted.
    pub async fn get_cookie(&self) -> Result<String> {
        self.breaker.check()?;

        let mut state = self.state.lock().await;
        if let Some(cookie) = &state.cookie {
            return Ok(cookie.clone());
        }
        if let Some(cookie) = self.load_persisted_into(&mut state).await? {
            return Ok(cookie);
        }
        self.refresh_locked(&mut state).await
    }

    /// Make sure a cookie is available: memory, then disk, then login.
    pub async fn ensure_valid(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.cookie.is_some() {
            return Ok(());
        }
        if self.load_persisted_into(&mut state).await?.is_some() {
            return Ok(());
        }
        self.refresh_locked(&mut state).await.map(|_| ())
    }

    /// Perform the login handshake and store the new cookie.
    pub async fn refresh(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    /// Forget the cookie in memory and on disk.
    pub async fn invalidate(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.invalidate_locked(&mut state).await
    }

    /// Replace a cookie the server just rejected.
    ///
    /// Logs in again only while `stale` is still the current cookie. If a
    /// concurrent caller already replaced it, the newer cookie is returned
    /// without another login.
    pub async fn replace_if_stale(&self, stale: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        match state.cookie.as_deref() {
            Some(current) if current != stale => {
                debug!(environment = %self.environment, "Session already replaced");
                return Ok(current.to_string());
            }
            Some(_) => {}
            None => {
                if let Some(cookie) = self.load_persisted_into(&mut state).await? {
                    if cookie != stale {
                        return Ok(cookie);
                    }
                }
            }
        }

        self.invalidate_locked(&mut state).await?;
        self.refresh_locked(&mut state).await
    }

    /// Read the persisted cookie for this environment without touching
    /// in-memory state.
    pub async fn load_persisted(&self) -> Result<Option<StoredCookie>> {
        self.store.load(&self.environment).await
    }

    async fn invalidate_locked(&self, state: &mut SessionState) -> Result<()> {
        state.cookie = None;
        state.created_at = None;
        self.store.remove(&self.environment).await?;
        debug!(environment = %self.environment, "Session invalidated");
        Ok(())
    }

    async fn load_persisted_into(&self, state: &mut SessionState) -> Result<Option<String>> {
        let Some(stored) = self.store.load(&self.environment).await? else {
            return Ok(None);
        };

        debug!(environment = %self.environment, "Reusing persisted session cookie");
        state.cookie = Some(stored.value.clone());
        state.created_at = Some(stored.created_at);
        Ok(Some(stored.value))
    }

    async fn refresh_locked(&self, state: &mut SessionState) -> Result<String> {
        self.breaker.check()?;

        let url = format!("{}/{}", self.endpoint, INFO_PATH);
        let response = self
            .policy
            .run(
                || {
                    self.transport
                        .send(HttpRequest::get(url.clone()).with_timeout(self.timeout))
                },
                |_: &TransportError| true,
            )
            .await?;

        if response.status == 402 {
            self.breaker.trip();
            return Err(ClientError::Authentication(format!(
                "legacy server refused login for '{}': session limit reached",
                self.environment
            )));
        }
        if !response.is_success() {
            return Err(ClientError::Authentication(format!(
                "login for '{}' returned HTTP {}",
                self.environment, response.status
            )));
        }

        let cookie = cookie::extract_session_cookie(&response).ok_or_else(|| {
            ClientError::Authentication(format!(
                "login for '{}' succeeded but no session cookie was set",
                self.environment
            ))
        })?;

        let now = Utc::now();
        state.cookie = Some(cookie.clone());
        state.created_at = Some(now);

        let stored = StoredCookie {
            name: SESSION_COOKIE_NAME.to_string(),
            value: cookie.clone(),
            created_at: now,
            environment: self.environment.clone(),
        };
        if let Err(e) = self.store.save(&stored).await {
            warn!(environment = %self.environment, error = %e, "Failed to persist session cookie");
        }

        info!(environment = %self.environment, "Legacy session established");
        Ok(cookie)
    }
}
