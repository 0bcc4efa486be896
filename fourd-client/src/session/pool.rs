//! Pool of sessions keyed by environment name.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::{CookieFile, Session};
use crate::breaker::SessionLimitBreaker;
use crate::config::LegacyConfig;
use crate::error::Result;
use crate::transport::Transport;

/// At most one [`Session`] per environment, created on first use.
pub struct SessionPool {
    config: Arc<LegacyConfig>,
    transport: Arc<dyn Transport>,
    breaker: Arc<SessionLimitBreaker>,
    store: Arc<CookieFile>,
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionPool {
    pub fn new(
        config: Arc<LegacyConfig>,
        transport: Arc<dyn Transport>,
        breaker: Arc<SessionLimitBreaker>,
        store: Arc<CookieFile>,
    ) -> Self {
        Self {
            config,
            transport,
            breaker,
            store,
            sessions: DashMap::new(),
        }
    }

    /// Pooled session for `environment`. Does not log in.
    ///
    /// Fails if the environment is not configured or the retry settings are
    /// unusable.
    pub fn get_session(&self, environment: &str) -> Result<Arc<Session>> {
        if let Some(session) = self.sessions.get(environment) {
            return Ok(session.clone());
        }

        let endpoint = self.config.endpoint_for(environment)?;
        let policy = self.config.retry_policy()?;
        let session = self
            .sessions
            .entry(environment.to_string())
            .or_insert_with(|| {
                debug!(environment, "Creating session");
                Arc::new(Session::new(
                    environment,
                    endpoint,
                    self.transport.clone(),
                    self.breaker.clone(),
                    self.store.clone(),
                    policy,
                    self.config.timeout(),
                ))
            })
            .clone();

        Ok(session)
    }

    /// Invalidate and drop the session for `environment`.
    ///
    /// The persisted cookie is removed even if no session was pooled.
    pub async fn invalidate_session(&self, environment: &str) -> Result<()> {
        match self.sessions.remove(environment) {
            Some((_, session)) => session.invalidate().await,
            None => self.store.remove(environment).await,
        }
    }

    /// Environments with a pooled session.
    pub fn environments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn breaker(&self) -> &Arc<SessionLimitBreaker> {
        &self.breaker
    }

    pub fn store(&self) -> &Arc<CookieFile> {
        &self.store
    }

    pub fn config(&self) -> &LegacyConfig {
        &self.config
    }
}
