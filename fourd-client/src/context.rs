//! Shared state for everything that talks to the legacy server.
//!
//! A [`LegacyContext`] owns the transport, the session-limit breaker, the
//! cookie store and the session pool. Clients built from the same context
//! share all of them; separate contexts are fully isolated, which is what
//! tests want. The process-wide instance behind [`global`] exists only for
//! the [`compat`](crate::compat) functions.

use std::sync::{Arc, OnceLock};
use tracing::info;

use crate::breaker::SessionLimitBreaker;
use crate::client::LegacyClient;
use crate::config::LegacyConfig;
use crate::error::{ClientError, Result};
use crate::session::{CookieFile, SessionPool};
use crate::transport::{ReqwestTransport, Transport};

#[derive(Clone)]
pub struct LegacyContext {
    config: Arc<LegacyConfig>,
    pool: Arc<SessionPool>,
}

impl LegacyContext {
    /// Build a context with the reqwest transport.
    pub fn new(config: LegacyConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a context around a custom transport.
    pub fn with_transport(config: LegacyConfig, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(CookieFile::new(config.session_dir.clone()));
        let config = Arc::new(config);
        let pool = Arc::new(SessionPool::new(
            config.clone(),
            transport,
            Arc::new(SessionLimitBreaker::new()),
            store,
        ));

        Self { config, pool }
    }

    pub fn config(&self) -> &LegacyConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn breaker(&self) -> &Arc<SessionLimitBreaker> {
        self.pool.breaker()
    }

    /// Client for a named environment.
    pub fn client(&self, environment: &str) -> Result<LegacyClient> {
        LegacyClient::new(self.pool.clone(), environment)
    }

    /// Client for the configured default environment.
    pub fn default_client(&self) -> Result<LegacyClient> {
        self.client(&self.config.default_environment)
    }
}

static GLOBAL: OnceLock<LegacyContext> = OnceLock::new();

/// Install the process-wide context. Only the first call wins.
pub fn install_global(ctx: LegacyContext) -> Result<()> {
    GLOBAL
        .set(ctx)
        .map_err(|_| ClientError::Config("global legacy context already installed".to_string()))?;
    info!("Global legacy context installed");
    Ok(())
}

/// The process-wide context, if installed.
pub fn global() -> Result<&'static LegacyContext> {
    GLOBAL
        .get()
        .ok_or_else(|| ClientError::Config("global legacy context not installed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn config() -> LegacyConfig {
        let dir = std::env::temp_dir().join("fourd-context-tests");
        LegacyConfig {
            session_dir: dir,
            ..LegacyConfig::default()
        }
        .with_environment("live", "http://live.erp")
    }

    #[test]
    fn test_clients_share_pool() {
        let ctx = LegacyContext::with_transport(config(), Arc::new(MockTransport::new()));
        let a = ctx.default_client().unwrap();
        let b = ctx.client("live").unwrap();

        assert_eq!(a.endpoint(), "http://live.erp/rest");
        assert!(Arc::ptr_eq(
            &ctx.pool().get_session(a.environment()).unwrap(),
            &ctx.pool().get_session(b.environment()).unwrap()
        ));
    }

    #[test]
    fn test_contexts_are_isolated() {
        let a = LegacyContext::with_transport(config(), Arc::new(MockTransport::new()));
        let b = LegacyContext::with_transport(config(), Arc::new(MockTransport::new()));

        a.breaker().trip();
        assert!(a.breaker().is_session_limit_reached());
        assert!(!b.breaker().is_session_limit_reached());
    }

    #[test]
    fn test_unknown_environment() {
        let ctx = LegacyContext::with_transport(config(), Arc::new(MockTransport::new()));
        assert!(matches!(ctx.client("staging"), Err(ClientError::Config(_))));
    }
}
