//! Session-limit circuit breaker.
//!
//! The legacy server caps concurrent sessions and answers 402 once the cap
//! is hit. Every further login attempt makes things worse, so the first 402
//! trips this breaker and all session refreshes and API calls fail fast
//! until an operator resets it.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::error::{ClientError, Result};

/// Shared session-limit flag.
///
/// Shared via `Arc` by everything built from one
/// [`LegacyContext`](crate::context::LegacyContext).
#[derive(Debug, Default)]
pub struct SessionLimitBreaker {
    reached: AtomicBool,
}

impl SessionLimitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the flag. Logs once on the false -> true transition.
    pub fn set_session_limit_reached(&self, reached: bool) {
        let previous = self.reached.swap(reached, Ordering::SeqCst);
        match (previous, reached) {
            (false, true) => warn!(
                "Legacy session limit reached; new sessions are blocked until the breaker is reset"
            ),
            (true, false) => info!("Legacy session-limit breaker reset"),
            _ => {}
        }
    }

    pub fn is_session_limit_reached(&self) -> bool {
        self.reached.load(Ordering::SeqCst)
    }

    pub fn trip(&self) {
        self.set_session_limit_reached(true);
    }

    pub fn reset(&self) {
        self.set_session_limit_reached(false);
    }

    /// Fail fast with an authentication error while tripped.
    pub fn check(&self) -> Result<()> {
        if self.is_session_limit_reached() {
            return Err(ClientError::Authentication(
                "legacy session limit reached; refusing to open a new session".to_string(),
            ));
        }
        Ok(())
    }
}
