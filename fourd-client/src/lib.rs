//! Client for the legacy 4D ERP REST endpoint
//!
//! Provides session-cookie authentication against a server with a hard cap
//! on concurrent sessions:
//! - One pooled session per environment, cookie persisted per environment
//! - Retry with exponential backoff on network failures
//! - Automatic re-authentication on 401/403/404
//! - A session-limit breaker that stops all logins after a 402
//! - Pagination over `__ENTITIES` / `__COUNT` envelopes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     LegacyClient  /  compat shims       │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ SessionPool │──────▶│  Transport  │
//! │ + Session   │       │ (reqwest /  │
//! │ + breaker   │       │   mock)     │
//! └─────────────┘       └─────────────┘
//! ```

pub mod breaker;
pub mod client;
pub mod compat;
pub mod config;
pub mod context;
pub mod error;
pub mod retry;
pub mod session;
pub mod transport;
pub mod types;

// Re-export main types
pub use breaker::SessionLimitBreaker;
pub use client::{LegacyClient, StatusClass};
pub use config::{EnvironmentConfig, LegacyConfig, PaginationConfig};
pub use context::{global, install_global, LegacyContext};
pub use error::{ClientError, Result};
pub use retry::RetryPolicy;
pub use session::{CookieFile, Session, SessionPool, StoredCookie};
pub use transport::{HttpRequest, HttpResponse, Method, MockTransport, ReqwestTransport, Transport, TransportError};
pub use types::{Envelope, FetchOptions, Record, Table};
