//! Function-style entry points kept for older call sites.
//!
//! Everything here forwards to the globally installed
//! [`LegacyContext`](crate::context::LegacyContext); see
//! [`install_global`](crate::context::install_global).

use serde_json::Value;
use tracing::warn;

use crate::context::global;
use crate::error::Result;
use crate::types::{FetchOptions, Table};

/// Fetch a table from the default environment.
#[deprecated(note = "use LegacyClient::fetch_table")]
pub async fn fetch_data_from_api(
    table_name: &str,
    top: Option<u32>,
    skip: u32,
    new_data_only: bool,
) -> Result<Table> {
    warn!(table = table_name, "fetch_data_from_api is deprecated, use LegacyClient::fetch_table");

    let options = FetchOptions {
        top,
        skip,
        new_data_only,
        ..FetchOptions::default()
    };
    global()?.default_client()?.fetch_table(table_name, &options).await
}

/// Push one field to the default environment.
#[deprecated(note = "use LegacyClient::push_field")]
pub async fn push_data(table_name: &str, record_id: &str, field_name: &str, field_value: Value) -> Result<bool> {
    warn!(table = table_name, "push_data is deprecated, use LegacyClient::push_field");

    global()?
        .default_client()?
        .push_field(table_name, record_id, field_name, field_value)
        .await
}

/// Session cookie for `environment` (default environment when `None`).
#[deprecated(note = "use SessionPool::get_session and Session::get_cookie")]
pub async fn get_session_cookie(environment: Option<&str>) -> Result<String> {
    warn!("get_session_cookie is deprecated, use Session::get_cookie");

    let ctx = global()?;
    let environment = environment.unwrap_or(ctx.config().default_environment.as_str());
    ctx.pool().get_session(environment)?.get_cookie().await
}
