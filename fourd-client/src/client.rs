//! Client for the legacy table/record endpoints

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::breaker::SessionLimitBreaker;
use crate::config::PaginationConfig;
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;
use crate::session::{SessionPool, SESSION_COOKIE_NAME};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use crate::types::{Envelope, FetchOptions, Table};

/// What a response status means for the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx
    Success,
    /// 401/403 (and 404 unless disabled): the cookie went stale,
    /// log in again and retry
    StaleSession,
    /// 402: the server is out of sessions, stop everything
    SessionLimit,
    /// Any other status
    Failure,
}

impl StatusClass {
    pub fn of(status: u16, reauth_on_not_found: bool) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            401 | 403 => StatusClass::StaleSession,
            404 if reauth_on_not_found => StatusClass::StaleSession,
            402 => StatusClass::SessionLimit,
            _ => StatusClass::Failure,
        }
    }
}

/// Client for one environment of the legacy server.
///
/// # Example
///
/// ```rust,no_run
/// use fourd_client::{FetchOptions, LegacyConfig, LegacyContext};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = LegacyConfig::default().with_environment("live", "http://erp.local:8080");
/// let ctx = LegacyContext::new(config)?;
/// let client = ctx.client("live")?;
///
/// let invoices = client
///     .fetch_table("Invoices", &FetchOptions::new().new_data_only(true))
///     .await?;
/// println!("{} invoices", invoices.len());
/// # Ok(())
/// # }
/// ```
pub struct LegacyClient {
    environment: String,
    endpoint: String,
    pool: Arc<SessionPool>,
    transport: Arc<dyn Transport>,
    breaker: Arc<SessionLimitBreaker>,
    policy: RetryPolicy,
    timeout: Duration,
    pagination: PaginationConfig,
    reauth_on_not_found: bool,
}

impl LegacyClient {
    /// Create a client for `environment`, sharing the pool's sessions.
    pub fn new(pool: Arc<SessionPool>, environment: impl Into<String>) -> Result<Self> {
        let environment = environment.into();
        let config = pool.config();
        let endpoint = config.endpoint_for(&environment)?;
        let policy = config.retry_policy()?;
        let timeout = config.timeout();
        let pagination = config.pagination.clone();
        let reauth_on_not_found = config.reauth_on_not_found;

        Ok(Self {
            environment,
            endpoint,
            transport: pool.transport().clone(),
            breaker: pool.breaker().clone(),
            policy,
            timeout,
            pagination,
            reauth_on_not_found,
            pool,
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // ==================== Table API ====================

    /// Fetch rows of a table, following pagination when enabled.
    pub async fn fetch_table(&self, table_name: &str, options: &FetchOptions) -> Result<Table> {
        let page_size = options.top.unwrap_or(self.pagination.page_size);
        let mut skip = options.skip;

        let first = self.fetch_page(table_name, options, page_size, skip).await?;
        let mut last_len = first.entities.len();
        let mut table = Table {
            table_name: table_name.to_string(),
            records: first.entities,
            total_count: first.count,
            metadata: first.metadata,
        };

        if self.pagination.enabled && page_size > 0 {
            while last_len >= page_size as usize
                && u64::from(skip) + (last_len as u64) < table.total_count
            {
                skip += last_len as u32;
                let page = self.fetch_page(table_name, options, page_size, skip).await?;
                last_len = page.entities.len();
                debug!(
                    table = table_name,
                    skip,
                    received = last_len,
                    total = table.total_count,
                    "Fetched page"
                );
                if last_len == 0 {
                    break;
                }
                table.records.extend(page.entities);
            }
        }

        debug!(
            environment = %self.environment,
            table = table_name,
            records = table.records.len(),
            "Fetched table"
        );
        Ok(table)
    }

    /// Like [`fetch_table`](Self::fetch_table), but an unreachable server
    /// yields an empty table instead of an error.
    pub async fn fetch_table_or_empty(&self, table_name: &str, options: &FetchOptions) -> Result<Table> {
        match self.fetch_table(table_name, options).await {
            Err(ClientError::ServerUnavailable(reason)) => {
                warn!(
                    environment = %self.environment,
                    table = table_name,
                    reason = %reason,
                    "Legacy server unavailable, returning no rows"
                );
                Ok(Table::empty(table_name))
            }
            other => other,
        }
    }

    async fn fetch_page(
        &self,
        table_name: &str,
        options: &FetchOptions,
        top: u32,
        skip: u32,
    ) -> Result<Envelope> {
        let mut query = vec![
            ("$top".to_string(), top.to_string()),
            ("$skip".to_string(), skip.to_string()),
        ];
        if options.new_data_only {
            query.push(("new_data_only".to_string(), "true".to_string()));
        }
        if let Some(date) = options.date_created_start {
            query.push(("date_created_start".to_string(), date.format("%Y-%m-%d").to_string()));
        }
        if let Some(filter) = &options.filter_query {
            query.push(("$filter".to_string(), filter.clone()));
        }

        let path = urlencoding::encode(table_name).into_owned();
        let response = self
            .make_request(Method::Get, &path, &query, None, &[])
            .await?;
        Envelope::parse(&response.body)
    }

    // ==================== Record API ====================

    /// Fetch one record as a JSON object.
    pub async fn fetch_record(&self, table_name: &str, record_id: &str) -> Result<Map<String, Value>> {
        let path = format!(
            "{}/{}",
            urlencoding::encode(table_name),
            urlencoding::encode(record_id)
        );

        let response = self.make_request(Method::Get, &path, &[], None, &[]).await?;
        match serde_json::from_str(&response.body)? {
            Value::Object(record) => Ok(record),
            other => Err(ClientError::Data(format!(
                "record {}/{} is not an object: {}",
                table_name, record_id, other
            ))),
        }
    }

    /// Write one field. Returns true iff the server answered 200.
    pub async fn push_field(
        &self,
        table_name: &str,
        record_id: &str,
        field_name: &str,
        field_value: Value,
    ) -> Result<bool> {
        let path = format!(
            "{}/{}/{}",
            urlencoding::encode(table_name),
            urlencoding::encode(record_id),
            urlencoding::encode(field_name)
        );
        let body = json!({ field_name: field_value });

        let response = self
            .make_request(Method::Put, &path, &[], Some(body), &[])
            .await?;

        debug!(
            environment = %self.environment,
            table = table_name,
            record = record_id,
            field = field_name,
            status = response.status,
            "Pushed field"
        );
        Ok(response.status == 200)
    }

    // ==================== Helper Methods ====================

    /// Send an authenticated request to `{endpoint}/{path}`.
    ///
    /// Transport failures are retried with backoff. A stale session is
    /// re-established and the request retried, up to `max_retries` times.
    /// Requests rejected on the same cookie share one re-login.
    /// A 402 trips the session-limit breaker and is never retried.
    pub async fn make_request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
        headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        self.breaker.check()?;

        let session = self.pool.get_session(&self.environment)?;
        let url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        let mut reauth_attempts = 0;

        loop {
            let cookie = session.get_cookie().await?;

            let mut request = HttpRequest::new(method, url.clone())
                .with_timeout(self.timeout)
                .with_header("Cookie", format!("{}={}", SESSION_COOKIE_NAME, cookie));
            request.query = query.to_vec();
            request.headers.extend(headers.iter().cloned());
            request.body = body.clone();

            let response = self
                .policy
                .run(
                    || self.transport.send(request.clone()),
                    |_: &TransportError| true,
                )
                .await?;

            match StatusClass::of(response.status, self.reauth_on_not_found) {
                StatusClass::Success => return Ok(response),
                StatusClass::SessionLimit => {
                    self.breaker.trip();
                    return Err(ClientError::SessionLimit {
                        body: response.body,
                    });
                }
                StatusClass::StaleSession if reauth_attempts < self.policy.max_retries => {
                    reauth_attempts += 1;
                    warn!(
                        environment = %self.environment,
                        method = method.as_str(),
                        url = %url,
                        status = response.status,
                        attempt = reauth_attempts,
                        "Session rejected, re-authenticating"
                    );
                    session.replace_if_stale(&cookie).await?;
                }
                StatusClass::StaleSession | StatusClass::Failure => {
                    return Err(ClientError::Response {
                        status: response.status,
                        body: response.body,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(StatusClass::of(200, true), StatusClass::Success);
        assert_eq!(StatusClass::of(204, true), StatusClass::Success);
        assert_eq!(StatusClass::of(401, true), StatusClass::StaleSession);
        assert_eq!(StatusClass::of(403, false), StatusClass::StaleSession);
        assert_eq!(StatusClass::of(404, true), StatusClass::StaleSession);
        assert_eq!(StatusClass::of(404, false), StatusClass::Failure);
        assert_eq!(StatusClass::of(402, true), StatusClass::SessionLimit);
        assert_eq!(StatusClass::of(500, true), StatusClass::Failure);
        assert_eq!(StatusClass::of(302, true), StatusClass::Failure);
    }
}
