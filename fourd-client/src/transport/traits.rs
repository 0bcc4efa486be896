//! Core types for the HTTP transport seam.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Network-level failure, before any HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Request timed out
    #[error("Timed out: {0}")]
    Timeout(String),

    /// TCP connection refused / host unreachable
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Host name did not resolve
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// Anything else the HTTP stack reported
    #[error("Request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the failure means the legacy server itself is down.
    pub fn is_server_down(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_) | TransportError::ConnectionRefused(_) | TransportError::Dns(_)
        )
    }
}

/// Core trait for HTTP transports.
///
/// The client and session manager only ever talk to the legacy server
/// through this trait, so tests can swap in [`MockTransport`](super::MockTransport).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Non-2xx statuses are *not* errors at this layer.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Query pairs, appended in order
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: Option<serde_json::Value>,
    /// Overrides the transport's default timeout
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// First query value with this name.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First header value with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response as seen by the access layer.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Cookies the HTTP stack parsed from the response (name, value)
    pub cookies: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Raw `Set-Cookie` header values.
    pub fn set_cookie_headers(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_down_classification() {
        assert!(TransportError::Timeout("30s".into()).is_server_down());
        assert!(TransportError::ConnectionRefused("127.0.0.1:1".into()).is_server_down());
        assert!(TransportError::Dns("erp.invalid".into()).is_server_down());
        assert!(!TransportError::Other("reset by peer".into()).is_server_down());
    }

    #[test]
    fn test_set_cookie_lookup_is_case_insensitive() {
        let response = HttpResponse::new(200, "{}")
            .with_header("set-cookie", "WASID4D=abc; path=/")
            .with_header("Content-Type", "application/json")
            .with_header("Set-Cookie", "other=1");

        let cookies: Vec<&str> = response.set_cookie_headers().collect();
        assert_eq!(cookies, vec!["WASID4D=abc; path=/", "other=1"]);
    }

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::get("http://erp/rest/Invoices")
            .with_query("$top", "10")
            .with_header("Cookie", "WASID4D=abc");

        assert_eq!(request.method.as_str(), "GET");
        assert_eq!(request.query_value("$top"), Some("10"));
        assert_eq!(request.header("cookie"), Some("WASID4D=abc"));
        assert_eq!(request.query_value("$skip"), None);
    }
}
