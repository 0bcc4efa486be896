//! reqwest-backed transport.

use async_trait::async_trait;
use reqwest::Client;
use std::error::Error as StdError;
use std::time::Duration;

use super::traits::*;
use crate::error::{ClientError, Result};

/// Production transport.
///
/// No cookie store is attached to the underlying client: the session
/// manager owns the session cookie and sets the `Cookie` header itself.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a default per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(classify)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let body = response.text().await.map_err(classify)?;

        Ok(HttpResponse {
            status,
            headers,
            cookies,
            body,
        })
    }
}

/// Map a reqwest failure onto the transport taxonomy.
fn classify(err: reqwest::Error) -> TransportError {
    let message = err.to_string();

    if err.is_timeout() {
        return TransportError::Timeout(message);
    }

    if err.is_connect() {
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string().to_ascii_lowercase();
            if text.contains("dns error") || text.contains("failed to lookup address") {
                return TransportError::Dns(message);
            }
            source = cause.source();
        }
        return TransportError::ConnectionRefused(message);
    }

    TransportError::Other(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_connection_is_server_down() {
        // Bind then drop to get a loopback port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let err = transport
            .send(HttpRequest::get(format!("http://127.0.0.1:{}/rest/$info", port)))
            .await
            .unwrap_err();

        assert!(err.is_server_down(), "unexpected classification: {:?}", err);
    }
}
