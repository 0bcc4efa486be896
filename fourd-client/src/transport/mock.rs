//! Mock transport for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::traits::*;

type Scripted = Result<HttpResponse, TransportError>;

/// Mock transport for testing.
///
/// Replays a scripted queue of responses and transport errors in order and
/// records every request it receives.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
    call_count: AtomicU32,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply by `latency`, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a response with a raw body.
    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.push(Ok(response))
    }

    /// Queue a JSON response.
    pub fn push_json(&self, status: u16, body: serde_json::Value) -> &Self {
        self.push(Ok(HttpResponse::new(status, body.to_string())))
    }

    /// Queue a successful login carrying a `WASID4D` cookie.
    pub fn push_login(&self, cookie: &str) -> &Self {
        self.push(Ok(HttpResponse::new(200, "{}")
            .with_header("Set-Cookie", format!("WASID4D={}; path=/; HttpOnly", cookie))))
    }

    /// Queue a transport failure.
    pub fn push_error(&self, error: TransportError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, item: Scripted) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
        self
    }

    /// Number of times `send` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Scripted items not consumed yet.
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let url = request.url.clone();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other(format!("no scripted response for {}", url))))
    }
}
