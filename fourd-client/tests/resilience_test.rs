//! Retry, re-authentication and breaker behavior with a scripted transport

use std::sync::Arc;
use std::time::Duration;

use fourd_client::{
    ClientError, FetchOptions, HttpResponse, LegacyConfig, LegacyContext, MockTransport,
    TransportError,
};
use serde_json::json;
use tempfile::TempDir;

struct Harness {
    mock: Arc<MockTransport>,
    ctx: LegacyContext,
    _sessions: TempDir,
}

fn harness() -> Harness {
    let sessions = TempDir::new().unwrap();
    let config = LegacyConfig {
        max_retries: 3,
        retry_backoff_factor_secs: 0.1,
        session_dir: sessions.path().to_path_buf(),
        ..LegacyConfig::default()
    }
    .with_environment("live", "http://erp.local");

    let mock = Arc::new(MockTransport::new());
    let ctx = LegacyContext::with_transport(config, mock.clone());
    Harness {
        mock,
        ctx,
        _sessions: sessions,
    }
}

fn envelope(count: u64, ids: &[u64]) -> serde_json::Value {
    let entities: Vec<_> = ids.iter().map(|id| json!({"ID": id})).collect();
    json!({"__COUNT": count, "__ENTITIES": entities})
}

#[tokio::test]
async fn test_tripped_breaker_blocks_without_traffic() {
    let h = harness();
    h.ctx.breaker().set_session_limit_reached(true);

    let client = h.ctx.client("live").unwrap();
    let err = client.fetch_table("Invoices", &FetchOptions::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Authentication(_)));

    let session = h.ctx.pool().get_session("live").unwrap();
    assert!(matches!(session.refresh().await, Err(ClientError::Authentication(_))));

    assert_eq!(h.mock.call_count(), 0);
}

#[tokio::test]
async fn test_breaker_reset_allows_traffic_again() {
    let h = harness();
    h.ctx.breaker().trip();
    h.ctx.breaker().reset();

    h.mock
        .push_login("abc")
        .push_json(200, envelope(1, &[1]));

    let table = h
        .ctx
        .client("live")
        .unwrap()
        .fetch_table("Invoices", &FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn test_402_on_request_trips_breaker_once() {
    let h = harness();
    h.mock
        .push_login("abc")
        .push_response(HttpResponse::new(402, "Maximum sessions reached"));

    let err = h
        .ctx
        .client("live")
        .unwrap()
        .fetch_record("Customers", "1")
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(402));
    assert!(h.ctx.breaker().is_session_limit_reached());
    // login + the one failed request, no retry
    assert_eq!(h.mock.call_count(), 2);
}

#[tokio::test]
async fn test_stale_session_invalidates_and_refreshes_once() {
    let h = harness();
    h.mock
        .push_login("first")
        .push_response(HttpResponse::new(401, "session expired"))
        .push_login("second")
        .push_json(200, json!({"ID": 1}));

    let record = h
        .ctx
        .client("live")
        .unwrap()
        .fetch_record("Customers", "1")
        .await
        .unwrap();
    assert_eq!(record["ID"], 1);

    let requests = h.mock.requests();
    let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "http://erp.local/rest/$info",
            "http://erp.local/rest/Customers/1",
            "http://erp.local/rest/$info",
            "http://erp.local/rest/Customers/1",
        ]
    );
    assert_eq!(requests[1].header("Cookie"), Some("WASID4D=first"));
    assert_eq!(requests[3].header("Cookie"), Some("WASID4D=second"));
}

#[tokio::test(start_paused = true)]
async fn test_request_retries_transport_errors_with_backoff() {
    let h = harness();
    h.mock
        .push_login("abc")
        .push_error(TransportError::Other("connection reset".into()))
        .push_error(TransportError::Other("connection reset".into()))
        .push_json(200, envelope(2, &[1, 2]));

    let start = tokio::time::Instant::now();
    let table = h
        .ctx
        .client("live")
        .unwrap()
        .fetch_table("Invoices", &FetchOptions::new())
        .await
        .unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(h.mock.call_count(), 4);
    // 0.1s * 2 + 0.1s * 4
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(600));
    assert!(elapsed < Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn test_request_timeouts_become_server_unavailable() {
    let h = harness();
    h.mock.push_login("abc");
    for _ in 0..4 {
        h.mock.push_error(TransportError::Timeout("30s elapsed".into()));
    }

    let client = h.ctx.client("live").unwrap();
    let err = client.fetch_table("Invoices", &FetchOptions::new()).await.unwrap_err();

    assert!(matches!(err, ClientError::ServerUnavailable(_)));
    assert!(err.is_connection_failure());
    assert_eq!(h.mock.call_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_generic_network_failure_becomes_connection_error() {
    let h = harness();
    h.mock.push_login("abc");
    for _ in 0..4 {
        h.mock.push_error(TransportError::Other("broken pipe".into()));
    }

    let client = h.ctx.client("live").unwrap();
    let err = client.fetch_table("Invoices", &FetchOptions::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)));

    // A plain connection error is not swallowed by the lenient fetch.
    for _ in 0..4 {
        h.mock.push_error(TransportError::Other("broken pipe".into()));
    }
    let err = client.fetch_table_or_empty("Invoices", &FetchOptions::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)));
}

#[tokio::test]
async fn test_pagination_offsets() {
    let h = harness();
    h.mock
        .push_login("abc")
        .push_json(200, envelope(5, &[1, 2]))
        .push_json(200, envelope(5, &[3, 4, 5]));

    let table = h
        .ctx
        .client("live")
        .unwrap()
        .fetch_table("Invoices", &FetchOptions::new().top(2))
        .await
        .unwrap();

    assert_eq!(table.len(), 5);
    let requests = h.mock.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].query_value("$skip"), Some("0"));
    assert_eq!(requests[1].query_value("$top"), Some("2"));
    assert_eq!(requests[2].query_value("$skip"), Some("2"));
}

#[tokio::test]
async fn test_sessions_shared_across_clients() {
    let h = harness();
    h.mock
        .push_login("shared")
        .push_json(200, envelope(0, &[]))
        .push_json(200, envelope(0, &[]));

    let a = h.ctx.client("live").unwrap();
    let b = h.ctx.default_client().unwrap();
    a.fetch_table("Invoices", &FetchOptions::new()).await.unwrap();
    b.fetch_table("Orders", &FetchOptions::new()).await.unwrap();

    // one login for both
    assert_eq!(h.mock.call_count(), 3);
}
