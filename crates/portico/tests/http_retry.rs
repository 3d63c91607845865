//! Retry-policy integration tests against a live axum fixture.
//!
//! The fixture counts every request it receives, so the tests assert the
//! exact number of attempts the client path makes: retryable failures are
//! retried up to the budget, 4xx failures are never retried.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use portico::{
    Address, CallError, FunctionPortal, HttpEndpoint, HttpPortal, HttpPortalConfig, RetryPolicy,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Serve `POST /call/flaky` with a canned response per attempt number.
async fn start_fixture(
    respond: impl Fn(usize) -> (StatusCode, String) + Clone + Send + Sync + 'static,
) -> (SocketAddr, Arc<AtomicUsize>) {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);

    let app = Router::new().route(
        "/call/flaky",
        post(move || {
            let respond = respond.clone();
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                respond(n)
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, attempts)
}

fn portal(max_retries: u32) -> HttpPortal {
    HttpPortal::new(HttpPortalConfig {
        endpoint: HttpEndpoint::default().retry(RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(5),
        }),
        ..Default::default()
    })
}

async fn call_fixture(portal: &HttpPortal, addr: SocketAddr) -> Result<Value, CallError> {
    let address = Address::parse(&format!("http://{addr}/call/flaky")).unwrap();
    let function = portal.resolve_function(&address).await.unwrap();
    function.call(json!({"probe": true})).await
}

#[tokio::test]
async fn two_failures_then_success_uses_exactly_three_attempts() {
    let (addr, attempts) = start_fixture(|n| {
        if n < 3 {
            (StatusCode::SERVICE_UNAVAILABLE, "not yet".to_string())
        } else {
            (StatusCode::OK, json!({"attempt": n}).to_string())
        }
    })
    .await;

    let portal = portal(3);
    let result = call_fixture(&portal, addr).await.unwrap();
    assert_eq!(result, json!({"attempt": 3}));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_server_errors_exhaust_the_budget() {
    let (addr, attempts) = start_fixture(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "broken".to_string())
    })
    .await;

    let portal = portal(3);
    match call_fixture(&portal, addr).await {
        Err(CallError::Exhausted { attempts: n, last }) => {
            assert_eq!(n, 3);
            assert!(matches!(*last, CallError::Server { status: 500, .. }));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_errors_are_never_retried() {
    let (addr, attempts) = start_fixture(|_| {
        (StatusCode::UNPROCESSABLE_ENTITY, "bad params".to_string())
    })
    .await;

    let portal = portal(3);
    match call_fixture(&portal, addr).await {
        Err(CallError::Client { status, body }) => {
            assert_eq!(status, 422);
            assert_eq!(body, "bad params");
        }
        other => panic!("expected Client error, got {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_success_body_is_null_result() {
    let (addr, _) = start_fixture(|_| (StatusCode::OK, String::new())).await;

    let portal = portal(1);
    let result = call_fixture(&portal, addr).await.unwrap();
    assert_eq!(result, Value::Null);
}
