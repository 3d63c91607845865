//! Consumer dispatch across a mixed set of portals.

use std::sync::Arc;

use portico::{
    CallError, Consumer, ErrorBody, Function, FunctionPortal, HttpPortal, HttpPortalConfig,
    LocalPortal, NetworkPortal, TestingPortal,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn consumer_routes_each_scheme_to_its_owning_portal() {
    init_tracing();

    let local = Arc::new(LocalPortal::new());
    let local_addr = local
        .apply(Function::from_fn("upper", |p| async move {
            let s = p.as_str().unwrap_or_default().to_uppercase();
            Ok(json!(s))
        }))
        .await
        .unwrap();

    let testing = Arc::new(TestingPortal::new());
    testing.mock_value("lookup", json!({"hit": true}));

    let http = Arc::new(HttpPortal::new(HttpPortalConfig::default()));
    http.start().await.unwrap();
    let http_addr = http
        .apply(Function::from_fn("echo", |p| async move { Ok(p) }))
        .await
        .unwrap();

    let consumer = Consumer::new();
    consumer.register_portal(local.clone());
    consumer.register_portal(testing.clone());
    consumer.register_portal(http.clone());
    assert_eq!(consumer.portals(), vec!["http", "https", "local", "test"]);

    // local:// dispatches in-process.
    let result = consumer.call_at(&local_addr.to_string(), json!("abc")).await.unwrap();
    assert_eq!(result, json!("ABC"));

    // test:// dispatches to the testing portal exactly once.
    let result = consumer
        .call_at("test://mock/lookup", json!({"id": 1}))
        .await
        .unwrap();
    assert_eq!(result, json!({"hit": true}));
    assert!(testing.verify("lookup", 1));

    // http:// goes over the wire to the portal's own listener and back.
    let result = consumer
        .call_at(&http_addr.to_string(), json!({"n": 5}))
        .await
        .unwrap();
    assert_eq!(result, json!({"n": 5}));

    // No portal owns this scheme.
    match consumer.call_at("ftp://host/file", json!(null)).await {
        Err(CallError::NoPortal { scheme }) => assert_eq!(scheme, "ftp"),
        other => panic!("expected NoPortal, got {other:?}"),
    }

    http.close().await.unwrap();
}

#[tokio::test]
async fn handler_errors_cross_the_http_wire_as_function_errors() {
    init_tracing();

    let http = Arc::new(HttpPortal::new(HttpPortalConfig::default()));
    http.start().await.unwrap();
    http.apply(Function::from_fn("reject", |_| async move {
        Err(CallError::Function(ErrorBody::new(409, "already exists")))
    }))
    .await
    .unwrap();
    let listen = http.listen_address().unwrap();

    // Call through a second portal so the request really crosses the wire.
    let remote = HttpPortal::new(HttpPortalConfig::default());
    let consumer = Consumer::new();
    consumer.register_portal(Arc::new(remote));

    match consumer
        .call_at(&format!("http://{listen}/call/reject"), json!(null))
        .await
    {
        Err(CallError::Client { status, body }) => {
            assert_eq!(status, 409);
            assert!(body.contains("already exists"));
        }
        other => panic!("expected Client error, got {other:?}"),
    }

    http.close().await.unwrap();
}
