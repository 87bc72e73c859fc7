// Integration tests for the ScrapeServer HTTP surface.

mod common;

use std::time::Duration;

use serde_json::{json, Value};

use crew_scrape_engine::error::PortalError;
use crew_scrape_engine::server::handler::{router, AppState, ScrapeServer};
use crew_scrape_engine::server::rate_limit::ClientRateLimiter;

use common::{manager_with, test_config, StubPortal};

async fn start_with(stub: std::sync::Arc<StubPortal>) -> ScrapeServer {
    let config = test_config();
    let manager = manager_with(stub, &config);
    ScrapeServer::start(&config, manager).await.unwrap()
}

#[tokio::test]
async fn test_scrape_success() {
    let stub = StubPortal::new(Duration::from_millis(5), 3);
    let server = start_with(stub.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/scrape"))
        .json(&json!({"username": "jdoe", "password": "x", "airline": "ABX"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["pilot"], "jdoe");
    assert_eq!(body["airline"], "ABX");
    assert_eq!(body["schedule"].as_array().unwrap().len(), 3);
    assert_eq!(body["schedule"][0]["route"], "CVG → MEM");
    assert!(body.to_string().find("\"x\"").is_none());
    assert_eq!(stub.calls(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_airline_rejected_without_portal_call() {
    let stub = StubPortal::new(Duration::ZERO, 3);
    let server = start_with(stub.clone()).await;

    let resp = reqwest::Client::new()
        .post(server.url("/api/scrape"))
        .json(&json!({"username": "jdoe", "password": "x", "airline": "XYZ"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"success": false, "error": "unknown airline"}));
    assert_eq!(stub.calls(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_missing_fields_and_bad_body() {
    let stub = StubPortal::new(Duration::ZERO, 3);
    let server = start_with(stub.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/scrape"))
        .json(&json!({"username": "jdoe", "password": "", "airline": "ABX"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);

    let resp = client
        .post(server.url("/api/scrape"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(stub.calls(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_portal_errors_map_to_status() {
    let stub = StubPortal::scripted(
        vec![
            (Duration::ZERO, Err(PortalError::Auth)),
            (Duration::ZERO, Err(PortalError::Parse("layout changed".into()))),
        ],
        Duration::ZERO,
        3,
    );
    let server = start_with(stub).await;
    let client = reqwest::Client::new();
    let request = json!({"username": "jdoe", "password": "x", "airline": "ATI"});

    let resp = client
        .post(server.url("/api/scrape"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "invalid username or password");

    let resp = client
        .post(server.url("/api/scrape"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    server.shutdown().await;
}

#[tokio::test]
async fn test_health_reports_counters() {
    let stub = StubPortal::new(Duration::ZERO, 2);
    let server = start_with(stub).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .post(server.url("/api/scrape"))
            .json(&json!({"username": "jdoe", "password": "x", "airline": "abx air"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let health: Value = client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["activeSessions"], 1);
    assert_eq!(health["inFlight"], 0);
    assert_eq!(health["successCount"], 1);
    assert_eq!(health["failureCount"], 0);
    assert_eq!(health["cacheHits"], 1);

    let alias = client.get(server.url("/api/health")).send().await.unwrap();
    assert_eq!(alias.status(), 200);

    server.shutdown().await;
}

#[tokio::test]
async fn test_options_preflight() {
    let server = start_with(StubPortal::new(Duration::ZERO, 1)).await;

    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, server.url("/api/scrape"))
        .header("origin", "https://crew.example")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert!(resp.headers().contains_key("access-control-allow-methods"));
    assert!(resp.bytes().await.unwrap().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_rate_limit() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let stub = StubPortal::new(Duration::ZERO, 1);
    let manager = manager_with(stub, &config);
    let server = ScrapeServer::start(&config, manager).await.unwrap();
    let client = reqwest::Client::new();
    let request = json!({"username": "jdoe", "password": "x", "airline": "ABX"});

    for _ in 0..2 {
        let resp = client
            .post(server.url("/api/scrape"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let resp = client
        .post(server.url("/api/scrape"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().contains_key("retry-after"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "too many requests");

    // Health is not rate limited.
    let health = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);

    server.shutdown().await;
}

#[tokio::test]
async fn test_dropped_connection_does_not_abort_scrape() {
    let stub = StubPortal::new(Duration::from_millis(300), 3);
    let server = start_with(stub.clone()).await;
    let request = json!({"username": "jdoe", "password": "x", "airline": "ABX"});

    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let first = impatient
        .post(server.url("/api/scrape"))
        .json(&request)
        .send()
        .await;
    assert!(first.is_err());

    let resp = reqwest::Client::new()
        .post(server.url("/api/scrape"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["schedule"].as_array().unwrap().len(), 3);
    assert_eq!(stub.calls(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_router_without_peer_address_skips_rate_limit() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    let state = AppState {
        manager: manager_with(StubPortal::new(Duration::ZERO, 1), &config),
        limiter: std::sync::Arc::new(ClientRateLimiter::new(&config.rate_limit)),
    };
    let app = router(state, Duration::from_secs(5));

    // Served without connect info, so no peer address reaches the limiter.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let request = json!({"username": "jdoe", "password": "x", "airline": "ABX"});
    for _ in 0..3 {
        let resp = client
            .post(format!("http://{}/api/scrape", addr))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}
