//! REST client tests against a mocked API
//!
//! Run with: cargo test -p integration-tests --test rest_tests

use std::time::{Duration, Instant};

use anyhow::Result;
use chat_common::{RestConfig, Supervisor, SupervisorSignal};
use chat_core::InFlight;
use chat_rest::{RestClient, RestError, RestRequest, Route};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, max_retries: u32) -> Result<(RestClient, chat_common::SupervisorReceiver)> {
    let (supervisor, rx) = Supervisor::channel();
    let config = RestConfig {
        api_base: server.uri(),
        max_retries,
        ..RestConfig::default()
    };
    Ok((RestClient::new(config, "test-token", InFlight::new(), supervisor)?, rx))
}

#[tokio::test]
async fn test_global_429_pauses_every_route() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "message": "You are being rate limited.",
            "retry_after": 0.3,
            "global": true,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
        .mount(&server)
        .await;

    let (client, _rx) = client(&server, 0)?;
    let err = client
        .execute(RestRequest::new(Route::post("/channels/1/messages")).json(json!({"content": "x"})))
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::RateLimited { global: true, .. }));

    let start = Instant::now();
    let response = client.execute(RestRequest::new(Route::get("/users/@me"))).await?;
    assert!(response.is_success());
    assert!(start.elapsed() >= Duration::from_millis(250));
    assert!(client.limiter().global_lockout().is_none());
    Ok(())
}

#[tokio::test]
async fn test_bucket_headers_are_tracked() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/123456789012345678/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Bucket", "abcd")
                .insert_header("X-RateLimit-Limit", "5")
                .insert_header("X-RateLimit-Remaining", "4")
                .insert_header("X-RateLimit-Reset-After", "1.0")
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let (client, _rx) = client(&server, 0)?;
    let route = Route::get("/channels/123456789012345678/messages");
    client.execute(RestRequest::new(route.clone())).await?;

    assert_eq!(client.limiter().bucket_id(&route), "abcd:123456789012345678");
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_restarts_and_missing_routes_stick() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "401: Unauthorized"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels/9"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let (client, mut rx) = client(&server, 0)?;

    let err = client.execute(RestRequest::new(Route::get("/users/@me"))).await.unwrap_err();
    assert!(matches!(err, RestError::Unauthorized { status: 401, .. }));
    assert!(matches!(rx.recv().await, Some(SupervisorSignal::Restart { .. })));

    let route = Route::get("/channels/9");
    for _ in 0..2 {
        let err = client.execute(RestRequest::new(route.clone())).await.unwrap_err();
        assert!(matches!(err, RestError::NotFound { .. }));
    }
    assert!(client.is_missing(&route));

    // Third call never reaches the server
    let err = client.execute(RestRequest::new(route)).await.unwrap_err();
    assert!(matches!(err, RestError::MissingRoute { .. }));
    Ok(())
}
