//! Client wiring tests: fake gateway plus mocked REST API
//!
//! Run with: cargo test -p integration-tests --test client_tests

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chat_client::Client;
use chat_gateway::{handler_fn, ConnectionState, DispatchEvent, GatewayEventType};
use chat_rest::{RestRequest, Route};
use integration_tests::{test_client_config, FakeGateway, STEP_TIMEOUT};
use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<dyn chat_gateway::EventHandler>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = handler_fn(move |event: DispatchEvent| {
        let sink = Arc::clone(&sink);
        async move { sink.lock().push(event.name) }
    });
    (seen, handler)
}

async fn wait_until(mut check: impl FnMut() -> bool) -> Result<()> {
    tokio::time::timeout(STEP_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_client_bootstraps_and_routes_events() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": gateway.url()})))
        .expect(1)
        .mount(&rest)
        .await;

    let mut config = test_client_config();
    config.rest.api_base = rest.uri();

    let (messages, handler) = recorder();
    let client = Client::builder(config)
        .on(GatewayEventType::MessageCreate, handler)?
        .build()
        .await?;
    let mut signals = client.take_supervisor_receiver().unwrap();

    let connect = tokio::spawn({
        let gateway = client.gateway().clone();
        async move { gateway.connect().await }
    });
    let mut conn = gateway.accept().await?;
    conn.complete_identify("session-1").await?;
    connect.await??;

    conn.dispatch("GUILD_CREATE", 2, json!({"id": "1"})).await?;
    conn.dispatch("MESSAGE_CREATE", 3, json!({"content": "a"})).await?;
    wait_until(|| messages.lock().len() == 1).await?;
    assert_eq!(*messages.lock(), ["MESSAGE_CREATE"]);

    client.shutdown().await;
    assert_eq!(client.gateway().state(), ConnectionState::Terminated);
    assert_eq!(signals.recv().await.unwrap().exit_code(), 0);
    Ok(())
}

#[tokio::test]
async fn test_events_deferred_while_rest_in_flight() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "1"}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&rest)
        .await;

    let mut config = test_client_config();
    config.rest.api_base = rest.uri();
    config.dispatch.defer_while_rest = true;

    let (seen, handler) = recorder();
    let client = Arc::new(
        Client::builder(config)
            .gateway_url(gateway.url())
            .on_any(handler)
            .build()
            .await?,
    );

    let connect = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.connect().await }
    });
    let mut conn = gateway.accept().await?;
    conn.complete_identify("session-1").await?;
    connect.await??;
    wait_until(|| seen.lock().len() == 1).await?;

    let request = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.rest().execute(RestRequest::new(Route::get("/users/@me"))).await }
    });
    wait_until(|| !client.rest().in_flight().is_idle()).await?;

    conn.dispatch("MESSAGE_CREATE", 2, json!({})).await?;
    conn.dispatch("MESSAGE_UPDATE", 3, json!({})).await?;
    wait_until(|| client.dispatch().len() == 2).await?;
    assert_eq!(*seen.lock(), ["READY"]);

    let response = request.await??;
    assert!(response.is_success());
    wait_until(|| seen.lock().len() == 3).await?;
    assert_eq!(*seen.lock(), ["READY", "MESSAGE_CREATE", "MESSAGE_UPDATE"]);
    assert!(client.dispatch().is_empty());

    client.shutdown().await;
    Ok(())
}
