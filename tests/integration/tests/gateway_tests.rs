//! Gateway session tests against the in-process fake gateway
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use anyhow::Result;
use chat_common::SupervisorSignal;
use chat_core::Intents;
use chat_gateway::protocol::{GatewayMessage, OpCode, PresenceUpdatePayload};
use chat_gateway::{ConnectionState, GatewayError, SessionNotice};
use integration_tests::{
    refused_url, session_for_url, test_gateway_config, test_session, wait_for_state, FakeGateway,
    StalledListener, QUIET_INTERVAL, STEP_TIMEOUT,
};
use serde_json::json;

async fn next_signal(rx: &mut chat_common::SupervisorReceiver) -> Result<SupervisorSignal> {
    let signal = tokio::time::timeout(STEP_TIMEOUT, rx.recv()).await?;
    signal.ok_or_else(|| anyhow::anyhow!("supervisor channel closed"))
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_identify_reaches_connected() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, mut events, mut signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    let mut conn = gateway.accept().await?;
    let identify = conn.complete_identify("session-1").await?;
    assert_eq!(identify.token, "test-token");
    assert_eq!(identify.intents, Intents::DEFAULT);
    assert!(!identify.compress);

    connect.await??;
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.session_id().as_deref(), Some("session-1"));

    let ready = events.recv().await.unwrap();
    assert_eq!(ready.name, "READY");
    assert_eq!(ready.sequence, Some(1));

    conn.dispatch("MESSAGE_CREATE", 2, json!({"content": "hi"})).await?;
    let message = tokio::time::timeout(STEP_TIMEOUT, events.recv()).await?.unwrap();
    assert_eq!(message.name, "MESSAGE_CREATE");
    assert_eq!(message.data["content"], "hi");
    assert_eq!(session.sequence(), Some(2));

    session.terminate().await;
    assert_eq!(conn.expect_close().await?, Some(1000));
    assert_eq!(next_signal(&mut signals).await?.exit_code(), 0);
    assert!(matches!(session.connect().await, Err(GatewayError::Terminated)));
    Ok(())
}

#[tokio::test]
async fn test_dispatch_before_hello_is_protocol_violation() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, _events, mut signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    // Both the first attempt and the retry get READY where Hello belongs
    for _ in 0..2 {
        let mut conn = gateway.accept().await?;
        conn.ready("session-1", 1).await?;
        assert_eq!(conn.expect_close().await?, Some(4901));
    }

    let err = connect.await?.unwrap_err();
    assert!(matches!(err, GatewayError::ProtocolViolation { expected: "Hello", .. }));
    assert_eq!(next_signal(&mut signals).await?.exit_code(), 1);
    assert_eq!(session.state(), ConnectionState::Terminated);
    Ok(())
}

#[tokio::test]
async fn test_stalled_upgrade_times_out_and_escalates() -> Result<()> {
    let listener = StalledListener::start().await?;
    let config = chat_common::GatewayConfig {
        connect_timeout: Duration::from_millis(100),
        ..test_gateway_config()
    };
    let (session, _events, mut signals) = session_for_url(listener.url(), config);

    let err = tokio::time::timeout(STEP_TIMEOUT, session.connect()).await?.unwrap_err();
    assert!(matches!(err, GatewayError::ConnectTimeout));

    // One attempt plus exactly one retry
    assert_eq!(listener.accepted(), 2);
    assert!(matches!(
        next_signal(&mut signals).await?,
        SupervisorSignal::Restart { .. }
    ));
    assert_eq!(session.state(), ConnectionState::Terminated);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(listener.accepted(), 2);
    Ok(())
}

#[tokio::test]
async fn test_refused_socket_escalates_after_retry() -> Result<()> {
    let (session, _events, mut signals) = session_for_url(refused_url().await?, test_gateway_config());

    let err = tokio::time::timeout(STEP_TIMEOUT, session.connect()).await?.unwrap_err();
    assert!(matches!(err, GatewayError::Connection(_)));
    assert_eq!(next_signal(&mut signals).await?.exit_code(), 1);
    assert_eq!(session.state(), ConnectionState::Terminated);
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_ack_is_retried_once() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, _events, _signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    let mut first = gateway.accept().await?;
    first.hello(QUIET_INTERVAL).await?;
    first.expect_identify().await?;
    first.send(&GatewayMessage::heartbeat_ack()).await?;
    assert_eq!(first.expect_close().await?, Some(4901));

    let mut second = gateway.accept().await?;
    second.complete_identify("session-2").await?;

    connect.await??;
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.session_id().as_deref(), Some("session-2"));
    Ok(())
}

#[tokio::test]
async fn test_fatal_close_during_handshake_escalates() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, _events, mut signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    let mut conn = gateway.accept().await?;
    conn.hello(QUIET_INTERVAL).await?;
    conn.expect_identify().await?;
    conn.close(4004, "Authentication failed").await?;

    let err = connect.await?.unwrap_err();
    assert!(matches!(err, GatewayError::Closed { code: Some(4004), .. }));
    assert!(err.is_fatal());

    let signal = next_signal(&mut signals).await?;
    assert!(matches!(signal, SupervisorSignal::Restart { .. }));
    assert_eq!(session.state(), ConnectionState::Terminated);

    // No retry after a fatal close
    gateway.expect_no_connection(Duration::from_millis(100)).await?;
    Ok(())
}

// ============================================================================
// Heartbeat and resume
// ============================================================================

#[tokio::test]
async fn test_heartbeat_timeout_resumes_exactly_once() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, mut events, _signals) = test_session(&gateway);
    let mut notices = session.subscribe();

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    let mut first = gateway.accept().await?;
    first.hello(100).await?;
    first.expect_identify().await?;
    first.ready("session-1", 1).await?;
    connect.await??;
    first.dispatch("GUILD_CREATE", 2, json!({"id": "1"})).await?;

    // First beat carries the latest sequence; never acknowledge it
    assert_eq!(first.expect_heartbeat().await?, Some(2));
    assert_eq!(first.expect_close().await?, Some(4902));

    let mut second = gateway.accept().await?;
    second.hello(QUIET_INTERVAL).await?;
    let resume = second.expect_resume().await?;
    assert_eq!(resume.session_id, "session-1");
    assert_eq!(resume.seq, Some(2));

    // Replay of the missed event, then RESUMED
    second.dispatch("MESSAGE_CREATE", 3, json!({})).await?;
    second.resumed(4).await?;
    wait_for_state(&session, ConnectionState::Connected).await?;
    assert_eq!(session.sequence(), Some(4));

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name);
    }
    assert_eq!(names, ["READY", "GUILD_CREATE", "MESSAGE_CREATE", "RESUMED"]);

    let mut timeouts = 0;
    let mut reconnects = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        match notice {
            SessionNotice::HeartbeatTimedOut => timeouts += 1,
            SessionNotice::Reconnecting { resume } => reconnects.push(resume),
            _ => {}
        }
    }
    assert_eq!(timeouts, 1);
    assert_eq!(reconnects, [true]);

    gateway.expect_no_connection(Duration::from_millis(200)).await?;
    Ok(())
}

#[tokio::test]
async fn test_acknowledged_heartbeats_keep_connection() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, _events, _signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    let mut conn = gateway.accept().await?;
    conn.hello(50).await?;
    conn.expect_identify().await?;
    conn.ready("session-1", 1).await?;
    connect.await??;

    for _ in 0..3 {
        assert_eq!(conn.expect_heartbeat().await?, Some(1));
        conn.send(&GatewayMessage::heartbeat_ack()).await?;
    }
    assert!(session.latency().is_some());
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.generation(), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_server_heartbeat_request_answered_immediately() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, _events, _signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });
    let mut conn = gateway.accept().await?;
    conn.complete_identify("session-1").await?;
    connect.await??;

    conn.send(&GatewayMessage::heartbeat(None)).await?;
    assert_eq!(conn.expect_heartbeat().await?, Some(1));
    Ok(())
}

#[tokio::test]
async fn test_reconnect_request_resumes_on_resume_url() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let mut resume_gateway = FakeGateway::start().await?;
    let (session, _events, _signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    let mut conn = gateway.accept().await?;
    conn.hello(QUIET_INTERVAL).await?;
    conn.expect_identify().await?;
    let ready = json!({
        "session_id": "session-1",
        "resume_gateway_url": resume_gateway.url(),
    });
    conn.dispatch("READY", 1, ready).await?;
    connect.await??;
    assert_eq!(session.resume_url(), Some(resume_gateway.url()));

    conn.send(&GatewayMessage::reconnect()).await?;
    assert_eq!(conn.expect_close().await?, Some(4900));

    let mut resumed = resume_gateway.accept().await?;
    resumed.hello(QUIET_INTERVAL).await?;
    assert_eq!(resumed.expect_resume().await?.session_id, "session-1");
    resumed.resumed(2).await?;

    wait_for_state(&session, ConnectionState::Connected).await?;
    assert_eq!(session.generation(), Some(2));
    gateway.expect_no_connection(Duration::from_millis(100)).await?;
    Ok(())
}

#[tokio::test]
async fn test_resumable_invalid_session_resends_resume() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, _events, _signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });
    let mut conn = gateway.accept().await?;
    conn.complete_identify("session-1").await?;
    connect.await??;

    conn.send(&GatewayMessage::reconnect()).await?;
    assert_eq!(conn.expect_close().await?, Some(4900));

    let mut resuming = gateway.accept().await?;
    resuming.hello(QUIET_INTERVAL).await?;
    assert_eq!(resuming.expect_resume().await?.session_id, "session-1");
    resuming.send(&GatewayMessage::invalid_session(true)).await?;

    // Same socket, second Resume rather than Identify
    let again = resuming.expect_resume().await?;
    assert_eq!(again.session_id, "session-1");
    assert_eq!(again.seq, Some(1));
    resuming.resumed(2).await?;

    wait_for_state(&session, ConnectionState::Connected).await?;
    assert_eq!(session.session_id().as_deref(), Some("session-1"));
    gateway.expect_no_connection(Duration::from_millis(100)).await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_session_falls_back_to_identify() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, _events, _signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });
    let mut conn = gateway.accept().await?;
    conn.complete_identify("session-1").await?;
    connect.await??;

    conn.send(&GatewayMessage::invalid_session(false)).await?;
    conn.expect_close().await?;

    let mut fresh = gateway.accept().await?;
    fresh.complete_identify("session-2").await?;
    wait_for_state(&session, ConnectionState::Connected).await?;
    assert_eq!(session.session_id().as_deref(), Some("session-2"));
    assert_eq!(session.sequence(), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_fatal_close_while_connected_escalates() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, _events, mut signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });
    let mut conn = gateway.accept().await?;
    conn.complete_identify("session-1").await?;
    connect.await??;

    conn.close(4014, "Disallowed intent(s)").await?;
    wait_for_state(&session, ConnectionState::Terminated).await?;

    let signal = next_signal(&mut signals).await?;
    assert_eq!(signal.exit_code(), 1);
    assert!(signal.reason().contains("4014"));
    gateway.expect_no_connection(Duration::from_millis(100)).await?;
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_presence_update_sent_while_connected() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let (session, _events, _signals) = test_session(&gateway);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });
    let mut conn = gateway.accept().await?;
    conn.complete_identify("session-1").await?;
    connect.await??;

    session.update_presence(PresenceUpdatePayload::status("idle"))?;
    let sent = conn.recv().await?;
    assert_eq!(sent.op, OpCode::PresenceUpdate);
    assert_eq!(sent.d.unwrap()["status"], "idle");

    let err = session
        .update_presence(PresenceUpdatePayload::status("busy"))
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidPayload(_)));
    Ok(())
}
