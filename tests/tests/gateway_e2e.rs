//! End-to-end gateway tests over real sockets.
//!
//! The app is served on an ephemeral port and driven with a
//! tokio-tungstenite client, so the handshake path (auth, rate limit,
//! upgrade) and the connection loop are both exercised as in production.

use futures_util::SinkExt;
use std::time::Duration;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use uuid::Uuid;

use event_store::BehaviorStore;
use gateway::GatewayConfig;
use integration_tests::fixtures;
use integration_tests::setup::{collect_acks, next_json, ws_connect, TestContext};
use tracker_core::{EventFilter, SessionStatus};

fn assert_rejected_with(result: Result<impl Sized, WsError>, status: u16) {
    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), status),
        Err(other) => panic!("expected HTTP {} rejection, got {:?}", status, other),
        Ok(_) => panic!("expected HTTP {} rejection, got an open socket", status),
    }
}

#[tokio::test]
async fn missing_token_is_rejected_with_401() {
    let ctx = TestContext::new();
    let addr = ctx.serve().await;

    assert_rejected_with(ws_connect(addr, None).await, 401);
}

#[tokio::test]
async fn malformed_token_is_rejected_with_401() {
    let ctx = TestContext::new();
    let addr = ctx.serve().await;

    // too short for the token grammar
    assert_rejected_with(ws_connect(addr, Some("short")).await, 401);
}

#[tokio::test]
async fn permissive_mode_accepts_anonymous_connections() {
    let ctx = TestContext::with_gateway_config(GatewayConfig {
        permissive: true,
        ..GatewayConfig::default()
    });
    let addr = ctx.serve().await;

    let mut ws = ws_connect(addr, None).await.expect("anonymous connect");
    let connected = next_json(&mut ws).await;
    assert_eq!(connected["event"], "user:connected");
    assert!(connected["userId"].is_null());
}

#[tokio::test]
async fn events_are_acked_in_order_and_update_the_session() {
    let ctx = TestContext::new();
    let addr = ctx.serve().await;

    let mut ws = ws_connect(addr, Some(&fixtures::token()))
        .await
        .expect("connect");
    let connected = next_json(&mut ws).await;
    assert_eq!(connected["event"], "user:connected");
    let session_id: Uuid = connected["sessionId"]
        .as_str()
        .expect("sessionId")
        .parse()
        .expect("uuid");

    ws.send(Message::Text(fixtures::page_view_frame("m-1", "/home")))
        .await
        .unwrap();
    ws.send(Message::Text(fixtures::click_frame("m-2", "/home", 10.0, 20.0)))
        .await
        .unwrap();
    ws.send(Message::Text(fixtures::click_frame("m-3", "/home", 30.0, 40.0)))
        .await
        .unwrap();

    let acks = collect_acks(&mut ws, 3).await;
    for (i, ack) in acks.iter().enumerate() {
        assert_eq!(ack["id"], format!("m-{}", i + 1), "acks preserve send order");
        assert_eq!(ack["success"], true);
        assert!(ack["eventId"].is_string());
    }

    ws.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(ctx.memory().event_count(), 3);
    let session = ctx.memory().session(session_id).expect("session persisted");
    assert_eq!(session.status, SessionStatus::Ended);
    assert_eq!(session.interactions, 3);
    assert_eq!(session.page_views, 1);
    assert!(session.duration_ms.is_some());

    // events carry the session's identity enrichment
    let page = ctx
        .memory()
        .list_events(EventFilter::default())
        .await
        .unwrap();
    assert!(page.items.iter().all(|e| e.session_id == session_id));
}

#[tokio::test]
async fn oversized_frame_is_nacked_with_valid_002() {
    let ctx = TestContext::new();
    let addr = ctx.serve().await;

    let mut ws = ws_connect(addr, Some(&fixtures::token()))
        .await
        .expect("connect");
    next_json(&mut ws).await; // user:connected

    ws.send(Message::Text("a".repeat(33_000))).await.unwrap();
    let ack = collect_acks(&mut ws, 1).await.remove(0);
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "VALID_002");
    assert_eq!(ctx.memory().event_count(), 0);
}

#[tokio::test]
async fn malformed_frame_is_nacked_with_valid_001() {
    let ctx = TestContext::new();
    let addr = ctx.serve().await;

    let mut ws = ws_connect(addr, Some(&fixtures::token()))
        .await
        .expect("connect");
    next_json(&mut ws).await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let ack = collect_acks(&mut ws, 1).await.remove(0);
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "VALID_001");

    // the connection survives a bad frame
    ws.send(Message::Text(fixtures::page_view_frame("m-1", "/")))
        .await
        .unwrap();
    let ack = collect_acks(&mut ws, 1).await.remove(0);
    assert_eq!(ack["success"], true);
}

#[tokio::test]
async fn store_failure_fails_the_ack_only() {
    let ctx = TestContext::new();
    let addr = ctx.serve().await;
    ctx.set_store_failure(true);

    let mut ws = ws_connect(addr, Some(&fixtures::token()))
        .await
        .expect("connect");
    let connected = next_json(&mut ws).await;
    let session_id: Uuid = connected["sessionId"].as_str().unwrap().parse().unwrap();

    ws.send(Message::Text(fixtures::click_frame("m-1", "/", 1.0, 2.0)))
        .await
        .unwrap();
    let ack = collect_acks(&mut ws, 1).await.remove(0);
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "DB_001");

    // unacknowledged events never touch the session counters
    assert_eq!(ctx.memory().event_count(), 0);
    assert_eq!(ctx.memory().session(session_id).unwrap().interactions, 0);

    // recovery: the same connection acks once the store is back
    ctx.set_store_failure(false);
    ws.send(Message::Text(fixtures::click_frame("m-2", "/", 1.0, 2.0)))
        .await
        .unwrap();
    let ack = collect_acks(&mut ws, 1).await.remove(0);
    assert_eq!(ack["success"], true);
    assert_eq!(ctx.memory().event_count(), 1);
}

#[tokio::test]
async fn connection_rate_limit_rejects_with_429() {
    let ctx = TestContext::with_gateway_config(GatewayConfig {
        rate_max_connections: 2,
        ..GatewayConfig::default()
    });
    let addr = ctx.serve().await;
    let token = fixtures::token();

    let _first = ws_connect(addr, Some(&token)).await.expect("first");
    let _second = ws_connect(addr, Some(&token)).await.expect("second");
    assert_rejected_with(ws_connect(addr, Some(&token)).await, 429);

    // a different identity has its own window
    let _other = ws_connect(addr, Some(&fixtures::other_token()))
        .await
        .expect("other identity");
}

#[tokio::test]
async fn analytics_room_receives_fanned_out_events() {
    let ctx = TestContext::new();
    let addr = ctx.serve().await;

    let mut viewer = ws_connect(addr, Some(&fixtures::other_token()))
        .await
        .expect("viewer");
    next_json(&mut viewer).await; // user:connected

    viewer
        .send(Message::Text(fixtures::frame(
            "j-1",
            "join",
            serde_json::json!({ "room": "analytics" }),
        )))
        .await
        .unwrap();
    let ack = collect_acks(&mut viewer, 1).await.remove(0);
    assert_eq!(ack["success"], true);

    let mut emitter = ws_connect(addr, Some(&fixtures::token()))
        .await
        .expect("emitter");
    next_json(&mut emitter).await;
    emitter
        .send(Message::Text(fixtures::click_frame("m-1", "/pricing", 5.0, 6.0)))
        .await
        .unwrap();
    collect_acks(&mut emitter, 1).await;

    // the viewer sees the emitter's presence and the analytics update
    loop {
        let frame = next_json(&mut viewer).await;
        if frame["event"] == "analytics:update" {
            assert_eq!(frame["eventType"], "click");
            assert_eq!(frame["eventData"]["url"], "/pricing");
            break;
        }
    }
}
