//! Query API tests over the in-memory store.

use axum_test::TestServer;
use uuid::Uuid;

use event_store::BehaviorStore;
use integration_tests::fixtures;
use integration_tests::setup::TestContext;
use tracker_core::{DeviceType, Session};

fn bearer() -> String {
    format!("Bearer {}", fixtures::token())
}

async fn seed_basics(ctx: &TestContext) -> (Uuid, Uuid) {
    // The gateway persists a session snapshot at connect, so seeded events
    // always have a session row behind them.
    let mut session_a_record = Session::new(Some("user-a".into()), "ua", "203.0.113.1");
    let mut session_b_record = Session::new(Some("user-b".into()), "ua", "203.0.113.2");
    let session_a = session_a_record.id;
    let session_b = session_b_record.id;
    session_a_record.record_event(tracker_core::EventKind::PageView);
    session_b_record.record_event(tracker_core::EventKind::PageView);
    ctx.memory().upsert_session(&session_a_record).await.unwrap();
    ctx.memory().upsert_session(&session_b_record).await.unwrap();
    let events = [
        fixtures::behavior_event(fixtures::page_view("/home", Some(10.0)), Some("user-a"), session_a, 5),
        fixtures::behavior_event(fixtures::page_view("/home", Some(30.0)), Some("user-a"), session_a, 4),
        fixtures::behavior_event(fixtures::page_view("/home", None), Some("user-b"), session_b, 3),
        fixtures::behavior_event(fixtures::page_view("/about", None), Some("user-b"), session_b, 2),
        fixtures::behavior_event(fixtures::click("/home", 5.0, 9.0, Some("cta")), Some("user-a"), session_a, 1),
    ];
    for event in &events {
        ctx.memory().record_event(event).await.unwrap();
    }
    (session_a, session_b)
}

#[tokio::test]
async fn endpoints_require_a_bearer_token() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server.get("/api/analytics/overview").await;
    response.assert_status_unauthorized();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "AUTH_001");
}

#[tokio::test]
async fn overview_counts_events_users_and_sessions() {
    let ctx = TestContext::new();
    seed_basics(&ctx).await;
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server
        .get("/api/analytics/overview")
        .add_header("Authorization", bearer())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["totalEvents"], 5);
    assert_eq!(data["uniqueUsers"], 2);
    assert_eq!(data["uniqueSessions"], 2);
    // page_view dominates, so it leads the per-type breakdown
    assert_eq!(data["byType"][0]["eventType"], "page_view");
    assert_eq!(data["byType"][0]["count"], 4);
}

#[tokio::test]
async fn top_pages_average_only_reported_times() {
    let ctx = TestContext::new();
    seed_basics(&ctx).await;
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server
        .get("/api/analytics/top-pages")
        .add_header("Authorization", bearer())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let pages = body["data"].as_array().unwrap();

    assert_eq!(pages[0]["url"], "/home");
    assert_eq!(pages[0]["viewCount"], 3);
    // the event with no timeOnPage is excluded from the average
    assert_eq!(pages[0]["avgTimeOnPage"], 20.0);
    assert_eq!(pages[1]["url"], "/about");
    assert!(pages[1]["avgTimeOnPage"].is_null());
}

#[tokio::test]
async fn device_shares_sum_to_one_hundred() {
    let ctx = TestContext::new();
    let session = Uuid::new_v4();
    for (i, device) in [DeviceType::Desktop, DeviceType::Desktop, DeviceType::Desktop, DeviceType::Mobile]
        .into_iter()
        .enumerate()
    {
        let event = fixtures::behavior_event_on(
            fixtures::page_view("/", None),
            Some("user-a"),
            session,
            i as i64 + 1,
            device,
        );
        ctx.memory().record_event(&event).await.unwrap();
    }
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server
        .get("/api/analytics/devices")
        .add_header("Authorization", bearer())
        .await;
    let body: serde_json::Value = response.json();
    let devices = body["data"].as_array().unwrap();

    assert_eq!(devices[0]["device"], "desktop");
    assert_eq!(devices[0]["percentage"], 75.0);
    assert_eq!(devices[1]["device"], "mobile");
    assert_eq!(devices[1]["percentage"], 25.0);
    let total: f64 = devices.iter().map(|d| d["percentage"].as_f64().unwrap()).sum();
    assert!((total - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn heatmap_requires_a_url() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server
        .get("/api/analytics/heatmap")
        .add_header("Authorization", bearer())
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn heatmap_groups_repeated_clicks() {
    let ctx = TestContext::new();
    let session = Uuid::new_v4();
    for minutes in 1..=3 {
        let event = fixtures::behavior_event(
            fixtures::click("/pricing", 100.7, 200.2, Some("buy")),
            Some("user-a"),
            session,
            minutes,
        );
        ctx.memory().record_event(&event).await.unwrap();
    }
    let one_off = fixtures::behavior_event(
        fixtures::click("/pricing", 5.0, 5.0, None),
        Some("user-a"),
        session,
        4,
    );
    ctx.memory().record_event(&one_off).await.unwrap();

    let server = TestServer::new(ctx.api_router()).unwrap();
    let response = server
        .get("/api/analytics/heatmap")
        .add_query_param("url", "/pricing")
        .add_header("Authorization", bearer())
        .await;
    let body: serde_json::Value = response.json();
    let points = body["data"].as_array().unwrap();

    assert_eq!(points.len(), 2);
    // coordinates are integer-truncated before grouping
    assert_eq!(points[0]["x"], 100);
    assert_eq!(points[0]["y"], 200);
    assert_eq!(points[0]["elementId"], "buy");
    assert_eq!(points[0]["count"], 3);
}

#[tokio::test]
async fn metrics_rejects_unknown_intervals() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server
        .get("/api/analytics/metrics")
        .add_query_param("interval", "fortnight")
        .add_header("Authorization", bearer())
        .await;
    response.assert_status_bad_request();

    let response = server
        .get("/api/analytics/metrics")
        .add_header("Authorization", bearer())
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn events_filter_by_type_and_paginate() {
    let ctx = TestContext::new();
    seed_basics(&ctx).await;
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server
        .get("/api/analytics/events")
        .add_query_param("eventType", "click")
        .add_header("Authorization", bearer())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["type"], "click");

    let response = server
        .get("/api/analytics/events")
        .add_query_param("limit", "2")
        .add_header("Authorization", bearer())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["pagination"]["total"], 5);
    assert_eq!(body["data"]["pagination"]["pages"], 3);
    // newest first
    assert_eq!(body["data"]["items"][0]["type"], "click");

    let response = server
        .get("/api/analytics/events")
        .add_query_param("eventType", "mouse_move")
        .add_header("Authorization", bearer())
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn user_detail_summarizes_one_user() {
    let ctx = TestContext::new();
    let (session_a, _) = seed_basics(&ctx).await;
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server
        .get("/api/analytics/user/user-a")
        .add_header("Authorization", bearer())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let data = &body["data"];

    assert_eq!(data["summary"]["totalEvents"], 3);
    assert_eq!(data["summary"]["totalSessions"], 1);
    assert!(data["events"]
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["sessionId"] == session_a.to_string()));
}

#[tokio::test]
async fn sessions_filter_by_status() {
    let ctx = TestContext::new();
    let mut open = Session::new(Some("user-a".into()), "ua", "203.0.113.9");
    let mut done = Session::new(Some("user-b".into()), "ua", "203.0.113.10");
    done.close();
    ctx.memory().upsert_session(&open).await.unwrap();
    ctx.memory().upsert_session(&done).await.unwrap();
    open.record_event(tracker_core::EventKind::Click);
    ctx.memory().upsert_session(&open).await.unwrap();

    let server = TestServer::new(ctx.api_router()).unwrap();
    let response = server
        .get("/api/analytics/sessions")
        .add_query_param("status", "active")
        .add_header("Authorization", bearer())
        .await;
    let body: serde_json::Value = response.json();

    assert_eq!(body["data"]["pagination"]["total"], 1);
    let item = &body["data"]["items"][0];
    assert_eq!(item["userId"], "user-a");
    // the upsert kept the latest counter snapshot
    assert_eq!(item["interactions"], 1);
}

#[tokio::test]
async fn health_reports_active_sessions_without_auth() {
    let ctx = TestContext::new();
    ctx.sessions
        .put(Session::new(Some("user-a".into()), "ua", "127.0.0.1"));
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["activeSessions"], 1);
    assert!(body["status"].is_string());
}
