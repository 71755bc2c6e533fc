//! Export endpoint tests.

use axum_test::TestServer;
use std::collections::HashSet;
use uuid::Uuid;

use event_store::BehaviorStore;
use integration_tests::fixtures;
use integration_tests::setup::TestContext;

fn bearer() -> String {
    format!("Bearer {}", fixtures::token())
}

#[tokio::test]
async fn csv_export_round_trips_every_event() {
    let ctx = TestContext::new();
    let session = Uuid::new_v4();
    let mut seeded_ids = HashSet::new();
    for minutes in 1..=4 {
        let event = fixtures::behavior_event(
            fixtures::page_view("/home", None),
            Some("user-a"),
            session,
            minutes,
        );
        seeded_ids.insert(event.id.to_string());
        ctx.memory().record_event(&event).await.unwrap();
    }

    let server = TestServer::new(ctx.api_router()).unwrap();
    let response = server
        .post("/api/analytics/export")
        .add_header("Authorization", bearer())
        .json(&serde_json::json!({ "format": "csv" }))
        .await;
    response.assert_status_ok();

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"));
    let disposition = response
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.starts_with("attachment"));

    let body = response.text();
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec![
            "eventId",
            "userId",
            "eventType",
            "eventCategory",
            "url",
            "timestamp",
            "status"
        ]
    );

    let mut exported_ids = HashSet::new();
    for record in reader.records() {
        let record = record.unwrap();
        exported_ids.insert(record[0].to_string());
        assert_eq!(&record[1], "user-a");
        assert_eq!(&record[2], "page_view");
        assert_eq!(&record[4], "/home");
        assert_eq!(&record[6], "success");
    }
    assert_eq!(exported_ids, seeded_ids);
}

#[tokio::test]
async fn json_export_honors_the_event_type_filter() {
    let ctx = TestContext::new();
    let session = Uuid::new_v4();
    let events = [
        fixtures::behavior_event(fixtures::click("/a", 1.0, 2.0, None), Some("user-a"), session, 1),
        fixtures::behavior_event(fixtures::click("/b", 3.0, 4.0, None), Some("user-a"), session, 2),
        fixtures::behavior_event(fixtures::page_view("/a", None), Some("user-a"), session, 3),
    ];
    for event in &events {
        ctx.memory().record_event(event).await.unwrap();
    }

    let server = TestServer::new(ctx.api_router()).unwrap();
    let response = server
        .post("/api/analytics/export")
        .add_header("Authorization", bearer())
        .json(&serde_json::json!({ "format": "json", "eventType": "click" }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    assert_eq!(body["success"], true);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|e| e["type"] == "click"));
}

#[tokio::test]
async fn export_requires_auth() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.api_router()).unwrap();

    let response = server
        .post("/api/analytics/export")
        .json(&serde_json::json!({ "format": "csv" }))
        .await;
    response.assert_status_unauthorized();
}
