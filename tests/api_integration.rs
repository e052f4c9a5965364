//! API Integration Tests for Pulseboard
//!
//! Runs the router on a real listener and drives it over HTTP.

use std::time::Duration;

use chrono::Utc;
use pulseboard::server::{ACTOR_HEADER, AppState, create_router};
use pulseboard::storage::{AlertSeverity, NewAlert};
use pulseboard::{MetricSample, MetricType, Session, StorageBuilder, StorageHandles};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;

// =============================================================================
// Test Helpers
// =============================================================================

/// Start test server and return base URL.
async fn start_test_server() -> (String, StorageHandles) {
    let handles = StorageBuilder::new("sqlite::memory:")
        .feed_capacity(100)
        .build()
        .await
        .expect("Failed to build storage");
    let router = create_router(AppState::new(handles.clone(), Default::default()));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{}", addr), handles)
}

fn session(id: &str, device_id: &str, app_version: &str) -> Session {
    Session {
        id: id.to_string(),
        device_id: device_id.to_string(),
        app_version: app_version.to_string(),
        platform: "android".to_string(),
        device_type: Some("midrange".to_string()),
        started_at: Utc::now() - chrono::Duration::hours(2),
        ended_at: None,
    }
}

/// Two sessions on two devices with a handful of samples each.
async fn seed_fleet(handles: &StorageHandles) {
    let now = Utc::now();
    handles.writer.upsert_session(&session("s-1", "d-1", "2.0.0")).await.unwrap();
    handles.writer.upsert_session(&session("s-2", "d-2", "2.1.0")).await.unwrap();

    let samples = vec![
        MetricSample::new("s-1", MetricType::Fps, 58.0, now),
        MetricSample::new("s-1", MetricType::MemoryUsage, 180.0, now),
        MetricSample::new("s-1", MetricType::LoadTime, 900.0, now),
        MetricSample::new("s-2", MetricType::Fps, 42.0, now).with_route("/checkout"),
        MetricSample::new("s-2", MetricType::MemoryUsage, 320.0, now).with_route("/checkout"),
        MetricSample::new("s-2", MetricType::LoadTime, 2400.0, now),
    ];
    handles.writer.insert_metrics(&samples).await.unwrap();
}

async fn get_json(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let resp = client.get(url).send().await.expect("request failed");
    let status = resp.status();
    (status, resp.json().await.unwrap_or(Value::Null))
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_and_readiness() {
    let (base, _handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, format!("{base}/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&client, format!("{base}/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["db"], "ready");
}

// =============================================================================
// Dashboard view-models
// =============================================================================

#[tokio::test]
async fn test_summary_score_and_drilldowns() {
    let (base, handles) = start_test_server().await;
    seed_fleet(&handles).await;
    let client = reqwest::Client::new();

    let (status, summary) = get_json(&client, format!("{base}/api/performance/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_sessions"], 2);
    assert_eq!(summary["unique_devices"], 2);
    assert_eq!(summary["avg_fps"], 50.0);
    assert_eq!(summary["avg_memory"], 250.0);
    assert!(summary["avg_cpu"].is_null());

    let (status, score) = get_json(&client, format!("{base}/api/performance/score?range=24h")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(score["overall"], summary["health"]["overall"]);

    let (status, device) = get_json(&client, format!("{base}/api/devices/d-2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(device["session_count"], 1);
    assert_eq!(device["app_versions"][0], "2.1.0");

    let (status, _) = get_json(&client, format!("{base}/api/versions/9.9.9")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, routes) = get_json(&client, format!("{base}/api/routes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(routes["routes"][0]["route"], "/checkout");
}

#[tokio::test]
async fn test_unsupported_range_is_rejected() {
    let (base, _handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, format!("{base}/api/performance/trends?range=3w")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("3w"));
}

#[tokio::test]
async fn test_insights_report_sections() {
    let (base, handles) = start_test_server().await;
    seed_fleet(&handles).await;
    let client = reqwest::Client::new();

    let (status, report) = get_json(&client, format!("{base}/api/insights")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["summary"]["status"], "success");
    assert_eq!(report["alerts"]["status"], "success");
    assert!(report["insights"].as_array().is_some());
}

// =============================================================================
// Alerts
// =============================================================================

#[tokio::test]
async fn test_alert_lifecycle_over_http() {
    let (base, handles) = start_test_server().await;
    let alert = handles
        .alert_store
        .raise(NewAlert {
            config_id: "cfg-fps".to_string(),
            severity: AlertSeverity::Critical,
            metric_value: 22.0,
            threshold: 30.0,
            message: "FPS below critical threshold".to_string(),
        })
        .await
        .unwrap();
    let client = reqwest::Client::new();

    // Missing actor
    let resp = client
        .post(format!("{base}/api/alerts/{}/acknowledge", alert.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(format!("{base}/api/alerts/{}/acknowledge", alert.id))
        .header(ACTOR_HEADER, "oncall")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "acknowledged");
    assert_eq!(body["acknowledged_by"], "oncall");

    let (_, open) = get_json(&client, format!("{base}/api/alerts?status=active")).await;
    assert!(open.as_array().unwrap().is_empty());

    let resp = client
        .post(format!("{base}/api/alerts/{}/resolve", alert.id))
        .header(ACTOR_HEADER, "oncall")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Resolved alerts never move backward
    let resp = client
        .post(format!("{base}/api/alerts/{}/acknowledge", alert.id))
        .header(ACTOR_HEADER, "oncall")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_alert_config_crud() {
    let (base, _handles) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/alert-configs"))
        .json(&json!({
            "name": "Low FPS",
            "metric_type": "fps",
            "warning_threshold": 45.0,
            "critical_threshold": 30.0,
            "notification_channels": ["slack"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let resp = client
        .put(format!("{base}/api/alert-configs/{id}"))
        .json(&json!({
            "name": "Low FPS",
            "metric_type": "fps",
            "warning_threshold": 50.0,
            "critical_threshold": 30.0,
            "notification_channels": ["slack", "email"],
            "is_active": false
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["warning_threshold"], 50.0);
    assert_eq!(updated["is_active"], false);

    let resp = client
        .delete(format!("{base}/api/alert-configs/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let (status, listed) = get_json(&client, format!("{base}/api/alert-configs")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().is_empty());
}

// =============================================================================
// Feedback and datasets
// =============================================================================

#[tokio::test]
async fn test_feedback_export_and_import() {
    let (base, handles) = start_test_server().await;
    seed_fleet(&handles).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/feedback"))
        .json(&json!({"category": "bug", "rating": 2, "message": "Checkout stutters"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = client
        .post(format!("{base}/api/feedback"))
        .json(&json!({"category": "bug", "rating": 9, "message": "out of range"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (status, dataset) = get_json(&client, format!("{base}/api/export")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dataset["sessions"].as_array().unwrap().len(), 2);
    assert_eq!(dataset["metrics"].as_array().unwrap().len(), 6);

    let (other, _other_handles) = start_test_server().await;
    let resp = client
        .post(format!("{other}/api/import"))
        .json(&dataset)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["sessions"], 2);
    assert_eq!(summary["metrics"], 6);
    assert_eq!(summary["feedback"], 1);

    let (_, imported) = get_json(&client, format!("{other}/api/performance/summary")).await;
    assert_eq!(imported["total_sessions"], 2);
}

// =============================================================================
// Live metrics
// =============================================================================

/// Read SSE chunks until one contains `needle`.
async fn read_until(resp: &mut reqwest::Response, needle: &str) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut seen = String::new();
        while let Some(chunk) = resp.chunk().await.unwrap() {
            seen.push_str(&String::from_utf8_lossy(&chunk));
            if seen.contains(needle) {
                return seen;
            }
        }
        panic!("stream ended before {needle}");
    })
    .await
    .expect("timed out waiting for live event")
}

#[tokio::test]
async fn test_live_session_stream() {
    let (base, handles) = start_test_server().await;
    handles.writer.upsert_session(&session("s-live", "d-9", "2.1.0")).await.unwrap();

    let mut resp = reqwest::get(format!("{base}/api/sessions/s-live/live")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    read_until(&mut resp, "\"connection\":\"connected\"").await;

    handles
        .writer
        .insert_metric(&MetricSample::new("s-live", MetricType::Fps, 61.5, Utc::now()))
        .await
        .unwrap();
    let events = read_until(&mut resp, "61.5").await;
    assert!(events.contains("event: live"));

    let resp = reqwest::get(format!("{base}/api/sessions/nope/live")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
