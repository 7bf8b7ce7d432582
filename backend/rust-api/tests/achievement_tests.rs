use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{send, token_for, COURTYARD};

/// Plays the Louvre sample to completion without hints and returns the
/// achievement ids unlocked by the final submission.
async fn complete_louvre(app: &axum::Router, token: &str) -> Vec<String> {
    let (status, joined) = send(
        app,
        "POST",
        "/api/v1/sessions",
        Some(token),
        Some(json!({ "hunt_id": "sample-louvre" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!(
        "/api/v1/sessions/{}/clues",
        joined["session"]["id"].as_str().unwrap()
    );

    let (status, _) = send(
        app,
        "POST",
        &uri,
        Some(token),
        Some(json!({
            "clue_id": "sample-louvre-1",
            "position": { "lat": COURTYARD.0, "lng": COURTYARD.1 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // riddles are answered from anywhere
    let (status, body) = send(
        app,
        "POST",
        &uri,
        Some(token),
        Some(json!({ "clue_id": "sample-louvre-2", "answer": "MONA LISA" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed"], true);

    body["achievements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a: &Value| a["achievement_id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_catalog_is_public() {
    let app = common::create_test_app();

    let (status, body) = send(&app.router, "GET", "/api/v1/achievements", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let catalog = body.as_array().unwrap();
    assert_eq!(catalog.len(), 5);
    assert!(catalog
        .iter()
        .any(|a| a["id"] == "legendary_hunter" && a["rarity"] == "legendary"));
}

#[tokio::test]
async fn test_first_hunt_unlocks_once() {
    let app = common::create_test_app();
    let token = token_for("gina", "player");

    let first = complete_louvre(&app.router, &token).await;
    assert!(first.contains(&"first_hunt".to_string()));
    assert!(first.contains(&"no_hints".to_string()));
    assert!(first.contains(&"speed_runner".to_string()));

    let second = complete_louvre(&app.router, &token).await;
    assert!(second.is_empty());

    let (status, summary) = send(
        &app.router,
        "GET",
        "/api/v1/users/me/achievements",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["completed_hunts"], 2);
    assert_eq!(summary["unlocked"].as_array().unwrap().len(), 3);
    // 2 x 250 session score + 50 + 75 + 100 bonus
    assert_eq!(summary["total_points"], 725);
}

#[tokio::test]
async fn test_milestones_follow_completion_count() {
    let app = common::create_test_app();
    let token = token_for("hank", "player");

    app.store.seed_completed_hunts("hank", 4).await;
    let fifth = complete_louvre(&app.router, &token).await;
    assert!(fifth.contains(&"seasoned_hunter".to_string()));
    assert!(!fifth.contains(&"first_hunt".to_string()));

    app.store.seed_completed_hunts("hank", 19).await;
    let twentieth = complete_louvre(&app.router, &token).await;
    assert_eq!(twentieth, vec!["legendary_hunter".to_string()]);
}

#[tokio::test]
async fn test_achievement_outage_does_not_fail_submission() {
    let app = common::create_test_app();
    let token = token_for("ivy", "player");

    let (_, joined) = send(
        &app.router,
        "POST",
        "/api/v1/sessions",
        Some(&token),
        Some(json!({ "hunt_id": "sample-louvre" })),
    )
    .await;
    let session_id = joined["session"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/sessions/{}/clues", session_id);
    send(
        &app.router,
        "POST",
        &uri,
        Some(&token),
        Some(json!({
            "clue_id": "sample-louvre-1",
            "position": { "lat": COURTYARD.0, "lng": COURTYARD.1 }
        })),
    )
    .await;

    app.store.set_unavailable(true);
    let (status, body) = send(
        &app.router,
        "POST",
        &uri,
        Some(&token),
        Some(json!({ "clue_id": "sample-louvre-2", "answer": "mona lisa" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed"], true);
    assert_eq!(body["achievements"].as_array().unwrap().len(), 0);

    let (status, _) = send(&app.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    app.store.set_unavailable(false);
    let (status, health) = send(&app.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}
