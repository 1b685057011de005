use axum::http::StatusCode;
use serde_json::json;

#[path = "support/mod.rs"]
mod support;

#[tokio::test]
async fn register_then_list_and_get() {
    let (app, _backend) = support::test_app();

    let (status, body) = support::post_json(
        &app,
        "/api/dispensers/register",
        json!({ "dispenserId": "d1", "name": "Lobby unit", "location": "Ward 3" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["dispenser"]["dispenserId"], "d1");

    let (status, body) = support::get(&app, "/api/dispensers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["dispensers"][0]["dispenserId"], "d1");
    assert_eq!(body["dispensers"][0]["online"], true);

    let (status, body) = support::get(&app, "/api/dispensers/d1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dispenser"]["name"], "Lobby unit");
    assert_eq!(body["dispenser"]["online"], true);
}

#[tokio::test]
async fn register_validates_the_id() {
    let (app, _backend) = support::test_app();
    let (status, body) = support::post_json(
        &app,
        "/api/dispensers/register",
        json!({ "dispenserId": "" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn heartbeat_requires_registration() {
    let (app, _backend) = support::test_app();

    let (status, _) = support::post_empty(&app, "/api/dispensers/ghost/heartbeat").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    support::post_json(
        &app,
        "/api/dispensers/register",
        json!({ "dispenserId": "d1" }),
    )
    .await;
    let (status, body) = support::post_empty(&app, "/api/dispensers/d1/heartbeat").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn unregister_removes_the_unit() {
    let (app, _backend) = support::test_app();
    support::post_json(
        &app,
        "/api/dispensers/register",
        json!({ "dispenserId": "d1" }),
    )
    .await;

    let (status, _) = support::post_empty(&app, "/api/dispensers/d1/unregister").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = support::get(&app, "/api/dispensers/d1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = support::post_empty(&app, "/api/dispensers/d1/unregister").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn polling_counts_as_a_heartbeat() {
    let (app, _backend) = support::test_app();
    support::post_json(
        &app,
        "/api/dispensers/register",
        json!({ "dispenserId": "d1" }),
    )
    .await;

    // A pending-session poll refreshes liveness as a side effect.
    let (status, _) = support::get(&app, "/api/check-pending/d1").await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = support::get(&app, "/api/dispensers/d1").await;
    assert_eq!(body["dispenser"]["online"], true);
}
