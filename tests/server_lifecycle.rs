mod common;

/// Exercises the full HTTP stack over a real TCP listener rather than
/// `tower::ServiceExt::oneshot`, so the request-id middleware in
/// `net::router` actually round-trips through a socket.
#[tokio::test]
async fn health_check_over_real_listener_propagates_request_id() {
    let (app, _harness) = common::TestApp::new().await;

    let response = reqwest::get(format!("{}/health", app.address))
        .await
        .expect("request to live server");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body: serde_json::Value = response.json().await.expect("valid json body");
    assert_eq!(body["status"], "OK");
}
