//! Health check endpoint integration tests.

mod common;

use common::TestApp;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn health_check_returns_ok() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app.get_public("/health").await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);

    let body = response.text().await.expect("Failed to read response body");
    assert_eq!(body, "OK");
}

#[tokio::test]
#[serial]
async fn health_status_reports_service_and_version() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/status").await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"].as_str().unwrap(), "healthy");
    assert_eq!(body["service"].as_str().unwrap(), "roomkey");
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
#[serial]
async fn readiness_check_reports_database_up() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/ready").await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"].as_str().unwrap(), "ready");
    assert_eq!(body["checks"]["database"]["status"].as_str().unwrap(), "up");
}

#[tokio::test]
#[serial]
async fn liveness_check_returns_200() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/live").await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
#[serial]
async fn nonexistent_endpoint_returns_404() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/nonexistent-endpoint").await;

    assert_eq!(response.status().as_u16(), 404);
}
