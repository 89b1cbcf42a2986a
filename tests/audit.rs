//! Audit trail integration tests.

mod common;

use common::{create_test_admin, create_test_guest, TestApp};
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn security_actions_append_audit_entries() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_test_guest(&app).await;

    // Act - login, rotate, logout
    let login = app
        .login_user(&user.email, &user.password)
        .await
        .expect("Failed to login");

    let rotated: serde_json::Value = app
        .post_public(
            "/auth/refresh-token",
            json!({ "refresh_token": login.refresh_token }),
        )
        .await
        .json()
        .await
        .expect("Failed to parse response");

    let _ = app
        .post_public(
            "/auth/logout",
            json!({ "refresh_token": rotated["refresh_token"].as_str().unwrap() }),
        )
        .await;

    // Assert - one entry per action
    assert_eq!(app.count_audit_entries(user.id, "auth.register"), 1);
    assert_eq!(app.count_audit_entries(user.id, "auth.login"), 1);
    assert_eq!(app.count_audit_entries(user.id, "auth.token_rotated"), 1);
    assert_eq!(app.count_audit_entries(user.id, "auth.logout"), 1);
}

#[tokio::test]
#[serial]
async fn rotation_audit_entry_references_old_token() {
    let app = TestApp::spawn().await;
    let user = create_test_guest(&app).await;

    let _ = app
        .post_public(
            "/auth/refresh-token",
            json!({ "refresh_token": user.refresh_token }),
        )
        .await;

    let entry = app
        .latest_audit_entry(user.id, "auth.token_rotated")
        .expect("Rotation entry should exist");
    assert_eq!(entry.resource, "auth");
    assert!(entry.details.get("rotated_from").is_some());
}

#[tokio::test]
#[serial]
async fn audit_read_requires_permission() {
    let app = TestApp::spawn().await;
    let guest = create_test_guest(&app).await;

    let response = app.get("/audit", &guest.access_token).await;

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn admin_reads_paginated_audit_trail() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = create_test_admin(&app).await;
    let guest = create_test_guest(&app).await;

    // Act
    let response = app
        .get("/audit?page=1&per_page=5", &admin.access_token)
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    let entries = body["data"].as_array().unwrap();
    assert!(!entries.is_empty());
    assert!(entries.len() <= 5);
    assert!(body["pagination"]["total_count"].as_i64().unwrap() >= 2);

    // Filter narrows to one user's trail.
    let filtered: serde_json::Value = app
        .get(
            &format!("/audit?user_id={}&action=auth.register", guest.id),
            &admin.access_token,
        )
        .await
        .json()
        .await
        .expect("Failed to parse response");
    let filtered_entries = filtered["data"].as_array().unwrap();
    assert_eq!(filtered_entries.len(), 1);
    assert_eq!(
        filtered_entries[0]["user_id"].as_str().unwrap(),
        guest.id.to_string()
    );
}
