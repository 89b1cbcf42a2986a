//! Password change and reset lifecycle tests.

mod common;

use common::{create_test_guest, TestApp};
use serde_json::json;
use serial_test::serial;

// ============================================================================
// Password Change Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn change_password_requires_current_password() {
    let app = TestApp::spawn().await;
    let user = create_test_guest(&app).await;

    let response = app
        .post(
            "/auth/password/change",
            &user.access_token,
            json!({
                "current_password": "wrong_password",
                "new_password": "brandNewPassword1"
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"].as_str().unwrap(), "INVALID_CURRENT_PASSWORD");
}

#[tokio::test]
#[serial]
async fn change_password_revokes_all_refresh_tokens() {
    // Arrange - two sessions for the same user
    let app = TestApp::spawn().await;
    let user = create_test_guest(&app).await;
    let second_session = app
        .login_user(&user.email, &user.password)
        .await
        .expect("Failed to login second session");

    // Act
    let response = app
        .post(
            "/auth/password/change",
            &user.access_token,
            json!({
                "current_password": user.password,
                "new_password": "brandNewPassword1"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(app.count_active_refresh_tokens(user.id), 0);

    for token in [&user.refresh_token, &second_session.refresh_token] {
        let refresh = app
            .post_public("/auth/refresh-token", json!({ "refresh_token": token }))
            .await;
        assert_eq!(refresh.status().as_u16(), 401);
    }

    // Old password is gone, new one works.
    let old_login = app
        .post_public(
            "/auth/login",
            json!({ "email": user.email, "password": user.password }),
        )
        .await;
    assert_eq!(old_login.status().as_u16(), 401);

    let new_login = app
        .login_user(&user.email, "brandNewPassword1")
        .await
        .expect("Failed to login with new password");
    assert_eq!(new_login.id, user.id);

    assert_eq!(app.count_audit_entries(user.id, "auth.password_changed"), 1);
}

// ============================================================================
// Reset Request Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn reset_request_returns_generic_response_for_unknown_email() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/auth/password/reset-request",
            json!({ "email": TestApp::unique_email() }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert!(body["message"].as_str().is_some());
    assert!(body.get("reset_token").is_none());
}

#[tokio::test]
#[serial]
async fn reset_request_issues_token_for_known_email() {
    let app = TestApp::spawn().await;
    let user = create_test_guest(&app).await;

    let response = app
        .post_public(
            "/auth/password/reset-request",
            json!({ "email": user.email }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    let token = body["reset_token"].as_str().expect("Token should be issued");
    assert_eq!(token.len(), 64);

    assert_eq!(
        app.count_audit_entries(user.id, "auth.password_reset_requested"),
        1
    );
}

#[tokio::test]
#[serial]
async fn new_reset_request_supersedes_previous_token() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_test_guest(&app).await;

    let first: serde_json::Value = app
        .post_public(
            "/auth/password/reset-request",
            json!({ "email": user.email }),
        )
        .await
        .json()
        .await
        .expect("Failed to parse response");
    let first_token = first["reset_token"].as_str().unwrap().to_string();

    let _ = app
        .post_public(
            "/auth/password/reset-request",
            json!({ "email": user.email }),
        )
        .await;

    // Act - redeem the superseded token
    let response = app
        .post_public(
            "/auth/password/reset",
            json!({
                "token": first_token,
                "new_password": "brandNewPassword1"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"].as_str().unwrap(), "INVALID_RESET_TOKEN");
}

// ============================================================================
// Reset Redemption Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn reset_sets_new_password_and_revokes_tokens() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_test_guest(&app).await;

    let request: serde_json::Value = app
        .post_public(
            "/auth/password/reset-request",
            json!({ "email": user.email }),
        )
        .await
        .json()
        .await
        .expect("Failed to parse response");
    let token = request["reset_token"].as_str().unwrap();

    // Act
    let response = app
        .post_public(
            "/auth/password/reset",
            json!({
                "token": token,
                "new_password": "brandNewPassword1"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(app.count_active_refresh_tokens(user.id), 0);

    let refresh = app
        .post_public(
            "/auth/refresh-token",
            json!({ "refresh_token": user.refresh_token }),
        )
        .await;
    assert_eq!(refresh.status().as_u16(), 401);

    let login = app
        .login_user(&user.email, "brandNewPassword1")
        .await
        .expect("Failed to login with reset password");
    assert_eq!(login.id, user.id);

    assert_eq!(app.count_audit_entries(user.id, "auth.password_reset"), 1);
}

#[tokio::test]
#[serial]
async fn reset_token_is_single_use() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_test_guest(&app).await;

    let request: serde_json::Value = app
        .post_public(
            "/auth/password/reset-request",
            json!({ "email": user.email }),
        )
        .await
        .json()
        .await
        .expect("Failed to parse response");
    let token = request["reset_token"].as_str().unwrap();

    let first = app
        .post_public(
            "/auth/password/reset",
            json!({ "token": token, "new_password": "brandNewPassword1" }),
        )
        .await;
    assert_eq!(first.status().as_u16(), 200);

    // Act - second redemption of the same token
    let second = app
        .post_public(
            "/auth/password/reset",
            json!({ "token": token, "new_password": "anotherPassword1" }),
        )
        .await;

    // Assert
    assert_eq!(second.status().as_u16(), 400);
    let body: serde_json::Value = second.json().await.expect("Failed to parse response");
    assert_eq!(body["code"].as_str().unwrap(), "INVALID_RESET_TOKEN");
}

#[tokio::test]
#[serial]
async fn reset_with_expired_token_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_test_guest(&app).await;

    let request = app
        .post_public(
            "/auth/password/reset-request",
            json!({ "email": user.email }),
        )
        .await;
    let request: serde_json::Value = request.json().await.expect("Failed to parse response");
    let token = request["reset_token"].as_str().unwrap().to_string();

    app.expire_reset_tokens(user.id);

    // Act - first redemption, but past the expiry window
    let redeem = app
        .post_public(
            "/auth/password/reset",
            json!({
                "token": token,
                "new_password": "brandNewPassword1"
            }),
        )
        .await;

    // Assert
    assert_eq!(redeem.status().as_u16(), 400);
    let body: serde_json::Value = redeem.json().await.expect("Failed to parse response");
    assert_eq!(body["code"].as_str().unwrap(), "INVALID_RESET_TOKEN");

    // The password is untouched.
    let login = app
        .post_public(
            "/auth/login",
            json!({ "email": user.email, "password": user.password }),
        )
        .await;
    assert_eq!(login.status().as_u16(), 200);
}

#[tokio::test]
#[serial]
async fn reset_returns_400_for_unknown_token() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/auth/password/reset",
            json!({
                "token": "deadbeef".repeat(8),
                "new_password": "brandNewPassword1"
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"].as_str().unwrap(), "INVALID_RESET_TOKEN");
}
