//! Authentication and authorization middleware.
//!
//! `auth_middleware` verifies the bearer token and stores the claims in
//! request extensions; `require_permission` layers an endpoint's declared
//! capability on top and answers only the role/permission question.
//! Ownership exceptions are evaluated by the handlers themselves.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::jwt::{Claims, TokenError};
use crate::error::ApiError;
use crate::AppState;

/// Validates the JWT access token and stores claims in request extensions.
/// Verification is signature and expiry only; no database lookup.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(
                    json!({"error": "Missing authorization header", "code": "MISSING_AUTH_HEADER"}),
                ),
            )
                .into_response()
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid authorization header format", "code": "INVALID_AUTH_FORMAT"})),
        )
            .into_response()
    })?;

    let claims = state
        .jwt_config
        .verify_access_token(token)
        .map_err(|e| match e {
            TokenError::Expired => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Token has expired", "code": "TOKEN_EXPIRED"})),
            )
                .into_response(),
            TokenError::Invalid => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid token", "code": "INVALID_TOKEN"})),
            )
                .into_response(),
        })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Layer factory declaring the permission an endpoint requires. Denies with
/// 403 unless `resource:action` is present in the verified claims.
pub fn require_permission(
    resource: &'static str,
    action: &'static str,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, Response>> + Send>>
       + Clone {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let claims = req.extensions().get::<Claims>().cloned().ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Missing authentication", "code": "MISSING_AUTH_HEADER"})),
                )
                    .into_response()
            })?;

            if !claims.authorize(resource, action) {
                return Err(ApiError::forbidden(
                    format!("Requires {}:{} permission", resource, action),
                    "INSUFFICIENT_PERMISSION",
                )
                .into_response());
            }

            Ok(next.run(req).await)
        })
    }
}
