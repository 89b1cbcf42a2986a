//! Administrative user management handlers, guarded by `users:manage`.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditService},
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult},
    handlers::auth::{client_ip, UserResponse},
    models::User,
    pagination::{IntoPaginated, PaginatedResponse, PaginationParams},
    rbac,
    schema::users,
    AppState,
};

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of users", body = PaginatedResponse<UserResponse>),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Missing users:manage permission", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<UserResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let total_count: i64 = users::table
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let user_list: Vec<UserResponse> = users::table
        .order(users::created_at.desc())
        .limit(pagination.limit())
        .offset(pagination.offset())
        .select(User::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(Json(user_list.into_paginated(&pagination, total_count)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRolesRequest {
    /// Full replacement for the user's role set, not an incremental change.
    #[schema(example = json!(["staff", "manager"]))]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignRolesResponse {
    pub user_id: Uuid,
    /// The names actually assigned; unknown names are dropped.
    #[schema(example = json!(["staff", "manager"]))]
    pub roles: Vec<String>,
}

#[utoipa::path(
    put,
    path = "/users/{user_id}/roles",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = AssignRolesRequest,
    responses(
        (status = 200, description = "Role set replaced", body = AssignRolesResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Missing users:manage permission", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn assign_roles(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRolesRequest>,
) -> ApiResult<Json<AssignRolesResponse>> {
    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    let exists: i64 = users::table
        .filter(users::id.eq(user_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if exists == 0 {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    let assigned = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let assigned = rbac::replace_roles(conn, user_id, &payload.roles)?;

            AuditService::record(
                conn,
                AuditAction::RolesAssigned,
                Some(user_id),
                serde_json::json!({
                    "requested": payload.roles,
                    "assigned": assigned,
                    "assigned_by": claims.sub,
                }),
                ip,
            )?;

            Ok(assigned)
        })
        .map_err(|e| {
            error!(error = %e, user_id = %user_id, "Failed to assign roles");
            ApiError::internal("Failed to assign roles", "ROLE_ASSIGN_ERROR")
        })?;

    info!(user_id = %user_id, roles = ?assigned, "Role set replaced");

    Ok(Json(AssignRolesResponse {
        user_id,
        roles: assigned,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(example = false)]
    pub is_active: bool,
}

#[utoipa::path(
    put,
    path = "/users/{user_id}/status",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Missing users:manage permission", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<Json<UserResponse>> {
    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    let user = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let user: Option<User> = diesel::update(users::table.filter(users::id.eq(user_id)))
                .set(users::is_active.eq(payload.is_active))
                .returning(User::as_returning())
                .get_result(conn)
                .optional()?;

            let Some(user) = user else {
                return Ok(None);
            };

            AuditService::record(
                conn,
                AuditAction::UserStatusChanged,
                Some(user_id),
                serde_json::json!({
                    "is_active": payload.is_active,
                    "changed_by": claims.sub,
                }),
                ip,
            )?;

            Ok(Some(user))
        })
        .map_err(|e| {
            error!(error = %e, user_id = %user_id, "Failed to update user status");
            ApiError::internal("Failed to update status", "STATUS_UPDATE_ERROR")
        })?
        .ok_or_else(|| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    info!(user_id = %user_id, is_active = payload.is_active, "User status changed");
    Ok(Json(user.into()))
}

/// Deletes the account. Profile rows, role assignments and tokens cascade
/// away with it; audit entries survive with a null user reference.
#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Missing users:manage permission", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let email: Option<String> = users::table
                .filter(users::id.eq(user_id))
                .select(users::email)
                .first(conn)
                .optional()?;

            let Some(email) = email else {
                return Ok(false);
            };

            // Written before the delete so the user reference is still valid;
            // the foreign key nulls it out afterwards.
            AuditService::record(
                conn,
                AuditAction::UserDeleted,
                Some(user_id),
                serde_json::json!({ "email": email, "deleted_by": claims.sub }),
                ip,
            )?;

            diesel::delete(users::table.filter(users::id.eq(user_id))).execute(conn)?;

            Ok(true)
        })
        .map_err(|e| {
            error!(error = %e, user_id = %user_id, "Failed to delete user");
            ApiError::internal("Failed to delete user", "DELETE_ERROR")
        })?;

    if !deleted {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    info!(user_id = %user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
