//! Role registry handlers.
//!
//! Roles and permissions are seeded by migration; this surface is read-only.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{get_db_conn, ApiError, ApiResult},
    models::{Permission, Role},
    rbac,
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RolesListResponse {
    pub roles: Vec<RoleWithPermissions>,
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    responses(
        (status = 200, description = "Every role with its permissions", body = RolesListResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Missing users:manage permission", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(State(state): State<AppState>) -> ApiResult<Json<RolesListResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let roles = rbac::list_roles_with_permissions(&mut conn)
        .map_err(|_| ApiError::db_error())?
        .into_iter()
        .map(|(role, permissions)| RoleWithPermissions { role, permissions })
        .collect();

    Ok(Json(RolesListResponse { roles }))
}
