//! Audit trail read endpoint, guarded by `audit:read`.

use axum::{
    extract::{Query, State},
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::{get_db_conn, ApiError, ApiResult},
    models::AuditLogEntry,
    pagination::{IntoPaginated, PaginatedResponse, PaginationParams},
    schema::audit_log,
    AppState,
};

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AuditFilter {
    /// Restrict to entries tied to one user.
    pub user_id: Option<Uuid>,
    /// Exact action match, e.g. `auth.login`.
    #[param(example = "auth.login")]
    pub action: Option<String>,
}

#[utoipa::path(
    get,
    path = "/audit",
    tag = "Audit",
    params(PaginationParams, AuditFilter),
    responses(
        (status = 200, description = "Paginated audit entries, newest first", body = PaginatedResponse<AuditLogEntry>),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Missing audit:read permission", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_audit_entries(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Json<PaginatedResponse<AuditLogEntry>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let mut count_query = audit_log::table.into_boxed();
    let mut list_query = audit_log::table.into_boxed();

    if let Some(user_id) = filter.user_id {
        count_query = count_query.filter(audit_log::user_id.eq(user_id));
        list_query = list_query.filter(audit_log::user_id.eq(user_id));
    }
    if let Some(action) = &filter.action {
        count_query = count_query.filter(audit_log::action.eq(action.clone()));
        list_query = list_query.filter(audit_log::action.eq(action.clone()));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let entries: Vec<AuditLogEntry> = list_query
        .order(audit_log::created_at.desc())
        .limit(pagination.limit())
        .offset(pagination.offset())
        .select(AuditLogEntry::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Json(entries.into_paginated(&pagination, total_count)))
}
