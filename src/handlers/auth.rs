//! Authentication handlers.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::{AuditAction, AuditService},
    auth::{
        jwt::Claims,
        password::PasswordService,
        tokens::{generate_opaque_token, hash_token, TokenService, TokenServiceError},
    },
    error::{get_db_conn, ApiError, ApiResult},
    models::{
        GuestProfile, NewGuestProfile, NewPasswordResetToken, NewStaffProfile, NewUser,
        StaffProfile, User, UserType,
    },
    rbac,
    schema::{guest_profiles, password_reset_tokens, staff_profiles, users},
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "guest@grandhotel.example")]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "securepassword123", min_length = 8)]
    pub password: String,
    #[validate(length(min = 1, message = "First name is required"))]
    #[schema(example = "Ana")]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    #[schema(example = "Petrovic")]
    pub last_name: String,
    #[schema(example = "+381641234567")]
    pub phone: Option<String>,
    /// One of `admin`, `staff`, `guest`.
    #[schema(example = "guest")]
    pub user_type: String,
    /// Staff only.
    #[schema(example = "housekeeping")]
    pub department: Option<String>,
    /// Staff only.
    #[schema(example = "EMP-0042")]
    pub employee_id: Option<String>,
    /// Guest only.
    #[schema(example = "412")]
    pub room_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "guest@grandhotel.example")]
    pub email: String,
    #[schema(example = "securepassword123")]
    pub password: String,
    /// Free-form device descriptor stored with the refresh token.
    #[schema(example = "lobby-kiosk-3")]
    pub device: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[schema(example = "64 hex characters")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[schema(example = json!(["guest"]))]
    pub roles: Vec<String>,
    #[schema(example = json!(["bookings:read", "alerts:create"]))]
    pub permissions: Vec<String>,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Logged out")]
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "guest@grandhotel.example")]
    pub email: String,
    #[schema(example = "Ana")]
    pub first_name: String,
    #[schema(example = "Petrovic")]
    pub last_name: String,
    pub phone: Option<String>,
    #[schema(example = "guest")]
    pub user_type: String,
    pub is_active: bool,
    pub locale: String,
    pub timezone: String,
    pub created_at: chrono::NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            user_type: user.user_type,
            is_active: user.is_active,
            locale: user.locale,
            timezone: user.timezone,
            created_at: user.created_at,
        }
    }
}

/// Best-effort client address for the audit trail; deployments behind a
/// proxy get it from the forwarding header.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn map_token_error(e: TokenServiceError) -> (StatusCode, Json<ApiError>) {
    match e {
        TokenServiceError::NotFound => {
            record_auth_attempt("refresh", AuthOutcome::TokenNotFound);
            ApiError::unauthorized("Invalid refresh token", "INVALID_REFRESH_TOKEN")
        }
        TokenServiceError::ExpiredOrRevoked => {
            record_auth_attempt("refresh", AuthOutcome::TokenExpiredOrRevoked);
            ApiError::unauthorized(
                "Refresh token has expired or been revoked",
                "TOKEN_EXPIRED_OR_REVOKED",
            )
        }
        TokenServiceError::AccountDisabled => {
            record_auth_attempt("refresh", AuthOutcome::AccountDisabled);
            ApiError::unauthorized("Account is disabled", "ACCOUNT_DISABLED")
        }
        TokenServiceError::Jwt(e) => {
            error!(error = %e, "Token generation failed");
            ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
        }
        TokenServiceError::Db(e) => {
            error!(error = %e, "Database error in token service");
            ApiError::db_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Validation error or duplicate email", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let user_type = UserType::parse(&payload.user_type).ok_or_else(|| {
        ApiError::bad_request(
            "user_type must be one of admin, staff, guest",
            "VALIDATION_ERROR",
        )
    })?;

    if user_type == UserType::Staff
        && (payload.department.is_none() || payload.employee_id.is_none())
    {
        return Err(ApiError::bad_request(
            "Staff registration requires department and employee_id",
            "VALIDATION_ERROR",
        ));
    }

    if let Err(e) = state.password_policy.validate(&payload.password) {
        return Err(ApiError::bad_request(
            e.to_string(),
            "PASSWORD_POLICY_VIOLATION",
        ));
    }

    let password_hash =
        PasswordService::hash_password_with_cost(&payload.password, state.password_hash_cost)
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
            })?;

    let new_user = NewUser {
        email: payload.email.to_lowercase(),
        password_hash,
        first_name: payload.first_name.clone(),
        last_name: payload.last_name.clone(),
        phone: payload.phone.clone(),
        user_type: user_type.as_str().to_string(),
    };

    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    // User row, default role, profile row, audit entry and the first token
    // pair all land or none do.
    let (user, issued) = conn
        .transaction::<_, TokenServiceError, _>(|conn| {
            let user: User = diesel::insert_into(users::table)
                .values(&new_user)
                .returning(User::as_returning())
                .get_result(conn)?;

            rbac::attach_role(conn, user.id, user_type.default_role())?;

            match user_type {
                UserType::Staff => {
                    diesel::insert_into(staff_profiles::table)
                        .values(&NewStaffProfile {
                            user_id: user.id,
                            department: payload.department.clone().unwrap_or_default(),
                            employee_id: payload.employee_id.clone().unwrap_or_default(),
                        })
                        .execute(conn)?;
                }
                UserType::Guest => {
                    diesel::insert_into(guest_profiles::table)
                        .values(&NewGuestProfile {
                            user_id: user.id,
                            room_number: payload.room_number.clone(),
                            check_in: None,
                            check_out: None,
                            preferences: serde_json::json!({}),
                        })
                        .execute(conn)?;
                }
                UserType::Admin => {}
            }

            let issued = TokenService::issue_pair(conn, &state.jwt_config, &user, None)?;

            AuditService::record(
                conn,
                AuditAction::Register,
                Some(user.id),
                serde_json::json!({ "email": user.email, "user_type": user.user_type }),
                ip.clone(),
            )?;

            Ok((user, issued))
        })
        .map_err(|e| match e {
            TokenServiceError::Db(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                warn!(email = %new_user.email, "Registration with duplicate email");
                ApiError::bad_request("Email is already registered", "DUPLICATE_EMAIL")
            }
            other => map_token_error(other),
        })?;

    info!(user_id = %user.id, email = %user.email, user_type = %user.user_type, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.into(),
            roles: issued.roles,
            permissions: issued.permissions,
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Invalid credentials or disabled account", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    // Unknown email and wrong password answer identically; only the audit
    // trail and logs distinguish them.
    let user: Option<User> = users::table
        .filter(users::email.eq(payload.email.to_lowercase()))
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Database error looking up user");
            ApiError::db_error()
        })?;

    let Some(user) = user else {
        warn!(email = %payload.email, "Login attempt for unknown email");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    };

    let is_valid = PasswordService::verify_password(&payload.password, &user.password_hash)
        .map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
        })?;

    if !is_valid {
        warn!(user_id = %user.id, "Failed login attempt");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);

        let _ = AuditService::record(
            &mut conn,
            AuditAction::LoginFailed,
            Some(user.id),
            serde_json::json!({ "email": user.email, "reason": "invalid_password" }),
            ip,
        );

        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    }

    if !user.is_active {
        warn!(user_id = %user.id, "Login attempt for disabled account");
        record_auth_attempt("login", AuthOutcome::AccountDisabled);
        return Err(ApiError::unauthorized(
            "Account is disabled",
            "ACCOUNT_DISABLED",
        ));
    }

    TokenService::cleanup_expired(&mut conn, user.id);

    let issued = TokenService::issue_pair(&mut conn, &state.jwt_config, &user, payload.device)
        .map_err(map_token_error)?;

    let now = Utc::now().naive_utc();
    diesel::update(users::table.filter(users::id.eq(user.id)))
        .set(users::last_login_at.eq(Some(now)))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to update last login timestamp");
            ApiError::db_error()
        })?;

    let _ = AuditService::record(
        &mut conn,
        AuditAction::Login,
        Some(user.id),
        serde_json::json!({ "email": user.email }),
        ip,
    );

    record_auth_attempt("login", AuthOutcome::Success);
    info!(user_id = %user.id, email = %user.email, "User logged in");

    Ok(Json(AuthResponse {
        user: user.into(),
        roles: issued.roles,
        permissions: issued.permissions,
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/refresh-token",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = RefreshResponse),
        (status = 401, description = "Unknown, expired or revoked refresh token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    let (user, issued) =
        TokenService::rotate(&mut conn, &state.jwt_config, &payload.refresh_token, ip)
            .map_err(map_token_error)?;

    record_auth_attempt("refresh", AuthOutcome::Success);
    info!(user_id = %user.id, "Tokens rotated");

    Ok(Json(RefreshResponse {
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 404, description = "Token not found or already revoked", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    let user_id =
        TokenService::revoke(&mut conn, &payload.refresh_token).map_err(|e| match e {
            TokenServiceError::NotFound => {
                ApiError::not_found("Refresh token not found", "TOKEN_NOT_FOUND")
            }
            other => map_token_error(other),
        })?;

    let _ = AuditService::record(
        &mut conn,
        AuditAction::Logout,
        Some(user_id),
        serde_json::json!({}),
        ip,
    );

    info!(user_id = %user_id, "User logged out");
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserResponse {
    pub user: UserResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_profile: Option<StaffProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_profile: Option<GuestProfile>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Returns the authenticated user's profile. Roles and permissions come
/// fresh from the database rather than from the token, so this also shows
/// the set the next issued token will carry.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user information", body = CurrentUserResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<CurrentUserResponse>> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid user ID in token", "INVALID_TOKEN"))?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .select(User::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    let (roles, permissions) = rbac::load_claims_for_user(&mut conn, user.id).map_err(|e| {
        error!(error = %e, "Failed to load roles");
        ApiError::db_error()
    })?;

    let staff_profile: Option<StaffProfile> = staff_profiles::table
        .filter(staff_profiles::user_id.eq(user.id))
        .select(StaffProfile::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Failed to load staff profile");
            ApiError::db_error()
        })?;

    let guest_profile: Option<GuestProfile> = guest_profiles::table
        .filter(guest_profiles::user_id.eq(user.id))
        .select(GuestProfile::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Failed to load guest profile");
            ApiError::db_error()
        })?;

    Ok(Json(CurrentUserResponse {
        user: user.into(),
        staff_profile,
        guest_profile,
        roles,
        permissions,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[schema(example = "oldpassword123")]
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "newSecurePassword123", min_length = 8)]
    pub new_password: String,
}

#[utoipa::path(
    post,
    path = "/auth/password/change",
    tag = "Authentication",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed, all refresh tokens revoked", body = MessageResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Current password is wrong", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if let Err(e) = state.password_policy.validate(&payload.new_password) {
        return Err(ApiError::bad_request(
            e.to_string(),
            "PASSWORD_POLICY_VIOLATION",
        ));
    }

    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid user ID in token", "INVALID_TOKEN"))?;

    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .select(User::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    let is_valid = PasswordService::verify_password(&payload.current_password, &user.password_hash)
        .map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
        })?;

    if !is_valid {
        warn!(user_id = %user.id, "Password change with wrong current password");
        return Err(ApiError::unauthorized(
            "Current password is incorrect",
            "INVALID_CURRENT_PASSWORD",
        ));
    }

    let password_hash =
        PasswordService::hash_password_with_cost(&payload.new_password, state.password_hash_cost)
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
            })?;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let now = Utc::now().naive_utc();
        diesel::update(users::table.filter(users::id.eq(user.id)))
            .set((
                users::password_hash.eq(&password_hash),
                users::updated_at.eq(now),
            ))
            .execute(conn)?;

        let revoked = TokenService::revoke_all_for_user(conn, user.id)?;

        AuditService::record(
            conn,
            AuditAction::PasswordChanged,
            Some(user.id),
            serde_json::json!({ "tokens_revoked": revoked }),
            ip,
        )?;

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, "Failed to change password");
        ApiError::internal("Failed to change password", "PASSWORD_UPDATE_ERROR")
    })?;

    info!(user_id = %user.id, "Password changed, refresh tokens revoked");
    Ok(Json(MessageResponse {
        message: "Password changed".to_string(),
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetRequestRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "guest@grandhotel.example")]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetRequestResponse {
    #[schema(example = "If the email is registered, a reset token has been issued")]
    pub message: String,
    /// Raw reset token for out-of-band delivery. Absent when the email is
    /// unknown; production deployments dispatch it by email instead of
    /// returning it here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[schema(example = "64 hex characters")]
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "newSecurePassword123", min_length = 8)]
    pub new_password: String,
}

/// The response never discloses whether the email exists; the token field
/// is simply absent when it does not.
#[utoipa::path(
    post,
    path = "/auth/password/reset-request",
    tag = "Authentication",
    request_body = ResetRequestRequest,
    responses(
        (status = 200, description = "Generic acknowledgement", body = ResetRequestResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetRequestRequest>,
) -> ApiResult<Json<ResetRequestResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    const GENERIC_MESSAGE: &str = "If the email is registered, a reset token has been issued";

    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    let user: Option<User> = users::table
        .filter(users::email.eq(payload.email.to_lowercase()))
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Database error looking up user");
            ApiError::db_error()
        })?;

    let Some(user) = user.filter(|u| u.is_active) else {
        return Ok(Json(ResetRequestResponse {
            message: GENERIC_MESSAGE.to_string(),
            reset_token: None,
        }));
    };

    // A new request supersedes any outstanding token for the user.
    diesel::delete(
        password_reset_tokens::table.filter(password_reset_tokens::user_id.eq(user.id)),
    )
    .execute(&mut conn)
    .map_err(|e| {
        error!(error = %e, "Failed to clear previous reset tokens");
        ApiError::internal("Failed to initiate password reset", "RESET_TOKEN_ERROR")
    })?;

    let token = generate_opaque_token();
    let expires_at =
        (Utc::now() + Duration::minutes(state.reset_token_expiry_mins)).naive_utc();

    diesel::insert_into(password_reset_tokens::table)
        .values(&NewPasswordResetToken {
            user_id: user.id,
            token_hash: hash_token(&token),
            expires_at,
        })
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to create password reset token");
            ApiError::internal("Failed to initiate password reset", "RESET_TOKEN_ERROR")
        })?;

    let _ = AuditService::record(
        &mut conn,
        AuditAction::PasswordResetRequested,
        Some(user.id),
        serde_json::json!({ "email": user.email }),
        ip,
    );

    info!(user_id = %user.id, "Password reset requested");

    Ok(Json(ResetRequestResponse {
        message: GENERIC_MESSAGE.to_string(),
        reset_token: Some(token),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/password/reset",
    tag = "Authentication",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset, all refresh tokens revoked", body = MessageResponse),
        (status = 400, description = "Invalid, expired or already used token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if let Err(e) = state.password_policy.validate(&payload.new_password) {
        return Err(ApiError::bad_request(
            e.to_string(),
            "PASSWORD_POLICY_VIOLATION",
        ));
    }

    let password_hash =
        PasswordService::hash_password_with_cost(&payload.new_password, state.password_hash_cost)
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
            })?;

    let token_hash = hash_token(&payload.token);
    let ip = client_ip(&headers);
    let mut conn = get_db_conn(&state.db_pool)?;

    let user_id = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let now = Utc::now().naive_utc();

            // Marking used is conditional on `used_at IS NULL`; a concurrent
            // redemption of the same token sees no row here.
            let user_id: Option<Uuid> = diesel::update(
                password_reset_tokens::table
                    .filter(password_reset_tokens::token_hash.eq(&token_hash))
                    .filter(password_reset_tokens::expires_at.gt(now))
                    .filter(password_reset_tokens::used_at.is_null()),
            )
            .set(password_reset_tokens::used_at.eq(Some(now)))
            .returning(password_reset_tokens::user_id)
            .get_result(conn)
            .optional()?;

            let Some(user_id) = user_id else {
                return Ok(None);
            };

            diesel::update(users::table.filter(users::id.eq(user_id)))
                .set((
                    users::password_hash.eq(&password_hash),
                    users::updated_at.eq(now),
                ))
                .execute(conn)?;

            let revoked = TokenService::revoke_all_for_user(conn, user_id)?;

            AuditService::record(
                conn,
                AuditAction::PasswordReset,
                Some(user_id),
                serde_json::json!({ "tokens_revoked": revoked }),
                ip.clone(),
            )?;

            Ok(Some(user_id))
        })
        .map_err(|e| {
            error!(error = %e, "Failed to reset password");
            ApiError::internal("Failed to reset password", "PASSWORD_UPDATE_ERROR")
        })?;

    let Some(user_id) = user_id else {
        warn!("Password reset with invalid or expired token");
        return Err(ApiError::bad_request(
            "Invalid or expired reset token",
            "INVALID_RESET_TOKEN",
        ));
    };

    info!(user_id = %user_id, "Password reset completed");
    Ok(Json(MessageResponse {
        message: "Password has been reset".to_string(),
    }))
}
