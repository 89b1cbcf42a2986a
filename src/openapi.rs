//! OpenAPI documentation configuration.
//!
//! Generates the OpenAPI specification via `utoipa` and serves it through
//! Swagger UI at `/swagger-ui`.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::handlers::auth::{
    AuthResponse, LoginRequest, MessageResponse, RefreshRequest, RefreshResponse, RegisterRequest,
    UserResponse,
};
use crate::pagination::{PaginatedResponse, PaginationMeta};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Roomkey API",
        version = "1.0.0",
        description = "Identity and access control for a hotel operations platform.\n\n\
        ## Features\n\
        - Short-lived Ed25519-signed access tokens paired with rotating refresh tokens\n\
        - Role-based access control for admin, manager, staff and guest accounts\n\
        - Argon2id password hashing with a password-reset token lifecycle\n\
        - Append-only security audit trail\n\n\
        ## Authentication\n\
        1. Register or login to get an access/refresh token pair\n\
        2. Include the access token in requests: `Authorization: Bearer <token>`\n\
        3. Exchange the refresh token at /auth/refresh-token before the access token expires;\n\
           each refresh token is single-use and replaced on rotation",
        contact(
            name = "Roomkey API Support"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Authentication", description = "User authentication and token management"),
        (name = "Users", description = "Administrative user management"),
        (name = "Roles", description = "Role and permission registry"),
        (name = "Audit", description = "Security audit trail")
    ),
    paths(
        crate::handlers::health::health_check_simple,
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,

        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,
        crate::handlers::auth::get_current_user,
        crate::handlers::auth::change_password,
        crate::handlers::auth::request_password_reset,
        crate::handlers::auth::reset_password,

        crate::handlers::users::list_users,
        crate::handlers::users::assign_roles,
        crate::handlers::users::update_status,
        crate::handlers::users::delete_user,

        crate::handlers::roles::list_roles,

        crate::handlers::audit::list_audit_entries,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            RefreshResponse,
            AuthResponse,
            UserResponse,
            MessageResponse,
            ApiError,
            crate::handlers::auth::CurrentUserResponse,
            crate::handlers::auth::ChangePasswordRequest,
            crate::handlers::auth::ResetRequestRequest,
            crate::handlers::auth::ResetRequestResponse,
            crate::handlers::auth::ResetPasswordRequest,

            PaginationMeta,
            PaginatedResponse<UserResponse>,
            PaginatedResponse<crate::models::AuditLogEntry>,

            crate::models::Role,
            crate::models::Permission,
            crate::models::StaffProfile,
            crate::models::GuestProfile,
            crate::models::AuditLogEntry,

            crate::handlers::users::AssignRolesRequest,
            crate::handlers::users::AssignRolesResponse,
            crate::handlers::users::UpdateStatusRequest,

            crate::handlers::roles::RoleWithPermissions,
            crate::handlers::roles::RolesListResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "JWT access token obtained from /auth/login or /auth/register.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Roomkey API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_includes_auth_paths() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/auth/register"));
        assert!(spec.paths.paths.contains_key("/auth/login"));
        assert!(spec.paths.paths.contains_key("/auth/refresh-token"));
        assert!(spec.paths.paths.contains_key("/auth/password/reset"));
        assert!(spec.paths.paths.contains_key("/audit"));
    }

    #[test]
    fn test_openapi_has_bearer_security_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components should exist");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
