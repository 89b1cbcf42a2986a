//! Append-only security audit trail.
//!
//! Every security-relevant action writes exactly one row. The application
//! never updates or deletes entries; the user reference is nullable so
//! deleting an account does not break the trail.

use diesel::prelude::*;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{AuditLogEntry, NewAuditLogEntry};
use crate::schema::audit_log;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Register,
    Login,
    LoginFailed,
    Logout,
    TokenRotated,
    PasswordChanged,
    PasswordResetRequested,
    PasswordReset,
    RolesAssigned,
    UserStatusChanged,
    UserDeleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Register => "auth.register",
            AuditAction::Login => "auth.login",
            AuditAction::LoginFailed => "auth.login_failed",
            AuditAction::Logout => "auth.logout",
            AuditAction::TokenRotated => "auth.token_rotated",
            AuditAction::PasswordChanged => "auth.password_changed",
            AuditAction::PasswordResetRequested => "auth.password_reset_requested",
            AuditAction::PasswordReset => "auth.password_reset",
            AuditAction::RolesAssigned => "users.roles_assigned",
            AuditAction::UserStatusChanged => "users.status_changed",
            AuditAction::UserDeleted => "users.deleted",
        }
    }

    pub fn resource(&self) -> &'static str {
        match self {
            AuditAction::Register
            | AuditAction::Login
            | AuditAction::LoginFailed
            | AuditAction::Logout
            | AuditAction::TokenRotated
            | AuditAction::PasswordChanged
            | AuditAction::PasswordResetRequested
            | AuditAction::PasswordReset => "auth",
            AuditAction::RolesAssigned
            | AuditAction::UserStatusChanged
            | AuditAction::UserDeleted => "users",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct AuditService;

impl AuditService {
    #[instrument(skip(conn, details), fields(action = %action))]
    pub fn record(
        conn: &mut PgConnection,
        action: AuditAction,
        user_id: Option<Uuid>,
        details: serde_json::Value,
        ip_address: Option<String>,
    ) -> Result<AuditLogEntry, diesel::result::Error> {
        let entry = NewAuditLogEntry {
            user_id,
            action: action.as_str().to_string(),
            resource: action.resource().to_string(),
            details,
            ip_address,
        };

        let result = diesel::insert_into(audit_log::table)
            .values(&entry)
            .returning(AuditLogEntry::as_returning())
            .get_result(conn)?;

        debug!(entry_id = %result.id, "Audit entry written");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::Register.as_str(), "auth.register");
        assert_eq!(AuditAction::LoginFailed.as_str(), "auth.login_failed");
        assert_eq!(AuditAction::TokenRotated.as_str(), "auth.token_rotated");
        assert_eq!(AuditAction::RolesAssigned.as_str(), "users.roles_assigned");
    }

    #[test]
    fn test_audit_action_resource() {
        assert_eq!(AuditAction::Login.resource(), "auth");
        assert_eq!(AuditAction::PasswordReset.resource(), "auth");
        assert_eq!(AuditAction::UserDeleted.resource(), "users");
    }

    #[test]
    fn test_audit_service_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuditService>();
    }
}
