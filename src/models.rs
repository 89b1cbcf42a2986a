use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Recognized account types. The default role attached at registration
/// carries the same name as the account type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    Admin,
    Staff,
    Guest,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Admin => "admin",
            UserType::Staff => "staff",
            UserType::Guest => "guest",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(UserType::Admin),
            "staff" => Some(UserType::Staff),
            "guest" => Some(UserType::Guest),
            _ => None,
        }
    }

    pub fn default_role(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub user_type: String,
    pub is_active: bool,
    pub locale: String,
    pub timezone: String,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub user_type: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::staff_profiles)]
pub struct StaffProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "housekeeping")]
    pub department: String,
    #[schema(example = "EMP-0042")]
    pub employee_id: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::staff_profiles)]
pub struct NewStaffProfile {
    pub user_id: Uuid,
    pub department: String,
    pub employee_id: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::guest_profiles)]
pub struct GuestProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "412")]
    pub room_number: Option<String>,
    pub check_in: Option<NaiveDateTime>,
    pub check_out: Option<NaiveDateTime>,
    pub preferences: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::guest_profiles)]
pub struct NewGuestProfile {
    pub user_id: Uuid,
    pub room_number: Option<String>,
    pub check_in: Option<NaiveDateTime>,
    pub check_out: Option<NaiveDateTime>,
    pub preferences: serde_json::Value,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::roles)]
pub struct Role {
    pub id: Uuid,
    #[schema(example = "manager")]
    pub name: String,
    #[schema(example = "Operational oversight of bookings, alerts and reports")]
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::permissions)]
pub struct Permission {
    pub id: Uuid,
    #[schema(example = "bookings")]
    pub resource: String,
    #[schema(example = "read")]
    pub action: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Permission {
    /// The `resource:action` string embedded in access-token claims.
    pub fn claim(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::user_roles)]
pub struct NewUserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::refresh_tokens)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub device: Option<String>,
    pub expires_at: NaiveDateTime,
    pub revoked: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub device: Option<String>,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::password_reset_tokens)]
pub struct NewPasswordResetToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::audit_log)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[schema(example = "auth.login")]
    pub action: String,
    #[schema(example = "auth")]
    pub resource: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::audit_log)]
pub struct NewAuditLogEntry {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_parse() {
        assert_eq!(UserType::parse("admin"), Some(UserType::Admin));
        assert_eq!(UserType::parse("staff"), Some(UserType::Staff));
        assert_eq!(UserType::parse("guest"), Some(UserType::Guest));
        assert_eq!(UserType::parse("manager"), None);
        assert_eq!(UserType::parse("Admin"), None);
    }

    #[test]
    fn test_user_type_default_role_matches_name() {
        for user_type in [UserType::Admin, UserType::Staff, UserType::Guest] {
            assert_eq!(user_type.default_role(), user_type.as_str());
        }
    }
}
