//! Refresh-token persistence and the rotation protocol.
//!
//! Refresh tokens are opaque 32-byte random values; only a SHA-256 hash is
//! persisted. A stored token moves from `active` to `revoked` exactly once,
//! or ages out via `expires_at`; no transition leaves either terminal state.
//! Rotation revokes the presented token with a conditional update and checks
//! the affected-row count, so two racing rotations of the same value let at
//! most one mint a new pair.

use chrono::{Duration, Utc};
use diesel::prelude::*;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditService};
use crate::auth::jwt::JwtConfig;
use crate::models::{NewRefreshToken, RefreshToken, User};
use crate::rbac;
use crate::schema::{refresh_tokens, users};

/// SHA-256 hex digest used for both refresh and reset token storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// 32 bytes from the OS CSPRNG, hex-encoded. Meaningless without the
/// database row holding its hash.
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug)]
pub enum TokenServiceError {
    /// No row matches the presented value.
    NotFound,
    /// The row exists but is past expiry or already revoked. Replay of a
    /// rotated token lands here.
    ExpiredOrRevoked,
    AccountDisabled,
    Jwt(jwt_simple::Error),
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for TokenServiceError {
    fn from(err: diesel::result::Error) -> Self {
        TokenServiceError::Db(err)
    }
}

impl std::fmt::Display for TokenServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenServiceError::NotFound => write!(f, "Refresh token not found"),
            TokenServiceError::ExpiredOrRevoked => {
                write!(f, "Refresh token has expired or been revoked")
            }
            TokenServiceError::AccountDisabled => write!(f, "Account is disabled"),
            TokenServiceError::Jwt(e) => write!(f, "Token signing failed: {}", e),
            TokenServiceError::Db(e) => write!(f, "Database error: {}", e),
        }
    }
}

pub struct TokenService;

impl TokenService {
    /// Mints an access/refresh pair for the user. Roles and permissions are
    /// loaded here and embedded in the access token; this is the only place
    /// the permission set is computed.
    pub fn issue_pair(
        conn: &mut PgConnection,
        jwt: &JwtConfig,
        user: &User,
        device: Option<String>,
    ) -> Result<IssuedTokens, TokenServiceError> {
        let (roles, permissions) = rbac::load_claims_for_user(conn, user.id)?;

        let access_token = jwt
            .generate_access_token(
                user.id,
                &user.email,
                &user.user_type,
                roles.clone(),
                permissions.clone(),
            )
            .map_err(TokenServiceError::Jwt)?;

        let refresh_token = generate_opaque_token();
        let expires_at = (Utc::now() + Duration::seconds(jwt.refresh_token_expiry)).naive_utc();

        diesel::insert_into(refresh_tokens::table)
            .values(&NewRefreshToken {
                user_id: user.id,
                token_hash: hash_token(&refresh_token),
                device,
                expires_at,
            })
            .execute(conn)?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            roles,
            permissions,
        })
    }

    /// Exchanges a refresh token for a new pair, invalidating the old one.
    ///
    /// Runs as one transaction: a crash between revoking the old token and
    /// persisting the new one rolls the revocation back, so the user is never
    /// left without a valid token. The revocation itself is conditional on
    /// `revoked = false`; when two requests race on the same value, the loser
    /// sees zero affected rows and fails with `ExpiredOrRevoked`.
    pub fn rotate(
        conn: &mut PgConnection,
        jwt: &JwtConfig,
        presented: &str,
        ip_address: Option<String>,
    ) -> Result<(User, IssuedTokens), TokenServiceError> {
        let token_hash = hash_token(presented);

        conn.transaction::<_, TokenServiceError, _>(|conn| {
            let stored: RefreshToken = refresh_tokens::table
                .filter(refresh_tokens::token_hash.eq(&token_hash))
                .select(RefreshToken::as_select())
                .first(conn)
                .optional()?
                .ok_or(TokenServiceError::NotFound)?;

            let now = Utc::now().naive_utc();
            if stored.revoked || stored.expires_at < now {
                warn!(token_id = %stored.id, user_id = %stored.user_id, "Replay of expired or revoked refresh token");
                return Err(TokenServiceError::ExpiredOrRevoked);
            }

            let revoked_rows = diesel::update(
                refresh_tokens::table
                    .filter(refresh_tokens::id.eq(stored.id))
                    .filter(refresh_tokens::revoked.eq(false)),
            )
            .set(refresh_tokens::revoked.eq(true))
            .execute(conn)?;

            // Lost the race against a concurrent rotation of the same value.
            if revoked_rows == 0 {
                return Err(TokenServiceError::ExpiredOrRevoked);
            }

            let user: User = users::table
                .filter(users::id.eq(stored.user_id))
                .select(User::as_select())
                .first(conn)?;

            if !user.is_active {
                return Err(TokenServiceError::AccountDisabled);
            }

            let issued = Self::issue_pair(conn, jwt, &user, stored.device.clone())?;

            AuditService::record(
                conn,
                AuditAction::TokenRotated,
                Some(user.id),
                serde_json::json!({ "rotated_from": stored.id }),
                ip_address,
            )?;

            info!(user_id = %user.id, old_token_id = %stored.id, "Refresh token rotated");
            Ok((user, issued))
        })
    }

    /// Marks the presented token revoked. Zero affected rows is reported as
    /// `NotFound`: an already-revoked or unknown token both map to 404 at the
    /// API boundary, matching the affected-row-count semantics above.
    pub fn revoke(
        conn: &mut PgConnection,
        presented: &str,
    ) -> Result<Uuid, TokenServiceError> {
        let token_hash = hash_token(presented);

        let user_id: Option<Uuid> = diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::token_hash.eq(&token_hash))
                .filter(refresh_tokens::revoked.eq(false)),
        )
        .set(refresh_tokens::revoked.eq(true))
        .returning(refresh_tokens::user_id)
        .get_result(conn)
        .optional()?;

        user_id.ok_or(TokenServiceError::NotFound)
    }

    /// Revokes every active refresh token the user holds; used by password
    /// change and reset to force re-authentication on all devices.
    pub fn revoke_all_for_user(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<usize, diesel::result::Error> {
        diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::user_id.eq(user_id))
                .filter(refresh_tokens::revoked.eq(false)),
        )
        .set(refresh_tokens::revoked.eq(true))
        .execute(conn)
    }

    /// Opportunistic retention cleanup of the caller's expired rows, run at
    /// login. Bulk cleanup across users is an out-of-band batch job.
    pub fn cleanup_expired(conn: &mut PgConnection, user_id: Uuid) {
        let now = Utc::now().naive_utc();
        let result = diesel::delete(
            refresh_tokens::table
                .filter(refresh_tokens::user_id.eq(user_id))
                .filter(refresh_tokens::expires_at.lt(now)),
        )
        .execute(conn);

        if let Ok(count) = result {
            if count > 0 {
                info!(user_id = %user_id, deleted_count = count, "Cleaned up expired refresh tokens");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_token_entropy() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_token_is_stable() {
        let token = generate_opaque_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_eq!(hash_token(&token).len(), 64);
    }
}
