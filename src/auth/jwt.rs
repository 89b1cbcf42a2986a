//! Access-token generation and verification.
//!
//! Access tokens are short-lived Ed25519-signed JWTs carrying the user's
//! identity plus the role names and `resource:action` permission strings in
//! effect at issue time. Verification is purely computational; a role change
//! only takes effect for tokens issued afterwards.

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub email: String,
    pub user_type: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Verified claims, flattened for handler use.
#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub user_type: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Role/permission check against the embedded claims only. Ownership
    /// exceptions (a user acting on their own record) are the calling
    /// endpoint's business, not this primitive's.
    pub fn authorize(&self, resource: &str, action: &str) -> bool {
        let required = format!("{}:{}", resource, action);
        self.permissions.iter().any(|p| p == &required)
    }
}

/// Verification failures, split so callers can prompt a refresh for expired
/// tokens and a full re-login for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::Invalid => write!(f, "Token is invalid"),
        }
    }
}

impl std::error::Error for TokenError {}

#[derive(Clone)]
pub struct JwtConfig {
    key_pair: Arc<Ed25519KeyPair>,
    public_key: Arc<Ed25519PublicKey>,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl JwtConfig {
    /// Expects JWT_PRIVATE_KEY env var (base64-encoded Ed25519 key).
    pub fn from_env() -> Self {
        Self::from_env_with_expiry(3600, 604800, None, None)
    }

    pub fn from_env_with_expiry(
        access_token_expiry: i64,
        refresh_token_expiry: i64,
        issuer: Option<String>,
        audience: Option<String>,
    ) -> Self {
        use base64::Engine;

        let private_key_b64 =
            std::env::var("JWT_PRIVATE_KEY").expect("JWT_PRIVATE_KEY must be set");

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&private_key_b64)
            .expect("JWT_PRIVATE_KEY must be valid base64");

        let key_pair = Ed25519KeyPair::from_bytes(&key_bytes)
            .expect("JWT_PRIVATE_KEY must be a valid Ed25519 key");

        let public_key = key_pair.public_key();

        Self {
            key_pair: Arc::new(key_pair),
            public_key: Arc::new(public_key),
            access_token_expiry,
            refresh_token_expiry,
            issuer,
            audience,
        }
    }

    pub fn from_key_pair(key_pair: Ed25519KeyPair) -> Self {
        let public_key = key_pair.public_key();
        Self {
            key_pair: Arc::new(key_pair),
            public_key: Arc::new(public_key),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            issuer: None,
            audience: None,
        }
    }

    pub fn generate_key_pair() -> (String, String) {
        use base64::Engine;

        let key_pair = Ed25519KeyPair::generate();
        let private_b64 = base64::engine::general_purpose::STANDARD.encode(key_pair.to_bytes());
        let public_b64 =
            base64::engine::general_purpose::STANDARD.encode(key_pair.public_key().to_bytes());
        (private_b64, public_b64)
    }

    pub fn public_key(&self) -> &Ed25519PublicKey {
        &self.public_key
    }

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        user_type: &str,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Result<String, jwt_simple::Error> {
        let custom_claims = AccessClaims {
            email: email.to_string(),
            user_type: user_type.to_string(),
            roles,
            permissions,
        };

        let mut claims = jwt_simple::claims::Claims::with_custom_claims(
            custom_claims,
            Duration::from_secs(self.access_token_expiry as u64),
        )
        .with_subject(user_id.to_string());

        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }

        self.key_pair.sign(claims)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        let mut options = VerificationOptions::default();
        if let Some(issuer) = &self.issuer {
            options.allowed_issuers = Some(std::collections::HashSet::from([issuer.clone()]));
        }
        if let Some(audience) = &self.audience {
            options.allowed_audiences = Some(std::collections::HashSet::from([audience.clone()]));
        }

        let token_data = self
            .public_key
            .verify_token::<AccessClaims>(token, Some(options))
            .map_err(classify_error)?;

        Ok(Claims {
            sub: token_data.subject.unwrap_or_default(),
            email: token_data.custom.email,
            user_type: token_data.custom.user_type,
            roles: token_data.custom.roles,
            permissions: token_data.custom.permissions,
            exp: token_data
                .expires_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
            iat: token_data
                .issued_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
        })
    }
}

fn classify_error(err: jwt_simple::Error) -> TokenError {
    match err.downcast_ref::<jwt_simple::JWTError>() {
        Some(jwt_simple::JWTError::TokenHasExpired) => TokenError::Expired,
        _ => TokenError::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        let key_pair = Ed25519KeyPair::generate();
        JwtConfig::from_key_pair(key_pair)
    }

    #[test]
    fn test_generate_and_verify_access_token() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = config
            .generate_access_token(
                user_id,
                "guest@hotel.test",
                "guest",
                vec!["guest".to_string()],
                vec!["bookings:read".to_string(), "alerts:create".to_string()],
            )
            .expect("Token generation should succeed");

        let claims = config
            .verify_access_token(&token)
            .expect("Token verification should succeed");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "guest@hotel.test");
        assert_eq!(claims.user_type, "guest");
        assert_eq!(claims.roles, vec!["guest"]);
        assert!(claims.authorize("bookings", "read"));
        assert!(claims.authorize("alerts", "create"));
        assert!(!claims.authorize("users", "manage"));
    }

    #[test]
    fn test_authorize_requires_exact_permission_string() {
        let config = test_config();
        let token = config
            .generate_access_token(
                Uuid::new_v4(),
                "staff@hotel.test",
                "staff",
                vec!["staff".to_string()],
                vec!["bookings:update".to_string()],
            )
            .unwrap();

        let claims = config.verify_access_token(&token).unwrap();
        assert!(claims.authorize("bookings", "update"));
        assert!(!claims.authorize("bookings", "delete"));
        assert!(!claims.authorize("booking", "update"));
    }

    #[test]
    fn test_invalid_token_fails_verification() {
        let config = test_config();
        let result = config.verify_access_token("invalid.token.here");
        assert_eq!(result.unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let config1 = test_config();
        let config2 = test_config();

        let token = config1
            .generate_access_token(Uuid::new_v4(), "a@b.c", "guest", vec![], vec![])
            .expect("Token generation should succeed");

        assert_eq!(
            config2.verify_access_token(&token).unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn test_expired_error_is_classified_as_expired() {
        let err: jwt_simple::Error = jwt_simple::JWTError::TokenHasExpired.into();
        assert_eq!(classify_error(err), TokenError::Expired);
    }

    #[test]
    fn test_key_generation_round_trip() {
        let (private_b64, _) = JwtConfig::generate_key_pair();

        use base64::Engine;
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&private_b64)
            .unwrap();
        let key_pair = Ed25519KeyPair::from_bytes(&key_bytes).unwrap();
        let config = JwtConfig::from_key_pair(key_pair);

        let token = config
            .generate_access_token(Uuid::new_v4(), "a@b.c", "admin", vec![], vec![])
            .unwrap();
        assert!(config.verify_access_token(&token).is_ok());
    }
}
