//! JWT handling for staff credentials
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - Default expiry is 1 hour
//! - In production, JWT_SECRET should be a strong random value from environment

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::Role;
use crate::types::KeeperError;

/// Payload stored in a staff token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Staff identifier
    pub sub: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub subject: String,
    pub role: Role,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
    /// Decoder failure, kept so callers can tell expiry from tampering
    pub kind: Option<ErrorKind>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
            kind: None,
        }
    }

    pub fn invalid(kind: ErrorKind) -> Self {
        let error = match kind {
            ErrorKind::ExpiredSignature => "Token expired",
            ErrorKind::InvalidToken => "Invalid token",
            ErrorKind::InvalidSignature => "Invalid signature",
            _ => "Token validation failed",
        };
        Self {
            valid: false,
            claims: None,
            error: Some(error.to_string()),
            kind: Some(kind),
        }
    }

    /// Map to the error taxonomy used by request handlers
    pub fn into_claims(self) -> Result<Claims, KeeperError> {
        match (self.claims, self.kind) {
            (Some(claims), None) if self.valid => Ok(claims),
            (_, Some(ErrorKind::ExpiredSignature)) => Err(KeeperError::Expired),
            _ => Err(KeeperError::Malformed(
                self.error
                    .unwrap_or_else(|| "Token validation failed".into()),
            )),
        }
    }
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, KeeperError> {
        if secret.is_empty() {
            return Err(KeeperError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(KeeperError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    pub fn generate_token(&self, input: TokenInput) -> Result<String, KeeperError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| KeeperError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: input.subject,
            role: input.role,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| KeeperError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a staff token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let mut validation = Validation::default();
        validation.leeway = 0;

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => TokenValidationResult::invalid(err.into_kind()),
        }
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> JwtValidator {
        JwtValidator::new("admin-secret-that-is-at-least-32-characters".into(), 3600).unwrap()
    }

    #[test]
    fn test_generate_and_verify() {
        let v = validator();
        let token = v
            .generate_token(TokenInput {
                subject: "lead@plant".into(),
                role: Role::Manager,
            })
            .unwrap();

        let claims = v.verify_token(&token).into_claims().unwrap();
        assert_eq!(claims.sub, "lead@plant");
        assert_eq!(claims.role, Role::Manager);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_secret_requirements() {
        assert!(JwtValidator::new(String::new(), 60).is_err());
        assert!(JwtValidator::new("short".into(), 60).is_err());
    }

    #[test]
    fn test_expired_token() {
        let v = validator();
        let claims = Claims {
            sub: "old".into(),
            role: Role::Admin,
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("admin-secret-that-is-at-least-32-characters".as_bytes()),
        )
        .unwrap();

        let result = v.verify_token(&token);
        assert!(!result.valid);
        assert!(matches!(result.into_claims(), Err(KeeperError::Expired)));
    }

    #[test]
    fn test_expiry_decided_by_kind_not_message() {
        let mut forged = TokenValidationResult::invalid(ErrorKind::InvalidSignature);
        forged.error = Some("Token expired".into());
        assert!(matches!(forged.into_claims(), Err(KeeperError::Malformed(_))));

        let expired = TokenValidationResult::invalid(ErrorKind::ExpiredSignature);
        assert!(matches!(expired.into_claims(), Err(KeeperError::Expired)));
    }

    #[test]
    fn test_foreign_signature() {
        let other = JwtValidator::new("another-secret-that-is-at-least-32-chars".into(), 60)
            .unwrap();
        let token = other
            .generate_token(TokenInput {
                subject: "x".into(),
                role: Role::Admin,
            })
            .unwrap();
        assert!(matches!(
            validator().verify_token(&token).into_claims(),
            Err(KeeperError::Malformed(_))
        ));
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_header(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_token_from_header(Some("abc")), Some("abc"));
        assert_eq!(extract_token_from_header(Some("Basic a b")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}
