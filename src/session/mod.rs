//! Asset-scoped session tokens
//!
//! Scanning a mold's code yields a short-lived token that can write records
//! for that one asset only. Tokens are stateless HS256 JWTs with their own
//! secret and audience, so an admin credential can never be replayed as a
//! session token or the other way round.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::types::{KeeperError, Result};

/// Audience claim that marks a token as an asset session
pub const SESSION_AUDIENCE: &str = "asset-session";

/// Header carrying a session token on write requests
pub const SESSION_HEADER: &str = "x-session-token";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    asset_id: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Issued token plus what the client needs to display about it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub token: String,
    pub asset_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks asset session tokens
#[derive(Clone)]
pub struct SessionAuthority {
    secret: String,
    ttl: Duration,
}

impl SessionAuthority {
    pub fn new(secret: String, ttl: Duration) -> Result<Self> {
        if secret.len() < 32 {
            return Err(KeeperError::Config(
                "SESSION_SECRET must be at least 32 characters".into(),
            ));
        }
        Ok(Self { secret, ttl })
    }

    /// Issue a token for `asset_id` valid for the default lifetime
    pub fn issue(&self, asset_id: &str) -> Result<SessionToken> {
        self.issue_at(asset_id, Utc::now(), self.ttl)
    }

    /// Issue with an explicit clock and lifetime
    pub fn issue_at(
        &self,
        asset_id: &str,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<SessionToken> {
        if asset_id.trim().is_empty() {
            return Err(KeeperError::invalid_field("assetId", "must not be empty"));
        }

        let iat = issued_at.timestamp();
        let exp = iat.saturating_add(ttl.as_secs().min(i64::MAX as u64) as i64);
        let claims = SessionClaims {
            asset_id: asset_id.to_string(),
            aud: SESSION_AUDIENCE.to_string(),
            iat,
            exp,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| KeeperError::Internal(format!("Failed to sign session token: {}", e)))?;

        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .ok_or_else(|| KeeperError::Internal("session expiry out of range".into()))?;

        Ok(SessionToken {
            token,
            asset_id: asset_id.to_string(),
            expires_at,
        })
    }

    /// Verify signature, audience and expiry; returns the scoped asset id
    pub fn validate(&self, token: &str) -> Result<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[SESSION_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "aud"]);

        match decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => Ok(data.claims.asset_id),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(KeeperError::Expired),
                ErrorKind::InvalidSignature => {
                    Err(KeeperError::Malformed("invalid signature".into()))
                }
                ErrorKind::InvalidAudience => {
                    Err(KeeperError::Malformed("not a session token".into()))
                }
                _ => {
                    debug!(error = %err, "Session token rejected");
                    Err(KeeperError::Malformed("invalid session token".into()))
                }
            },
        }
    }

    /// Validate, then require the token to be scoped to `target_asset_id`
    pub fn authorize_write(&self, token: &str, target_asset_id: &str) -> Result<()> {
        let token_asset = self.validate(token)?;
        if token_asset != target_asset_id {
            return Err(KeeperError::ScopeMismatch {
                token_asset,
                target_asset: target_asset_id.to_string(),
            });
        }
        Ok(())
    }
}
