/// Access token claims, decoded locally
///
/// The client reads identity claims out of the access token to make routing
/// and display decisions (which dashboard, which tenant). The signature is
/// NOT verified here. These claims must never be treated as proof of
/// identity: the backend verifies every token it receives.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Claims carried by an access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Subject (user id)
    pub sub: String,
    /// Role inside the tenant (owner, agent, admin ...)
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: Option<i64>,
}

impl SessionClaims {
    /// Decode the claims of `token` without verifying its signature
    ///
    /// # Errors
    /// Returns `ApiError::Decode` if the token is not a well-formed JWT
    pub fn decode_unverified(token: &str) -> Result<Self, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<SessionClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Access token claims could not be decoded: {}", e);
                ApiError::Decode(format!("Malformed access token: {}", e))
            })
    }

    /// Check if the access token has expired
    pub fn is_expired(&self) -> bool {
        let now = Utc::now().timestamp();
        self.exp < now
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}
