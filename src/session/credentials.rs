use serde::{Deserialize, Serialize};

use crate::session::claims::SessionClaims;
use crate::error::ApiError;

/// Token pair of the signed-in user
///
/// The access token is always the one most recently issued by login,
/// registration or the last successful refresh.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Credentials after a refresh. The backend may or may not rotate the
    /// refresh token; the previous one is kept when it does not.
    pub fn refreshed(&self, access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
        }
    }

    pub fn claims(&self) -> Result<SessionClaims, ApiError> {
        SessionClaims::decode_unverified(&self.access_token)
    }
}
