/// Session lifecycle
///
/// Login and registration create the stored credentials, the refresh flow
/// replaces them, logout destroys them.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::request::RequestOptions;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::session::{Credentials, SessionClaims};

/// User login request
#[derive(Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// User registration request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/refresh`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Tokens issued by login, registration and refresh
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    /// Present only when the backend rotated the refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl ApiClient {
    /// POST the login form and store the issued credentials.
    ///
    /// A 401 here means wrong credentials, so refresh recovery is skipped.
    pub async fn login(&self, form: &LoginRequest) -> Result<Credentials, ApiError> {
        let path = self.settings.login_path.clone();
        self.start_session(&path, form).await
    }

    pub async fn register(&self, form: &RegisterRequest) -> Result<Credentials, ApiError> {
        let path = self.settings.register_path.clone();
        self.start_session(&path, form).await
    }

    async fn start_session<B: Serialize>(&self, path: &str, form: &B) -> Result<Credentials, ApiError> {
        let body = serde_json::to_value(form)?;
        let response = self
            .request(Method::POST, path, Some(body), RequestOptions::without_refresh())
            .await?;
        let tokens: TokenPair = response.json().await?;

        let credentials = Credentials {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        };
        self.store.save(&credentials)?;

        tracing::info!(path = %path, "Session started");
        Ok(credentials)
    }

    /// Destroy the session and send the user to the login route
    pub fn logout(&self) -> Result<(), ApiError> {
        self.store.clear()?;
        self.navigator.redirect_to(&self.settings.login_route);
        tracing::info!("Logged out");
        Ok(())
    }

    /// Claims of the persisted session, e.g. after an application restart
    pub fn restore_session(&self) -> Result<Option<SessionClaims>, ApiError> {
        let claims = self.claims()?;
        match &claims {
            Some(claims) => tracing::info!(
                user_id = %claims.sub,
                access_expired = claims.is_expired(),
                "Session restored"
            ),
            None => tracing::debug!("No session to restore"),
        }
        Ok(claims)
    }

    /// Claims of the current access token, decoded without verification.
    /// Only fit for routing and display decisions.
    pub fn claims(&self) -> Result<Option<SessionClaims>, ApiError> {
        self.store
            .load()?
            .map(|credentials| credentials.claims())
            .transpose()
    }

    /// Whether credentials are stored. An expired access token still counts:
    /// the next request recovers it through a refresh.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.store.load(), Ok(Some(_)))
    }
}
