/// Client Error Handling
///
/// Every request made through the client ends in either a response or one
/// `ApiError`. This module covers:
/// 1. Why an authenticated session could not be recovered
/// 2. The unified error delivered to callers
/// 3. The typed backend error envelope used for user-facing messages

use reqwest::StatusCode;
use serde::Deserialize;
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. SESSION RECOVERY FAILURES
/// ============================================================================

/// Reasons a 401 could not be recovered by refreshing the access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// No refresh token was stored when the 401 arrived; carries the
    /// backend's message from that 401
    MissingRefreshToken(String),
    /// The refresh endpoint answered with a non-2xx status
    RefreshRejected(StatusCode),
    /// The refresh call never produced a usable answer
    RefreshFailed(String),
    /// The request was rejected again after replaying it with a fresh token
    StillUnauthorized(String),
}

impl AuthFailure {
    /// Message of the 401 that ended the session, when the backend sent one
    pub fn unauthorized_message(&self) -> Option<&str> {
        match self {
            AuthFailure::MissingRefreshToken(message) | AuthFailure::StillUnauthorized(message) => {
                Some(message.as_str())
            }
            _ => None,
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::MissingRefreshToken(message) => {
                write!(f, "no refresh token stored ({})", message)
            }
            AuthFailure::RefreshRejected(status) => {
                write!(f, "refresh rejected with status {}", status.as_u16())
            }
            AuthFailure::RefreshFailed(reason) => write!(f, "refresh failed: {}", reason),
            AuthFailure::StillUnauthorized(message) => {
                write!(f, "still unauthorized after refresh ({})", message)
            }
        }
    }
}

/// ============================================================================
/// 2. UNIFIED CLIENT ERROR TYPE
/// ============================================================================

/// Error delivered to the caller of a request.
///
/// `Clone` because one refresh failure is fanned out to every request that
/// was queued behind it.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// The backend answered with an error status that was not recovered
    Http { status: StatusCode, message: String },
    /// The session is gone; credentials were cleared and the user sent to login
    SessionExpired(AuthFailure),
    /// The request never reached the server
    Offline(String),
    Network(String),
    Timeout(String),
    Decode(String),
    Storage(String),
    /// The refresh this request was waiting on was abandoned
    Cancelled,
}

impl ApiError {
    /// Status code of the backend answer, if there was one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::SessionExpired(AuthFailure::RefreshRejected(status)) => Some(*status),
            ApiError::SessionExpired(
                AuthFailure::MissingRefreshToken(_) | AuthFailure::StillUnauthorized(_),
            ) => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }

    /// Build an `Http` error from an error response, consuming its body
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        ApiError::Http {
            status,
            message: ErrorEnvelope::read_message(response).await,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http { status, message } => {
                write!(f, "HTTP {}: {}", status.as_u16(), message)
            }
            ApiError::SessionExpired(reason) => write!(f, "Session expired: {}", reason),
            ApiError::Offline(msg) => write!(f, "Server unreachable: {}", msg),
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            ApiError::Decode(msg) => write!(f, "Invalid response body: {}", msg),
            ApiError::Storage(msg) => write!(f, "Credential storage error: {}", msg),
            ApiError::Cancelled => write!(f, "Token refresh was abandoned"),
        }
    }
}

impl StdError for ApiError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_connect() {
            ApiError::Offline(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

// ============================================================================
// 3. BACKEND ERROR ENVELOPE
// ============================================================================

/// Error body the backend may attach to a non-2xx response
#[derive(Debug, Default, Deserialize)]
pub struct ErrorEnvelope {
    pub error: Option<String>,
    pub message: Option<String>,
}

impl ErrorEnvelope {
    /// Message to show the user: `error`, then `message`, then a fallback
    pub fn message_from_body(status: StatusCode, body: &[u8]) -> String {
        serde_json::from_slice::<ErrorEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.error.or(envelope.message))
            .filter(|msg| !msg.trim().is_empty())
            .unwrap_or_else(|| fallback_message(status))
    }

    /// Consume an error response and extract its user-facing message
    pub(crate) async fn read_message(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        Self::message_from_body(status, &body)
    }
}

fn fallback_message(status: StatusCode) -> String {
    format!("Request failed with status {}", status.as_u16())
}
