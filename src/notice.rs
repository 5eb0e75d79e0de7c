/// User-facing side effects of failed requests
///
/// The client never renders anything itself. It classifies terminal errors
/// into a `Notice` for a `Notifier`, and asks a `Navigator` to send the user
/// to the login route when the session cannot be recovered.

use std::fmt;

use crate::error::ApiError;

/// Passive notification raised for a failed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    PermissionDenied,
    NotFound,
    ServerError,
    /// Other 4xx; carries the backend's message verbatim
    Rejected(String),
    Offline,
}

impl Notice {
    /// Classify a terminal error.
    ///
    /// A session that ended on a 401 is still an ordinary 4xx for the user and
    /// echoes the backend's message. A failed refresh has no notice: the login
    /// redirect is its reaction.
    pub fn for_error(err: &ApiError) -> Option<Notice> {
        match err {
            ApiError::Http { status, message } => {
                if status.as_u16() == 403 {
                    Some(Notice::PermissionDenied)
                } else if status.as_u16() == 404 {
                    Some(Notice::NotFound)
                } else if status.is_server_error() {
                    Some(Notice::ServerError)
                } else if status.is_client_error() {
                    Some(Notice::Rejected(message.clone()))
                } else {
                    None
                }
            }
            ApiError::SessionExpired(failure) => failure
                .unauthorized_message()
                .map(|message| Notice::Rejected(message.to_string())),
            ApiError::Offline(_) => Some(Notice::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PermissionDenied => write!(f, "You don't have permission to do that"),
            Notice::NotFound => write!(f, "The requested resource was not found"),
            Notice::ServerError => write!(f, "Something went wrong on our side. Please try again"),
            Notice::Rejected(message) => write!(f, "{}", message),
            Notice::Offline => write!(f, "You appear to be offline. Check your connection"),
        }
    }
}

/// Receives notices for display (toasts, status bars, logs)
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Moves the user to another route of the host application
pub trait Navigator: Send + Sync {
    fn redirect_to(&self, route: &str);
}

/// Logs notices instead of showing them
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        tracing::warn!(notice = %notice, "Request failed");
    }
}

/// Logs redirects instead of performing them
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn redirect_to(&self, route: &str) {
        tracing::info!(route = %route, "Redirecting to login");
    }
}
