use reqwest::Method;
use serde_json::Value;
use uuid::Uuid;

/// Per-call behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Caller shows its own error messages; raise no notice
    pub suppress_notice: bool,
    /// Never try to recover a 401 for this call (used by the refresh call
    /// itself and by login)
    pub skip_refresh: bool,
}

impl RequestOptions {
    pub fn quiet() -> Self {
        Self {
            suppress_notice: true,
            ..Self::default()
        }
    }

    pub fn without_refresh() -> Self {
        Self {
            skip_refresh: true,
            ..Self::default()
        }
    }

    pub fn suppress_notice(mut self) -> Self {
        self.suppress_notice = true;
        self
    }
}

/// One logical request, kept so it can be replayed after a refresh
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub request_id: Uuid,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub options: RequestOptions,
    /// Access token attached on the last send
    pub(crate) sent_token: Option<String>,
    /// One-shot guard: set once the request entered refresh recovery
    pub(crate) retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>, options: RequestOptions) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method,
            path: path.into(),
            body,
            options,
            sent_token: None,
            retried: false,
        }
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(mut self) -> Self {
        self.retried = true;
        self
    }
}
