use std::time::Duration;

use config::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Backend connection settings
#[derive(serde::Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub refresh_timeout_seconds: u64,   // bound on the shared refresh call
    pub pending_timeout_seconds: u64,   // bound on a request queued behind a refresh
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_register_path")]
    pub register_path: String,
    /// UI route users are sent to when the session cannot be recovered
    #[serde(default = "default_login_route")]
    pub login_route: String,
}

impl ApiSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout_seconds: 30,
            refresh_timeout_seconds: 15,
            pending_timeout_seconds: 60,
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
            register_path: default_register_path(),
            login_route: default_login_route(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_seconds)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_seconds)
    }
}

#[derive(serde::Deserialize, Clone, Default)]
pub struct SessionSettings {
    /// Where credentials are persisted. In-memory only when absent.
    pub storage_path: Option<String>,
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_register_path() -> String {
    "/auth/register".to_string()
}

fn default_login_route() -> String {
    "/login".to_string()
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;
    settings.try_deserialize::<Settings>()
}
