pub mod client;
pub mod configuration;
pub mod error;
pub mod notice;
pub mod session;
pub mod telemetry;

pub use client::{ApiClient, ApiRequest, RequestOptions};
pub use error::{ApiError, AuthFailure};
