/// Authenticated API client
///
/// Sends requests to the backend with the current access token attached and
/// recovers transparently from an expired access token: the first request
/// that gets a 401 refreshes the token, every other request that gets a 401
/// meanwhile waits for that same refresh, and each of them is replayed once
/// with the new token.

mod auth;
mod refresh;
mod request;

pub use auth::{LoginRequest, RefreshRequest, RegisterRequest, TokenPair};
pub use request::{ApiRequest, RequestOptions};

use std::sync::Arc;

use futures::future::join_all;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::configuration::{ApiSettings, Settings};
use crate::error::{ApiError, AuthFailure, ErrorEnvelope};
use crate::notice::{Navigator, Notice, Notifier, TracingNavigator, TracingNotifier};
use crate::session::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};
use refresh::{Outcome, PendingRetry, RefreshCoordinator, RefreshGuard, Ticket};

#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    settings: Arc<ApiSettings>,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    refresh: Arc<RefreshCoordinator>,
}

impl ApiClient {
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be built
    pub fn new(settings: &ApiSettings, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            http_client,
            settings: Arc::new(settings.clone()),
            store,
            notifier: Arc::new(TracingNotifier),
            navigator: Arc::new(TracingNavigator),
            refresh: Arc::new(RefreshCoordinator::default()),
        })
    }

    /// Build a client whose credentials live where the settings say
    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        let store: Arc<dyn CredentialStore> = match &settings.session.storage_path {
            Some(path) => Arc::new(FileCredentialStore::open(path)?),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        Self::new(&settings.api, store)
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn credentials(&self) -> Result<Option<Credentials>, ApiError> {
        self.store.load()
    }

    pub fn refresh_in_progress(&self) -> bool {
        self.refresh.in_progress()
    }

    /// Send a request to the backend.
    ///
    /// An expired access token is refreshed and the request replayed once,
    /// invisibly to the caller. Every other failure is returned as is, after
    /// raising a notice unless `options.suppress_notice` is set.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Response, ApiError> {
        let request = ApiRequest::new(method, path, body, options);
        let request_id = request.request_id;

        let outcome = self.execute(request).await;

        if let Err(err) = &outcome {
            tracing::warn!(
                request_id = %request_id,
                path = %path,
                error = %err,
                "Request failed"
            );
            if !options.suppress_notice {
                if let Some(notice) = Notice::for_error(err) {
                    self.notifier.notify(&notice);
                }
            }
        }

        outcome
    }

    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.request(Method::GET, path, None, RequestOptions::default()).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.get(path).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(body), RequestOptions::default()).await
    }

    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, Some(body), RequestOptions::default()).await
    }

    pub async fn patch<B: Serialize>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, path, Some(body), RequestOptions::default()).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, ApiError> {
        self.request(Method::DELETE, path, None, RequestOptions::default()).await
    }

    async fn send(&self, request: &mut ApiRequest) -> Result<Response, ApiError> {
        let access_token = self.store.load()?.map(|credentials| credentials.access_token);

        let mut builder = self
            .http_client
            .request(request.method.clone(), self.settings.url(&request.path))
            .header("x-request-id", request.request_id.to_string());
        if let Some(token) = &access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        request.sent_token = access_token;

        tracing::debug!(
            request_id = %request.request_id,
            method = %request.method,
            path = %request.path,
            retried = request.retried,
            "Sending request"
        );

        builder.send().await.map_err(|e| {
            tracing::warn!(request_id = %request.request_id, "Request did not complete: {}", e);
            ApiError::from(e)
        })
    }

    async fn into_result(response: Response) -> Outcome {
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(response)
        } else {
            Err(ApiError::from_response(response).await)
        }
    }

    async fn execute(&self, mut request: ApiRequest) -> Outcome {
        let response = self.send(&mut request).await?;

        if response.status() != StatusCode::UNAUTHORIZED || request.options.skip_refresh {
            return Self::into_result(response).await;
        }

        let message = ErrorEnvelope::read_message(response).await;
        self.recover(request.mark_retried(), message).await
    }

    /// Send a request that already went through refresh recovery. A second
    /// 401 ends the session instead of refreshing again.
    async fn replay(&self, mut request: ApiRequest) -> Outcome {
        debug_assert!(request.is_retried());
        let response = self.send(&mut request).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                request_id = %request.request_id,
                path = %request.path,
                "Still unauthorized after token refresh"
            );
            let message = ErrorEnvelope::read_message(response).await;
            return Err(self.expire_session(AuthFailure::StillUnauthorized(message), false));
        }

        Self::into_result(response).await
    }

    /// `message` is what the backend said in the 401 that started recovery
    async fn recover(&self, request: ApiRequest, message: String) -> Outcome {
        match self.refresh.join(request, self.store.as_ref())? {
            Ticket::Refresh {
                guard,
                request,
                credentials,
                refresh_token,
            } => self.lead_refresh(guard, request, credentials, &refresh_token).await,
            Ticket::Queued(waiter) => match tokio::time::timeout(self.settings.pending_timeout(), waiter).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(ApiError::Cancelled),
                Err(_) => {
                    tracing::warn!("Gave up waiting for token refresh");
                    Err(ApiError::Timeout("waiting for token refresh".to_string()))
                }
            },
            Ticket::Replay(request) => {
                tracing::debug!(
                    request_id = %request.request_id,
                    "Access token changed since the request was sent; replaying"
                );
                self.replay(request).await
            }
            Ticket::NoRefreshToken(request) => {
                tracing::warn!(request_id = %request.request_id, "Unauthorized and no refresh token stored");
                // Sent without any token: there was no session left to clear
                let signed_out = request.sent_token.is_none();
                Err(self.expire_session(AuthFailure::MissingRefreshToken(message), signed_out))
            }
        }
    }

    async fn lead_refresh(
        &self,
        guard: RefreshGuard<'_>,
        request: ApiRequest,
        credentials: Credentials,
        refresh_token: &str,
    ) -> Outcome {
        tracing::info!(request_id = %request.request_id, "Access token expired; refreshing");

        let refreshed = match self.call_refresh(refresh_token).await {
            Ok(tokens) => credentials.refreshed(tokens.access_token, tokens.refresh_token),
            Err(failure) => {
                let err = self.expire_session(failure, true);
                let pending = guard.settle();
                tracing::warn!(queued = pending.len(), "Token refresh failed; rejecting queued requests");
                for retry in pending {
                    retry.complete(Err(err.clone()));
                }
                return Err(err);
            }
        };

        if let Err(err) = self.store.save(&refreshed) {
            tracing::error!(error = %err, "Failed to persist refreshed credentials");
            for retry in guard.settle() {
                retry.complete(Err(err.clone()));
            }
            return Err(err);
        }

        let pending = guard.settle();
        tracing::info!(
            request_id = %request.request_id,
            queued = pending.len(),
            "Token refreshed successfully"
        );

        let (_, outcome) = futures::join!(self.replay_pending(pending), self.replay(request));
        outcome
    }

    /// Replay queued requests with the new token. They are issued in the
    /// order they were queued and completed in that same order.
    async fn replay_pending(&self, pending: Vec<PendingRetry>) {
        let live: Vec<PendingRetry> = pending.into_iter().filter(|retry| !retry.is_abandoned()).collect();
        let outcomes = join_all(live.iter().map(|retry| self.replay(retry.request.clone()))).await;

        for (retry, outcome) in live.into_iter().zip(outcomes) {
            retry.complete(outcome);
        }
    }

    async fn call_refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthFailure> {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })
        .map_err(|e| AuthFailure::RefreshFailed(e.to_string()))?;
        let mut request = ApiRequest::new(
            Method::POST,
            self.settings.refresh_path.clone(),
            Some(body),
            RequestOptions::without_refresh().suppress_notice(),
        );

        let response = match tokio::time::timeout(self.settings.refresh_timeout(), self.send(&mut request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(AuthFailure::RefreshFailed(err.to_string())),
            Err(_) => return Err(AuthFailure::RefreshFailed("refresh call timed out".to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AuthFailure::RefreshRejected(status));
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| AuthFailure::RefreshFailed(format!("unexpected refresh response: {}", e)))
    }

    /// Clear credentials and send the user to login.
    ///
    /// Several replays can fail at once; only the one that actually removed
    /// the credentials redirects, unless `always_redirect` is set.
    fn expire_session(&self, failure: AuthFailure, always_redirect: bool) -> ApiError {
        let had_session = match self.store.clear() {
            Ok(had_session) => had_session,
            Err(err) => {
                tracing::error!(error = %err, "Failed to clear credentials");
                true
            }
        };

        tracing::warn!(reason = %failure, "Session expired");
        if had_session || always_redirect {
            self.navigator.redirect_to(&self.settings.login_route);
        }

        ApiError::SessionExpired(failure)
    }
}
