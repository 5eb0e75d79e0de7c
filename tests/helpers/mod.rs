#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

use convo_api::configuration::ApiSettings;
use convo_api::notice::{Navigator, Notice, Notifier};
use convo_api::session::{CredentialStore, Credentials, MemoryCredentialStore};
use convo_api::ApiClient;

pub const PASSWORD: &str = "SecurePass123";

// --- Mock backend ---

#[derive(Clone, Copy)]
pub enum RefreshMode {
    Succeed,
    Reject(u16),
}

pub struct BackendState {
    generation: u64,
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_mode: RefreshMode,
    pub refresh_delay: Duration,
    /// How long `/api/slow-widgets/{name}` takes to answer
    pub slow_widget_delay: Duration,
    pub rotate_refresh_token: bool,
    /// (path, bearer token) of every protected call, in arrival order
    pub hits: Vec<(String, Option<String>)>,
}

impl BackendState {
    fn issue(&mut self) {
        self.generation += 1;
        self.access_token = access_token(self.generation);
        if self.rotate_refresh_token {
            self.refresh_token = format!("refresh-{}", self.generation);
        }
    }
}

pub struct MockBackend {
    state: Mutex<BackendState>,
    refresh_calls: AtomicUsize,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            state: Mutex::new(BackendState {
                generation: 0,
                access_token: access_token(0),
                refresh_token: "refresh-0".to_string(),
                refresh_mode: RefreshMode::Succeed,
                refresh_delay: Duration::from_millis(0),
                slow_widget_delay: Duration::from_millis(0),
                rotate_refresh_token: true,
                hits: Vec::new(),
            }),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn access_token(&self) -> String {
        self.lock().access_token.clone()
    }

    pub fn refresh_token(&self) -> String {
        self.lock().refresh_token.clone()
    }

    /// Invalidate the current access token without telling the client
    pub fn expire_access_token(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.access_token = access_token(state.generation);
    }

    pub fn hits(&self) -> Vec<(String, Option<String>)> {
        self.lock().hits.clone()
    }
}

pub fn access_token(generation: u64) -> String {
    let claims = json!({
        "sub": "user-1",
        "role": "owner",
        "tenantId": "tenant-42",
        "exp": chrono::Utc::now().timestamp() + 900,
        "gen": generation,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"backend-secret"))
        .expect("Failed to sign access token")
}

fn bearer(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn tokens(state: &BackendState) -> Value {
    json!({
        "accessToken": state.access_token,
        "refreshToken": state.refresh_token,
    })
}

async fn refresh(backend: web::Data<MockBackend>, body: web::Json<Value>) -> HttpResponse {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = backend.lock().refresh_delay;
    tokio::time::sleep(delay).await;

    let mut state = backend.lock();
    if let RefreshMode::Reject(code) = state.refresh_mode {
        return HttpResponse::build(StatusCode::from_u16(code).unwrap())
            .json(json!({ "error": "Refresh token revoked" }));
    }
    if body.get("refreshToken").and_then(Value::as_str) != Some(state.refresh_token.as_str()) {
        return HttpResponse::Unauthorized().json(json!({ "error": "Invalid refresh token" }));
    }

    state.issue();
    if state.rotate_refresh_token {
        HttpResponse::Ok().json(tokens(&state))
    } else {
        HttpResponse::Ok().json(json!({ "accessToken": state.access_token }))
    }
}

async fn login(backend: web::Data<MockBackend>, body: web::Json<Value>) -> HttpResponse {
    if body.get("password").and_then(Value::as_str) != Some(PASSWORD) {
        return HttpResponse::Unauthorized().json(json!({ "error": "Invalid email or password" }));
    }
    let state = backend.lock();
    HttpResponse::Ok().json(tokens(&state))
}

async fn register(backend: web::Data<MockBackend>, body: web::Json<Value>) -> HttpResponse {
    if body.get("name").and_then(Value::as_str).unwrap_or("").is_empty() {
        return HttpResponse::UnprocessableEntity().json(json!({ "message": "Name is required" }));
    }
    let state = backend.lock();
    HttpResponse::Created().json(tokens(&state))
}

async fn widget(
    req: HttpRequest,
    name: web::Path<String>,
    backend: web::Data<MockBackend>,
) -> HttpResponse {
    let token = bearer(&req);
    let mut state = backend.lock();
    state.hits.push((req.path().to_string(), token.clone()));

    if token.as_deref() == Some(state.access_token.as_str()) {
        HttpResponse::Ok().json(json!({ "widget": name.into_inner() }))
    } else {
        HttpResponse::Unauthorized().json(json!({ "error": "Token expired" }))
    }
}

async fn slow_widget(
    req: HttpRequest,
    name: web::Path<String>,
    backend: web::Data<MockBackend>,
) -> HttpResponse {
    // The token is checked on arrival; only the answer is late
    let token = bearer(&req);
    let (delay, valid) = {
        let mut state = backend.lock();
        state.hits.push((req.path().to_string(), token.clone()));
        (state.slow_widget_delay, token.as_deref() == Some(state.access_token.as_str()))
    };
    tokio::time::sleep(delay).await;

    if valid {
        HttpResponse::Ok().json(json!({ "widget": name.into_inner() }))
    } else {
        HttpResponse::Unauthorized().json(json!({ "error": "Token expired" }))
    }
}

async fn always_unauthorized(req: HttpRequest, backend: web::Data<MockBackend>) -> HttpResponse {
    backend.lock().hits.push((req.path().to_string(), bearer(&req)));
    HttpResponse::Unauthorized().json(json!({ "error": "Not allowed for this tenant" }))
}

async fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(json!({ "error": "Insufficient permissions" }))
}

async fn missing() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": "Booking not found" }))
}

async fn broken() -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({ "error": "database unavailable" }))
}

async fn invalid() -> HttpResponse {
    HttpResponse::UnprocessableEntity().json(json!({ "message": "Name is required" }))
}

async fn teapot() -> HttpResponse {
    HttpResponse::build(StatusCode::IM_A_TEAPOT).body("<html>I'm a teapot</html>")
}

pub struct TestBackend {
    pub address: String,
    pub state: web::Data<MockBackend>,
}

pub fn spawn_backend() -> TestBackend {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let state = web::Data::new(MockBackend::new());
    let data = state.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/login", web::post().to(login))
            .route("/auth/register", web::post().to(register))
            .route("/api/widgets/{name}", web::get().to(widget))
            .route("/api/slow-widgets/{name}", web::get().to(slow_widget))
            .route("/api/always-unauthorized", web::get().to(always_unauthorized))
            .route("/api/forbidden", web::get().to(forbidden))
            .route("/api/missing", web::get().to(missing))
            .route("/api/broken", web::get().to(broken))
            .route("/api/invalid", web::post().to(invalid))
            .route("/api/teapot", web::get().to(teapot))
    })
    .workers(2)
    .listen(listener)
    .expect("Failed to listen")
    .run();
    let _ = tokio::spawn(server);

    TestBackend {
        address: format!("http://127.0.0.1:{}", port),
        state,
    }
}

/// Address where nothing listens
pub fn unreachable_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

// --- Client side ---

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}

pub struct TestClient {
    pub client: ApiClient,
    pub store: Arc<dyn CredentialStore>,
    pub notices: Arc<RecordingNotifier>,
    pub redirects: Arc<RecordingNavigator>,
}

impl TestClient {
    pub fn credentials(&self) -> Option<Credentials> {
        self.store.load().expect("Failed to load credentials")
    }
}

pub fn settings(address: &str) -> ApiSettings {
    let mut settings = ApiSettings::new(address);
    settings.request_timeout_seconds = 10;
    settings
}

pub fn build_client(settings: &ApiSettings, store: Arc<dyn CredentialStore>) -> TestClient {
    let notices = Arc::new(RecordingNotifier::default());
    let redirects = Arc::new(RecordingNavigator::default());
    let client = ApiClient::new(settings, store.clone())
        .expect("Failed to build client")
        .with_notifier(notices.clone())
        .with_navigator(redirects.clone());

    TestClient {
        client,
        store,
        notices,
        redirects,
    }
}

/// Client whose access token the backend no longer accepts
pub fn expired_session(backend: &TestBackend) -> TestClient {
    let credentials = Credentials::new("expired-token", backend.state.refresh_token());
    let store = Arc::new(MemoryCredentialStore::with_credentials(credentials));
    build_client(&settings(&backend.address), store)
}

pub fn signed_out(address: &str) -> TestClient {
    build_client(&settings(address), Arc::new(MemoryCredentialStore::new()))
}
