//! In-process stand-in for the Music Lesson API, used by integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub use axum::http::StatusCode;

pub const PATH_REGISTER: &str = "/instructors/register";
pub const PATH_LOGIN: &str = "/instructors/login";
pub const PATH_LESSONS: &str = "/lessons";

pub const DEFAULT_TOKEN: &str = "tok-1";

/// Knobs for making the fake API misbehave in a controlled way.
#[derive(Debug, Clone)]
pub struct TestServerConfig {
    pub token: String,
    /// Status returned by a successful registration.
    pub register_status: StatusCode,
    /// When false, login succeeds but the body has no `token`.
    pub issue_token: bool,
    /// Appended to the echoed lesson title, making title checks fail.
    pub title_suffix: Option<String>,
    pub lesson_delay: Duration,
}

impl Default for TestServerConfig {
    fn default() -> Self {
        Self {
            token: DEFAULT_TOKEN.to_string(),
            register_status: StatusCode::CREATED,
            issue_token: true,
            title_suffix: None,
            lesson_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    registrations: Arc<AtomicU64>,
    logins: Arc<AtomicU64>,
    lessons_created: Arc<AtomicU64>,
    unauthorized: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    pub fn lessons_created(&self) -> u64 {
        self.lessons_created.load(Ordering::Relaxed)
    }

    pub fn unauthorized(&self) -> u64 {
        self.unauthorized.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
struct ApiState {
    config: Arc<TestServerConfig>,
    stats: TestServerStats,
    /// email -> password
    instructors: Arc<Mutex<HashMap<String, String>>>,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LessonRequest {
    title: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct LessonResponse {
    id: u64,
    title: String,
    description: String,
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn handle_register(State(state): State<ApiState>, body: Bytes) -> Response {
    TestServerStats::inc(&state.stats.requests_total);

    let req: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error(StatusCode::BAD_REQUEST, "bad json"),
    };
    if req.name.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return error(StatusCode::BAD_REQUEST, "name, email and password are required");
    }

    {
        let mut instructors = state
            .instructors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if instructors.contains_key(&req.email) {
            return error(StatusCode::CONFLICT, "email already registered");
        }
        instructors.insert(req.email.clone(), req.password);
    }
    TestServerStats::inc(&state.stats.registrations);

    (
        state.config.register_status,
        Json(json!({ "name": req.name, "email": req.email })),
    )
        .into_response()
}

async fn handle_login(State(state): State<ApiState>, body: Bytes) -> Response {
    TestServerStats::inc(&state.stats.requests_total);

    let req: LoginRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error(StatusCode::BAD_REQUEST, "bad json"),
    };

    let known = state
        .instructors
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(&req.email)
        .is_some_and(|password| *password == req.password);
    if !known {
        return error(StatusCode::UNAUTHORIZED, "invalid credentials");
    }
    TestServerStats::inc(&state.stats.logins);

    if state.config.issue_token {
        (StatusCode::OK, Json(json!({ "token": state.config.token }))).into_response()
    } else {
        (StatusCode::OK, Json(json!({}))).into_response()
    }
}

async fn handle_lesson(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    TestServerStats::inc(&state.stats.requests_total);

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if bearer != Some(state.config.token.as_str()) {
        TestServerStats::inc(&state.stats.unauthorized);
        return error(StatusCode::UNAUTHORIZED, "missing or invalid token");
    }

    let req: LessonRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error(StatusCode::BAD_REQUEST, "bad json"),
    };

    if !state.config.lesson_delay.is_zero() {
        sleep(state.config.lesson_delay).await;
    }

    let id = state.stats.lessons_created.fetch_add(1, Ordering::Relaxed) + 1;
    let title = match &state.config.title_suffix {
        Some(suffix) => format!("{}{suffix}", req.title),
        None => req.title,
    };

    (
        StatusCode::CREATED,
        Json(LessonResponse {
            id,
            title,
            description: req.description,
        }),
    )
        .into_response()
}

pub fn router(config: TestServerConfig, stats: TestServerStats) -> Router {
    let state = ApiState {
        config: Arc::new(config),
        stats,
        instructors: Arc::new(Mutex::new(HashMap::new())),
    };

    Router::new()
        .route(PATH_REGISTER, post(handle_register))
        .route(PATH_LOGIN, post(handle_login))
        .route(PATH_LESSONS, post(handle_lesson))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerConfig::default()).await
    }

    pub async fn start_with(config: TestServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(config, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use lessonload_http::{HttpClient, HttpRequest};

    fn json_post(url: String, body: serde_json::Value) -> HttpRequest {
        HttpRequest::post_owned(url, Bytes::from(body.to_string()))
            .with_header("content-type", "application/json")
    }

    #[tokio::test]
    async fn register_login_and_create_lesson() {
        let server = TestServer::start().await.unwrap();
        let base = server.base_url().to_string();
        let client = HttpClient::default();

        let creds = json!({ "name": "n", "email": "user@test.com", "password": "123456" });
        let res = client
            .request(json_post(format!("{base}{PATH_REGISTER}"), creds.clone()))
            .await
            .unwrap();
        assert_eq!(res.status, 201);

        let dup = client
            .request(json_post(format!("{base}{PATH_REGISTER}"), creds))
            .await
            .unwrap();
        assert_eq!(dup.status, 409);

        let res = client
            .request(json_post(
                format!("{base}{PATH_LOGIN}"),
                json!({ "email": "user@test.com", "password": "123456" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status, 200);
        let body: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
        assert_eq!(body["token"], DEFAULT_TOKEN);

        let lesson = json!({ "title": "Intro", "description": "First steps" });
        let res = client
            .request(
                json_post(format!("{base}{PATH_LESSONS}"), lesson.clone())
                    .with_header("authorization", format!("Bearer {DEFAULT_TOKEN}")),
            )
            .await
            .unwrap();
        assert_eq!(res.status_text(), "201 Created");
        let body: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
        assert_eq!(body["title"], "Intro");
        assert_eq!(body["description"], "First steps");

        let res = client
            .request(json_post(format!("{base}{PATH_LESSONS}"), lesson))
            .await
            .unwrap();
        assert_eq!(res.status, 401);

        assert_eq!(server.stats().registrations(), 1);
        assert_eq!(server.stats().logins(), 1);
        assert_eq!(server.stats().lessons_created(), 1);
        assert_eq!(server.stats().unauthorized(), 1);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn login_rejects_unknown_instructor() {
        let server = TestServer::start().await.unwrap();
        let res = HttpClient::default()
            .request(json_post(
                format!("{}{PATH_LOGIN}", server.base_url()),
                json!({ "email": "ghost@test.com", "password": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status, 401);
        server.shutdown().await;
    }
}
