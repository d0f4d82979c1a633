//! HTTP front end for chat sessions.
//!
//! Each client creates a session, loads a repository into it, and then asks
//! questions. Sessions are isolated from each other; commands within one
//! session run one at a time. Sessions idle for longer than
//! `[server].session_ttl_secs` are dropped by a background sweep.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/sessions` | Create a session, optionally with credentials |
//! | `DELETE` | `/sessions/{id}` | Drop a session |
//! | `POST`   | `/sessions/{id}/repository` | Fetch and index a repository |
//! | `POST`   | `/sessions/{id}/ask` | Ask a question |
//! | `POST`   | `/sessions/{id}/clear` | Reset the transcript |
//! | `GET`    | `/sessions/{id}/messages` | Read the transcript |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "parse_error", "message": "Failed parsing repository URL, please try again." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `missing_credentials` (400), `parse_error` (400), `query_error` (400),
//! `fetch_error` (502), `index_error` (502), `chat_error` (502),
//! `internal` (500).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ChatError, SessionError};
use crate::models::{ConversationTurn, RepoRef};
use crate::session::{AssistantReply, Credentials, LoadRequest, LoadSummary, Services, Session};

/// Builds the external services for a session with complete credentials.
pub type ServicesFactory =
    Arc<dyn Fn(&Config, &Credentials) -> anyhow::Result<Services> + Send + Sync>;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    /// Credentials from the environment or CLI, used for fields a client omits.
    defaults: Credentials,
    factory: ServicesFactory,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionSlot>>>>,
}

struct SessionSlot {
    session: Mutex<Session>,
    last_active: std::sync::Mutex<Instant>,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            last_active: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self
            .last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

impl AppState {
    pub fn new(config: Config, defaults: Credentials) -> Self {
        Self::with_factory(config, defaults, Arc::new(Services::from_config))
    }

    pub fn with_factory(config: Config, defaults: Credentials, factory: ServicesFactory) -> Self {
        Self {
            config: Arc::new(config),
            defaults,
            factory,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn create_session(&self, credentials: Credentials) -> anyhow::Result<Session> {
        if credentials.missing().is_empty() {
            let services = (self.factory)(&self.config, &credentials)?;
            Ok(Session::with_services(&self.config, credentials, services))
        } else {
            Session::new(&self.config, credentials)
        }
    }

    async fn session(&self, id: Uuid) -> Result<Arc<SessionSlot>, AppError> {
        let slot = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
        slot.touch();
        Ok(slot)
    }

    /// Idle lifetime of a session, or `None` when sessions never expire.
    pub fn session_ttl(&self) -> Option<Duration> {
        match self.config.server.session_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Drop sessions untouched for at least `ttl`. A session with a command
    /// in flight is kept. Returns the number dropped.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, slot| {
            let expired = slot.idle_for() >= ttl && slot.session.try_lock().is_ok();
            if expired {
                tracing::info!(session = %id, "evicting idle session");
            }
            !expired
        });
        before - sessions.len()
    }
}

/// Periodically evict sessions idle for longer than `ttl`.
pub fn spawn_session_sweeper(state: AppState, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 2).max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            state.evict_idle(ttl).await;
        }
    })
}

/// Build the router over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", axum::routing::delete(handle_delete_session))
        .route("/sessions/{id}/repository", post(handle_load))
        .route("/sessions/{id}/ask", post(handle_ask))
        .route("/sessions/{id}/clear", post(handle_clear))
        .route("/sessions/{id}/messages", get(handle_messages))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config, defaults: Credentials) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let missing = defaults.missing();
    if !missing.is_empty() {
        tracing::warn!(
            missing = %missing.join(", "),
            "no default credentials; clients must supply them when creating a session"
        );
    }

    let state = AppState::new(config.clone(), defaults);
    if let Some(ttl) = state.session_ttl() {
        spawn_session_sweeper(state.clone(), ttl);
    }
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "repo-chat server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::MissingCredentials(_)
            | SessionError::Parse(_)
            | SessionError::Chat(ChatError::Query(_)) => StatusCode::BAD_REQUEST,
            SessionError::Fetch(_) | SessionError::Index(_) | SessionError::Chat(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Sessions ============

#[derive(Serialize)]
struct SessionCreated {
    id: Uuid,
    /// Secrets still missing; repository commands fail until they are supplied.
    missing_credentials: Vec<&'static str>,
    messages: Vec<ConversationTurn>,
}

/// Handler for `POST /sessions`.
///
/// The body is optional. Fields it carries override the server defaults.
async fn handle_create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<SessionCreated>), AppError> {
    let supplied: Credentials = if body.iter().all(u8::is_ascii_whitespace) {
        Credentials::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid body: {}", e)))?
    };
    let credentials = supplied.or(state.defaults.clone());
    let missing = credentials.missing();
    for name in &missing {
        tracing::warn!(credential = *name, "session created without credential");
    }

    let session = state
        .create_session(credentials)
        .map_err(|e| internal(format!("{:#}", e)))?;
    let messages = session.transcript().to_vec();

    let id = Uuid::new_v4();
    state
        .sessions
        .write()
        .await
        .insert(id, Arc::new(SessionSlot::new(session)));
    tracing::info!(session = %id, "session created");

    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            id,
            missing_credentials: missing,
            messages,
        }),
    ))
}

/// Handler for `DELETE /sessions/{id}`.
async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    match state.sessions.write().await.remove(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found(format!("no session with id: {}", id))),
    }
}

/// Handler for `POST /sessions/{id}/repository`.
async fn handle_load(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<LoadSummary>, AppError> {
    let slot = state.session(id).await?;
    let mut session = slot.session.lock().await;
    let summary = session.load(&request).await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

/// Handler for `POST /sessions/{id}/ask`.
async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AssistantReply>, AppError> {
    let slot = state.session(id).await?;
    let mut session = slot.session.lock().await;
    let reply = session.ask(&request.question).await?;
    Ok(Json(reply))
}

#[derive(Serialize)]
struct Transcript {
    messages: Vec<ConversationTurn>,
    repo: Option<RepoRef>,
    config_expanded: bool,
}

impl Transcript {
    fn of(session: &Session) -> Self {
        Self {
            messages: session.transcript().to_vec(),
            repo: session.repo().cloned(),
            config_expanded: session.config_expanded(),
        }
    }
}

/// Handler for `POST /sessions/{id}/clear`.
async fn handle_clear(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Transcript>, AppError> {
    let slot = state.session(id).await?;
    let mut session = slot.session.lock().await;
    session.clear();
    Ok(Json(Transcript::of(&session)))
}

/// Handler for `GET /sessions/{id}/messages`.
async fn handle_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Transcript>, AppError> {
    let slot = state.session(id).await?;
    let session = slot.session.lock().await;
    Ok(Json(Transcript::of(&session)))
}
