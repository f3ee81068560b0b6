//! HTTP server for recognition ingestion and analytics queries.
//!
//! Camera loops post recognitions to `POST /recognitions`; dashboards read the
//! aggregated views. Every read is computed from the record store on request.
//!
//! # Architecture
//!
//! ```text
//! camera loop ──→ POST /recognitions ──→ RecognitionStore (SQLite)
//!                                              │
//!        GET /emotion-dynamics, /stats/by-date, /students/... ◀─┘
//! ```

use crate::analytics::{self, QueryError};
use crate::config::Config;
use crate::core::event::NewRecognition;
use crate::core::range::{parse_instant, RangeQuery};
use crate::store::{RecognitionStore, StoreError};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

const RECENT_DEFAULT: usize = 3;
const RECENT_MAX: usize = 20;
const SEARCH_DEFAULT: usize = 10;
const SEARCH_MAX: usize = 50;
const LEADERBOARD_DEFAULT: usize = 20;
const LEADERBOARD_MAX: usize = 100;

/// Shared server state
pub struct AppState {
    store: Arc<RecognitionStore>,
    config: Config,
}

impl AppState {
    pub fn new(store: Arc<RecognitionStore>, config: Config) -> Self {
        Self { store, config }
    }

    fn window(&self) -> chrono::Duration {
        self.config.aggregation.live_window_chrono()
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Failures surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    InvalidRange(String),
    NameAndMoodRequired,
    StudentNotFound,
    Internal,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "store failure");
        ApiError::Internal
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidRange(e) => ApiError::InvalidRange(e.to_string()),
            QueryError::PersonNotFound(_) => ApiError::StudentNotFound,
            QueryError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            ApiError::InvalidRange(msg) => (StatusCode::BAD_REQUEST, "invalid_range", msg),
            ApiError::NameAndMoodRequired => (
                StatusCode::BAD_REQUEST,
                "name_and_mood_required",
                "name and mood are required".to_string(),
            ),
            ApiError::StudentNotFound => (
                StatusCode::NOT_FOUND,
                "student_not_found",
                "student not found".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error".to_string(),
            ),
        };
        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run store work on tokio's blocking pool so SQLite calls never occupy a
/// runtime worker.
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "store task failed");
            ApiError::Internal
        })?
}

/// Parse a `limit` query value; anything missing, unparsable or non-positive
/// falls back to `default`.
fn parse_limit(raw: Option<&str>, default: usize, max: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| (n as usize).min(max))
        .unwrap_or(default)
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionBody {
    name: Option<String>,
    mood: Option<String>,
    detected_at: Option<String>,
    camera_id: Option<String>,
}

#[derive(Serialize)]
struct ItemResponse<T> {
    item: T,
}

#[derive(Serialize)]
struct ItemsResponse<T> {
    items: Vec<T>,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /recognitions?limit=N
async fn recent_recognitions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<ItemsResponse<crate::core::event::RecognitionEvent>> {
    let limit = parse_limit(query.limit.as_deref(), RECENT_DEFAULT, RECENT_MAX);
    let items = blocking(&state, move |s| Ok(s.store.recent(limit)?)).await?;
    Ok(Json(ItemsResponse { items }))
}

/// POST /recognitions
async fn create_recognition(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RecognitionBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ItemResponse<crate::core::event::RecognitionEvent>>), ApiError> {
    let Json(body) = body.map_err(|e| {
        tracing::debug!(error = %e, "rejected recognition body");
        ApiError::NameAndMoodRequired
    })?;

    let name = body.name.as_deref().map(str::trim).unwrap_or_default();
    let mood = body.mood.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() || mood.is_empty() {
        return Err(ApiError::NameAndMoodRequired);
    }

    let now = Utc::now();
    let detected_at = body
        .detected_at
        .as_deref()
        .and_then(|raw| parse_instant(raw).ok())
        .unwrap_or(now);

    let mut new = NewRecognition::new(name, mood, detected_at);
    if let Some(camera_id) = body
        .camera_id
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        new = new.with_camera(camera_id);
    }

    let item = blocking(&state, move |s| Ok(s.store.insert_recognition(&new, now)?)).await?;
    tracing::debug!(name = %item.name, mood = %item.mood, "recognition stored");
    Ok((StatusCode::CREATED, Json(ItemResponse { item })))
}

/// GET /emotion-dynamics
async fn emotion_dynamics(State(state): State<Arc<AppState>>) -> ApiResult<analytics::LiveDynamics> {
    let dynamics = blocking(&state, |s| {
        Ok(analytics::live_dynamics(&s.store, s.window(), Utc::now())?)
    })
    .await?;
    Ok(Json(dynamics))
}

/// GET /stats/by-date?days=N | from&to
async fn stats_by_date(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<analytics::RangeStats> {
    let stats = blocking(&state, move |s| {
        Ok(analytics::range_stats(
            &s.store,
            &s.config.aggregation,
            &query,
            Utc::now(),
        )?)
    })
    .await?;
    Ok(Json(stats))
}

/// GET /students?q=&limit=
async fn search_students(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<analytics::PeoplePage> {
    let limit = parse_limit(query.limit.as_deref(), SEARCH_DEFAULT, SEARCH_MAX);
    let q = query.q.as_deref().unwrap_or_default().trim().to_string();
    let page = blocking(&state, move |s| Ok(analytics::search_people(&s.store, &q, limit)?)).await?;
    Ok(Json(page))
}

/// GET /students/leaderboard?limit=
async fn students_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<analytics::Leaderboard> {
    let limit = parse_limit(query.limit.as_deref(), LEADERBOARD_DEFAULT, LEADERBOARD_MAX);
    let board = blocking(&state, move |s| {
        Ok(analytics::leaderboard(&s.store, s.window(), limit, Utc::now())?)
    })
    .await?;
    Ok(Json(board))
}

/// GET /students/:id
async fn student_detail(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<analytics::StudentDetail> {
    let detail = blocking(&state, move |s| {
        Ok(analytics::student_detail(&s.store, &name, s.window(), Utc::now())?)
    })
    .await?;
    Ok(Json(detail))
}

/// GET /students/:id/by-date
async fn student_by_date(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<analytics::StudentRange> {
    let range = blocking(&state, move |s| {
        Ok(analytics::student_range(
            &s.store,
            &s.config.aggregation,
            &name,
            &query,
            Utc::now(),
        )?)
    })
    .await?;
    Ok(Json(range))
}

/// GET /dashboard-stats
async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
) -> ApiResult<analytics::DashboardSummary> {
    let summary = blocking(&state, |s| {
        Ok(analytics::dashboard_summary(&s.store, s.window(), Utc::now())?)
    })
    .await?;
    Ok(Json(summary))
}

/// Build the router over a shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/recognitions",
            get(recent_recognitions).post(create_recognition),
        )
        .route("/emotion-dynamics", get(emotion_dynamics))
        .route("/stats/by-date", get(stats_by_date))
        .route("/dashboard-stats", get(dashboard_stats))
        .route("/students", get(search_students))
        .route("/students/leaderboard", get(students_leaderboard))
        .route("/students/:id", get(student_detail))
        .route("/students/:id/by-date", get(student_by_date))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server, opening the store at `config.server.database_path`.
pub async fn run(config: Config) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let store = RecognitionStore::open(&config.server.database_path)?;
    tracing::info!(path = %config.server.database_path.display(), "record store opened");
    run_with_store(config, Arc::new(store)).await
}

/// Run the HTTP server over an already opened store.
pub async fn run_with_store(
    config: Config,
    store: Arc<RecognitionStore>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let port = config.server.port;
    let app = router(Arc::new(AppState::new(store, config)));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("moodwatch server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
