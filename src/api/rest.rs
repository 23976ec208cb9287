use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::{Extension, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, Instrument};

use crate::api::auth::{self, AuthContext, AuthGate, Permission};
use crate::api::rate_limit::{self, RateLimiter};
use crate::error::{Error, Result};
use crate::events::price::PriceEvent;
use crate::interfaces::cache::PriceCache;
use crate::interfaces::event_publisher::EventPublisher;
use crate::observability::metrics::{
    HTTP_REQUESTS, HTTP_REQUEST_DURATION, MARKET_DATA_POINTS, SYMBOLS_TRACKED,
};
use crate::observability::tracing::trace_moving_average;
use crate::polling::{PollingJob, PollingRegistry};
use crate::store::PriceStore;
use crate::types::observation::{MarketObservation, NewObservation, ObservationUpdate};
use crate::utils::task_supervisor::TaskSupervisor;

/// Shared state handed to every handler.
pub struct ApiState {
    pub store: PriceStore,
    pub cache: Arc<dyn PriceCache>,
    pub publisher: Arc<dyn EventPublisher>,
    pub registry: Arc<PollingRegistry>,
    pub auth: AuthGate,
    pub rate_limiter: RateLimiter,
    pub background: Arc<Mutex<TaskSupervisor>>,
    pub default_window: usize,
    pub default_interval: u64,
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    // Literal segments (latest, symbols, poll) are registered alongside
    // the parameterized routes; the router prefers them, so "latest" can
    // never be mistaken for an id.
    let prices = Router::new()
        .route("/", get(list_observations).post(create_observation))
        .route("/latest", get(latest_price))
        .route("/symbols", get(list_symbols))
        .route("/poll", post(create_polling_job).get(list_polling_jobs))
        .route(
            "/poll/:job_id",
            get(get_polling_job).delete(delete_polling_job),
        )
        .route("/delete-all-polling-jobs", post(delete_all_polling_jobs))
        .route(
            "/:id",
            get(get_observation)
                .put(update_observation)
                .delete(delete_observation),
        )
        .route("/:id/moving-average", get(moving_average))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_requests,
        ));

    // Probes and metrics stay outside the auth/rate-limit layers.
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .nest("/api/v1/prices", prices)
        .layer(middleware::from_fn(track_http))
        .with_state(state)
}

/// Request counting and latency for every route, including probes.
async fn track_http(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    HTTP_REQUESTS
        .with_label_values(&[method.as_str(), endpoint.as_str()])
        .inc();
    HTTP_REQUEST_DURATION.observe(start.elapsed().as_secs_f64());
    response
}

// ── Query/response shapes ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    skip: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    symbol: String,
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WindowQuery {
    #[serde(default)]
    window: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ProviderQuery {
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollingRequest {
    pub symbols: Vec<String>,
    /// Seconds between cycles; the configured default when omitted.
    #[serde(default)]
    pub interval: Option<u64>,
}

#[derive(Debug, Serialize)]
struct LatestPriceResponse {
    symbol: String,
    price: f64,
    timestamp: DateTime<Utc>,
    source: String,
}

#[derive(Debug, Serialize)]
struct MovingAverageResponse {
    symbol: String,
    moving_average: f64,
    window_size: usize,
    timestamp: DateTime<Utc>,
}

fn validate_pagination(skip: Option<i64>, limit: Option<i64>) -> Result<(i64, i64)> {
    let skip = skip.unwrap_or(0);
    let limit = limit.unwrap_or(100);
    if skip < 0 {
        return Err(Error::Validation("skip must be >= 0".to_string()));
    }
    if !(1..=100).contains(&limit) {
        return Err(Error::Validation(
            "limit must be between 1 and 100".to_string(),
        ));
    }
    Ok((skip, limit))
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("invalid id: {}", raw)))
}

fn observation_not_found(id: i64) -> Error {
    Error::NotFound(format!("Market data with id {} not found", id))
}

// ── Root-level handlers ──────────────────────────────────────────────

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to the Market Data Service API" }))
}

async fn health(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    let background_tasks = state.background.lock().unwrap().active_task_count();
    Json(json!({
        "status": "healthy",
        "background_tasks": background_tasks,
    }))
}

/// Readiness requires the relational store to answer.
async fn ready(State(state): State<Arc<ApiState>>) -> Result<Json<serde_json::Value>> {
    state
        .store
        .ping()
        .await
        .map_err(|e| Error::NotReady(e.to_string()))?;
    Ok(Json(json!({ "status": "ready" })))
}

async fn metrics() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::observability::metrics::render(),
    )
        .into_response()
}

// ── Observation handlers ─────────────────────────────────────────────

async fn list_observations(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<MarketObservation>>> {
    ctx.require(Permission::Read)?;
    let (skip, limit) = validate_pagination(q.skip, q.limit)?;
    let rows = state.store.list(q.symbol.as_deref(), skip, limit).await?;
    Ok(Json(rows))
}

async fn create_observation(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<NewObservation>,
) -> Result<(StatusCode, Json<MarketObservation>)> {
    ctx.require(Permission::Write)?;
    payload.validate()?;

    let created = state.store.create(&payload).await?;

    MARKET_DATA_POINTS.inc();
    if let Ok(symbols) = state.store.symbols().await {
        SYMBOLS_TRACKED.set(symbols.len() as i64);
    }

    // Opportunistic fan-out; a dropped event never fails the write.
    let event = PriceEvent::new(&created.symbol, created.price, &created.source);
    state.publisher.publish(&event).await;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_observation(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<MarketObservation>> {
    ctx.require(Permission::Read)?;
    let id = parse_id(&id)?;
    let row = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| observation_not_found(id))?;
    Ok(Json(row))
}

async fn update_observation(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(update): Json<ObservationUpdate>,
) -> Result<Json<MarketObservation>> {
    ctx.require(Permission::Write)?;
    let id = parse_id(&id)?;
    update.validate()?;
    let row = state
        .store
        .update(id, &update)
        .await?
        .ok_or_else(|| observation_not_found(id))?;
    Ok(Json(row))
}

async fn delete_observation(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    ctx.require(Permission::Delete)?;
    let id = parse_id(&id)?;
    if !state.store.delete(id).await? {
        return Err(observation_not_found(id));
    }
    Ok(Json(json!({ "message": "Market data deleted successfully" })))
}

async fn latest_price(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(q): Query<LatestQuery>,
) -> Result<Json<LatestPriceResponse>> {
    ctx.require(Permission::Read)?;
    if let Some(provider) = &q.provider {
        debug!("Latest price for {} requested via {}", q.symbol, provider);
    }

    // Read-through: cache first, relational store on a miss.
    if let Some(price) = state.cache.get_price(&q.symbol).await {
        return Ok(Json(LatestPriceResponse {
            symbol: q.symbol,
            price,
            timestamp: Utc::now(),
            source: "cache".to_string(),
        }));
    }

    let row = state
        .store
        .latest(&q.symbol)
        .await?
        .ok_or_else(|| Error::NotFound(format!("No data found for symbol {}", q.symbol)))?;

    state.cache.set_price(&row.symbol, row.price).await;

    Ok(Json(LatestPriceResponse {
        symbol: row.symbol,
        price: row.price,
        timestamp: row.timestamp,
        source: row.source,
    }))
}

async fn list_symbols(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<serde_json::Value>> {
    ctx.require(Permission::Read)?;
    let symbols = state.store.symbols().await?;
    Ok(Json(json!({ "symbols": symbols })))
}

async fn moving_average(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(symbol): Path<String>,
    Query(q): Query<WindowQuery>,
) -> Result<Json<MovingAverageResponse>> {
    ctx.require(Permission::Read)?;

    let window = q.window.unwrap_or(state.default_window as i64);
    if window < 1 {
        return Err(Error::Validation("window must be >= 1".to_string()));
    }
    let window = window as usize;

    let average = state
        .store
        .moving_average(&symbol, window)
        .instrument(trace_moving_average(&symbol, window))
        .await?
        .ok_or_else(|| Error::NotFound(format!("No data found for symbol {}", symbol)))?;

    let timestamp = state
        .store
        .latest_timestamp(&symbol)
        .await?
        .unwrap_or_else(Utc::now);

    Ok(Json(MovingAverageResponse {
        symbol,
        moving_average: average,
        window_size: window,
        timestamp,
    }))
}

// ── Polling job handlers (admin tier) ────────────────────────────────

async fn create_polling_job(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(q): Query<ProviderQuery>,
    Json(request): Json<PollingRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    ctx.require(Permission::Admin)?;

    let interval = request.interval.unwrap_or(state.default_interval);
    let job = state
        .registry
        .clone()
        .create(request.symbols, interval, q.provider);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "job_id": job.id,
            "status": job.status,
            "config": {
                "symbols": job.symbols,
                "interval": job.interval_secs,
            },
            "message": "Polling job started successfully",
        })),
    ))
}

async fn list_polling_jobs(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<PollingJob>>> {
    ctx.require(Permission::Admin)?;
    Ok(Json(state.registry.list()))
}

async fn get_polling_job(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(job_id): Path<String>,
) -> Result<Json<PollingJob>> {
    ctx.require(Permission::Admin)?;
    let job = state
        .registry
        .get(&job_id)
        .ok_or_else(|| Error::NotFound("Job not found".to_string()))?;
    Ok(Json(job))
}

async fn delete_polling_job(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    ctx.require(Permission::Admin)?;
    if !state.registry.delete(&job_id) {
        return Err(Error::NotFound("Job not found".to_string()));
    }
    Ok(Json(json!({ "message": "Job deleted successfully" })))
}

async fn delete_all_polling_jobs(
    State(state): State<Arc<ApiState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<serde_json::Value>> {
    ctx.require(Permission::Admin)?;
    let deleted = state.registry.delete_all();
    Ok(Json(json!({
        "message": "All jobs deleted successfully",
        "deleted_count": deleted,
    })))
}
