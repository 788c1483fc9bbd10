mod config;
mod error;
mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Json, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use crisis_agents::PlanQaAgent;
use crisis_core::{PlanningState, QaRequest, QaResponse};
use crisis_observability::{AppMetrics, MetricsSnapshot};
use crisis_storage::{read_state_file, Store};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use crate::config::ApiConfig;
pub use crate::error::ApiError;
use crate::rate_limit::ClientRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    agent: Arc<PlanQaAgent<Store>>,
    metrics: Arc<AppMetrics>,
    api_key: Option<String>,
    limiter: ClientRateLimiter,
    trust_forwarded_for: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    state_version: u64,
    metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
struct StateReplaced {
    ok: bool,
    version: u64,
}

pub async fn build_app(config: ApiConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();

    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };
    let agent = Arc::new(PlanQaAgent::new(Arc::new(store), metrics.clone()));

    if let Some(path) = config.state_file.as_deref() {
        let outputs = read_state_file(path)?;
        let seeded = agent.replace_state(outputs).await?;
        info!(path = %path.display(), version = seeded.version, "seeded planning state");
    }

    let state = ApiState {
        agent,
        metrics,
        api_key: config.api_key.clone(),
        limiter: ClientRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        trust_forwarded_for: config.trust_forwarded_for,
    };

    Ok(build_router(state, &config))
}

pub fn build_router(state: ApiState, config: &ApiConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/qa", post(qa))
        .route("/state", get(get_state).put(put_state))
        .layer(build_cors_layer(&config.allowed_origins))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.agent.snapshot().await?;
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        state_version: snapshot.version,
        metrics: state.metrics.snapshot(),
    };
    Ok((StatusCode::OK, Json(payload)))
}

async fn qa(
    State(state): State<ApiState>,
    payload: Result<Json<QaRequest>, JsonRejection>,
) -> Result<Json<QaResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))?;
    let response = state.agent.handle_query(&request.query).await?;
    Ok(Json(response))
}

async fn get_state(State(state): State<ApiState>) -> Result<Json<PlanningState>, ApiError> {
    let snapshot = state.agent.snapshot().await?;
    Ok(Json(snapshot.as_ref().clone()))
}

async fn put_state(
    State(state): State<ApiState>,
    payload: Result<Json<PlanningState>, JsonRejection>,
) -> Result<Json<StateReplaced>, ApiError> {
    let Json(outputs) = payload.map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))?;
    let next = state.agent.replace_state(outputs).await?;
    Ok(Json(StateReplaced {
        ok: true,
        version: next.version,
    }))
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };
    if !requires_api_key(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if provided != expected {
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

fn requires_api_key(method: &Method, path: &str) -> bool {
    let read_only = method == Method::GET || method == Method::HEAD || method == Method::OPTIONS;
    path == "/state" && !read_only
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let client = request_client(&request, state.trust_forwarded_for);
    if !state.limiter.allow(&client) {
        return ApiError::RateLimited.into_response();
    }

    next.run(request).await
}

/// Rate-limit key: the first forwarded address when the proxy is trusted,
/// otherwise the peer address. Routers served without connect info (tests)
/// share one `local` bucket.
fn request_client(request: &Request<Body>, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| {
            request
                .headers()
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
        .flatten();

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| peer.ip().to_string())
        })
        .unwrap_or_else(|| "local".to_string())
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    response
}
