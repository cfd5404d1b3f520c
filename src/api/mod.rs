use crate::config::SourceKey;
use crate::engine::{SourceCache, SyncOrchestrator};
use crate::stats::StatsCollector;
use crate::store::ReputationStore;
use crate::validator::EmailValidator;
use anyhow::{Context, Result};
use axum::{
    extract::{Json as AxumJson, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

/// Everything the HTTP handlers need, shared behind an `Arc`.
pub struct ApiState {
    pub validator: Arc<EmailValidator>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub cache: Arc<SourceCache>,
    pub store: Arc<dyn ReputationStore>,
    pub stats: Arc<StatsCollector>,
    pub sync_trigger: Sender<()>,
    pub cron_secret: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/validate", get(validate_query).post(validate_json))
        .route("/api/sync", post(trigger_sync))
        .route("/api/stats", get(get_stats))
        .route("/api/cache", get(get_cache).delete(clear_cache))
        .with_state(Arc::new(state))
}

pub async fn start_api_server(state: ApiState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API listener on {}", addr))?;
    info!("API Server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("API server terminated")
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    email: Option<String>,
    #[serde(default, alias = "userId")]
    user_id: Option<String>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn validate_query(
    State(state): State<Arc<ApiState>>,
    Query(request): Query<ValidateRequest>,
) -> Response {
    validate(&state, request).await
}

async fn validate_json(
    State(state): State<Arc<ApiState>>,
    AxumJson(request): AxumJson<ValidateRequest>,
) -> Response {
    validate(&state, request).await
}

async fn validate(state: &ApiState, request: ValidateRequest) -> Response {
    let Some(email) = request.email.filter(|e| !e.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "email is required");
    };

    let result = state
        .validator
        .validate(email.trim(), request.user_id.as_deref())
        .await;
    state.stats.record(&result);
    Json(result).into_response()
}

#[derive(Debug, Deserialize)]
struct SyncQuery {
    source: Option<String>,
}

fn authorized(state: &ApiState, headers: &HeaderMap) -> bool {
    let Some(secret) = &state.cron_secret else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret)
}

async fn trigger_sync(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(query): Query<SyncQuery>,
) -> Response {
    if !authorized(&state, &headers) {
        warn!("Rejected sync request with missing or wrong bearer token");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    match query.source {
        Some(source) => {
            let key = match source.parse::<SourceKey>() {
                Ok(key) => key,
                Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
            };
            info!("Sync of '{}' requested via API", key);
            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.sync_source(key).await;
            });
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "status": "sync_triggered", "source": key.as_str() })),
            )
                .into_response()
        }
        None => {
            // A full sync already queued covers this request too.
            let _ = state.sync_trigger.try_send(());
            Json(serde_json::json!({ "status": "sync_triggered" })).into_response()
        }
    }
}

async fn get_stats(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let providers = match state.store.provider_stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("Failed to read provider stats: {}", e);
            None
        }
    };
    Json(serde_json::json!({
        "validations": state.stats.get_snapshot(),
        "providers": providers,
    }))
}

async fn get_cache(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.cache.stats())
}

async fn clear_cache(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.cache.clear();
    Json(serde_json::json!({ "status": "cache_cleared" }))
}
