use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::Utc;
use hims_sync_core::models::{
    ConflictId, PullRequest, PullResult, PushBatch, PushResult, ResolveRequest, SyncConflict,
    SyncStatusSummary,
};
use hims_sync_core::registry::EntitySchema;
use hims_sync_core::SyncEngine;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{fingerprint, PushRateLimiter, RateLimitMetricsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    engine: SyncEngine,
    jwt_verifier: Arc<JwtVerifier>,
    push_rate_limiter: Arc<PushRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, engine: SyncEngine) -> Self {
        Self {
            jwt_verifier: Arc::new(JwtVerifier::from_config(&config)),
            push_rate_limiter: Arc::new(PushRateLimiter::from_config(&config)),
            engine,
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/push", post(push))
        .route("/pull", get(pull))
        .route("/conflicts", get(list_conflicts))
        .route("/conflicts/{id}/resolve", put(resolve_conflict))
        .route("/status", get(status))
        .route("/retry-failed", post(retry_failed))
        .route("/reprocess", post(reprocess))
        .route("/entities", get(entities))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/sync", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.push_rate_limiter.metrics_snapshot(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// `facilityId` + `clientId` query pair shared by the per-client endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientScope {
    #[serde(default)]
    facility_id: String,
    #[serde(default)]
    client_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullQuery {
    #[serde(default)]
    facility_id: String,
    #[serde(default)]
    client_id: String,
    /// Exclusive checkpoint (Unix ms); required
    since: i64,
    /// Comma-separated kind tags
    entity_types: Option<String>,
    limit: Option<usize>,
}

impl PullQuery {
    fn into_request(self) -> PullRequest {
        let entity_types = self.entity_types.map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|kind| !kind.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        PullRequest {
            facility_id: self.facility_id,
            client_id: self.client_id,
            since: self.since,
            entity_types,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictQuery {
    #[serde(default)]
    facility_id: String,
    client_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: u64,
}

async fn push(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(batch): Json<PushBatch>,
) -> Result<Json<PushResult>, AppError> {
    state
        .push_rate_limiter
        .check(&batch.facility_id, &batch.client_id)
        .await?;

    let result = state.engine.push(&batch, &user.user_id).await?;
    tracing::info!(
        endpoint = "sync_push",
        facility = %batch.facility_id,
        client = fingerprint(&batch.client_id),
        user = fingerprint(&user.user_id),
        synced = result.synced,
        conflicts = result.conflicts,
        failed = result.failed,
        "Accepted push batch"
    );
    Ok(Json(result))
}

async fn pull(
    State(state): State<AppState>,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResult>, AppError> {
    let request = query.into_request();
    let result = state.engine.pull(&request).await?;
    tracing::info!(
        endpoint = "sync_pull",
        facility = %request.facility_id,
        client = fingerprint(&request.client_id),
        since = request.since,
        returned = result.changes.len(),
        has_more = result.has_more,
        "Served pull"
    );
    Ok(Json(result))
}

async fn list_conflicts(
    State(state): State<AppState>,
    Query(query): Query<ConflictQuery>,
) -> Result<Json<Vec<SyncConflict>>, AppError> {
    let conflicts = state
        .engine
        .pending_conflicts(&query.facility_id, query.client_id.as_deref())
        .await?;
    Ok(Json(conflicts))
}

async fn resolve_conflict(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<SyncConflict>, AppError> {
    let conflict_id: ConflictId = id
        .trim()
        .parse()
        .map_err(|_| AppError::NotFound(format!("Conflict not found: {id}")))?;

    let conflict = state
        .engine
        .resolve_conflict(&conflict_id, &request, &user.user_id)
        .await?;
    tracing::info!(
        endpoint = "sync_resolve",
        conflict_id = %conflict_id,
        resolution = %request.resolution,
        user = fingerprint(&user.user_id),
        "Resolved conflict"
    );
    Ok(Json(conflict))
}

async fn status(
    State(state): State<AppState>,
    Query(scope): Query<ClientScope>,
) -> Result<Json<SyncStatusSummary>, AppError> {
    let summary = state
        .engine
        .status(&scope.facility_id, &scope.client_id)
        .await?;
    Ok(Json(summary))
}

async fn retry_failed(
    State(state): State<AppState>,
    Query(scope): Query<ClientScope>,
) -> Result<Json<CountResponse>, AppError> {
    let count = state
        .engine
        .retry_failed(&scope.facility_id, &scope.client_id)
        .await?;
    tracing::info!(
        endpoint = "sync_retry_failed",
        facility = %scope.facility_id,
        client = fingerprint(&scope.client_id),
        count,
        "Reset failed changes"
    );
    Ok(Json(CountResponse { count }))
}

async fn reprocess(
    State(state): State<AppState>,
    Query(scope): Query<ClientScope>,
) -> Result<Json<PushResult>, AppError> {
    let result = state
        .engine
        .reprocess_pending(&scope.facility_id, &scope.client_id)
        .await?;
    Ok(Json(result))
}

async fn entities(State(state): State<AppState>) -> Json<Vec<EntitySchema>> {
    Json(state.engine.entity_schemas())
}
