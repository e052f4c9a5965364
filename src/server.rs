//! Web server module for Pulseboard.
//!
//! Serves the dashboard view-models, alert and feedback CRUD, dataset
//! export/import and a server-sent-events stream of live session metrics.
//! Every non-2xx response carries `{"error": "..."}`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_stream::{StreamExt, wrappers::WatchStream};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::alerts::{Actor, AlertError, AlertLifecycle};
use crate::dashboard::{self, Dataset, RequestContext, device_scope, range_start, version_scope};
use crate::realtime::{ChangeFeed, LiveConfig, LiveSessionMetrics};
use crate::storage::{
    AlertConfigInput, AlertQuery, AlertStatus, FeedbackInput, MetricScope, StorageError,
    StorageHandles,
};

/// Header carrying the acting user for alert mutations.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageHandles,
    pub alerts: AlertLifecycle,
    pub feed: Arc<dyn ChangeFeed>,
    pub live: LiveConfig,
}

impl AppState {
    pub fn new(storage: StorageHandles, live: LiveConfig) -> Self {
        Self {
            alerts: AlertLifecycle::new(storage.alert_store.clone()),
            feed: Arc::new(storage.feed.clone()),
            storage,
            live,
        }
    }

    fn context(&self, scope: MetricScope) -> RequestContext {
        RequestContext::new(self.storage.clone(), scope)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error("{0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

fn storage_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidData(_) => StatusCode::BAD_REQUEST,
        StorageError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Storage(err) | Self::Alert(AlertError::Storage(err)) => storage_status(err),
            Self::Alert(AlertError::Unauthenticated(_)) => StatusCode::UNAUTHORIZED,
            Self::Alert(AlertError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Alert(AlertError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Error body shared by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Query Parameters
// =============================================================================

/// Time range shared by the dashboard endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub range: Option<String>,
}

impl RangeParams {
    fn scope(&self) -> ApiResult<MetricScope> {
        Ok(MetricScope {
            start: parse_range(self.range.as_deref())?,
            ..Default::default()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendParams {
    pub range: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertsParams {
    /// Comma-separated statuses, e.g. `active,acknowledged`.
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<u32>,
}

/// Parse a relative time range.
/// Supports: 1h, 6h, 12h, 24h, 7d, 30d, 90d. Absent means the default window.
fn parse_range(range: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(range) = range.filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    range_start(range, Utc::now())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest(format!("unsupported range '{range}'")))
}

fn parse_statuses(raw: Option<&str>) -> ApiResult<Vec<AlertStatus>> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<AlertStatus>()
                .map_err(|_| ApiError::BadRequest(format!("unknown alert status '{s}'")))
        })
        .collect()
}

fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    Actor::from_raw(headers.get(ACTOR_HEADER).and_then(|v| v.to_str().ok()))
}

// =============================================================================
// Router
// =============================================================================

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/performance/summary", get(summary_handler))
        .route("/api/performance/trends", get(trends_handler))
        .route("/api/performance/score", get(score_handler))
        .route("/api/devices/{id}", get(device_handler))
        .route("/api/versions/{version}", get(version_handler))
        .route("/api/routes", get(routes_handler))
        .route("/api/insights", get(insights_handler))
        .route("/api/alerts", get(alerts_handler))
        .route("/api/alerts/{id}/acknowledge", post(acknowledge_handler))
        .route("/api/alerts/{id}/resolve", post(resolve_handler))
        .route(
            "/api/alert-configs",
            get(list_alert_configs_handler).post(create_alert_config_handler),
        )
        .route(
            "/api/alert-configs/{id}",
            put(update_alert_config_handler).delete(delete_alert_config_handler),
        )
        .route(
            "/api/feedback",
            get(list_feedback_handler).post(create_feedback_handler),
        )
        .route("/api/export", get(export_handler))
        .route("/api/import", post(import_handler))
        .route("/api/sessions/{id}/live", get(live_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks the database answers queries.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.storage.admin.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Dashboard
// =============================================================================

async fn summary_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> ApiResult<Json<dashboard::PerformanceSummary>> {
    let Query(params) = params?;
    let ctx = state.context(params.scope()?);
    Ok(Json(dashboard::fetch_performance_summary(&ctx).await?))
}

async fn trends_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<TrendParams>, QueryRejection>,
) -> ApiResult<Json<dashboard::MetricsTrend>> {
    let Query(params) = params?;
    let scope = MetricScope {
        start: parse_range(params.range.as_deref())?,
        ..Default::default()
    };
    let ctx = state.context(scope);
    Ok(Json(dashboard::fetch_metrics_trend(&ctx, params.limit).await?))
}

async fn score_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> ApiResult<Json<crate::analytics::PerformanceScore>> {
    let Query(params) = params?;
    let ctx = state.context(params.scope()?);
    Ok(Json(dashboard::fetch_performance_score(&ctx).await?))
}

async fn device_handler(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> ApiResult<Json<dashboard::DeviceProfile>> {
    let Query(params) = params?;
    let ctx = state.context(device_scope(&params.scope()?, &device_id));
    Ok(Json(dashboard::fetch_device_profile(&ctx, &device_id).await?))
}

async fn version_handler(
    State(state): State<Arc<AppState>>,
    Path(version): Path<String>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> ApiResult<Json<dashboard::VersionDetails>> {
    let Query(params) = params?;
    let ctx = state.context(version_scope(&params.scope()?, &version));
    Ok(Json(dashboard::fetch_version_details(&ctx, &version).await?))
}

async fn routes_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> ApiResult<Json<dashboard::RouteAnalyticsReport>> {
    let Query(params) = params?;
    let ctx = state.context(params.scope()?);
    Ok(Json(dashboard::fetch_route_analytics(&ctx).await?))
}

/// Always 200: failed sections are reported inside the body.
async fn insights_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> ApiResult<Json<dashboard::InsightsReport>> {
    let Query(params) = params?;
    let ctx = state.context(params.scope()?);
    Ok(Json(dashboard::fetch_insights(&ctx).await))
}

// =============================================================================
// Alerts
// =============================================================================

async fn alerts_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<AlertsParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let alerts = state
        .storage
        .alert_store
        .list(AlertQuery {
            statuses: parse_statuses(params.status.as_deref())?,
            limit: params.limit,
        })
        .await?;
    Ok(Json(alerts).into_response())
}

async fn acknowledge_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers);
    let alert = state.alerts.acknowledge(&id, actor.as_ref()).await?;
    Ok(Json(alert).into_response())
}

async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers);
    let alert = state.alerts.resolve(&id, actor.as_ref()).await?;
    Ok(Json(alert).into_response())
}

async fn list_alert_configs_handler(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let configs = state.storage.alert_config_store.list().await?;
    Ok(Json(configs).into_response())
}

async fn create_alert_config_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AlertConfigInput>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(input) = payload?;
    let config = state.storage.alert_config_store.create(input).await?;
    Ok((StatusCode::CREATED, Json(config)).into_response())
}

async fn update_alert_config_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AlertConfigInput>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(input) = payload?;
    let config = state.storage.alert_config_store.update(&id, input).await?;
    Ok(Json(config).into_response())
}

async fn delete_alert_config_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.storage.alert_config_store.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StorageError::NotFound(format!("alert config '{id}'")).into())
    }
}

// =============================================================================
// Feedback
// =============================================================================

async fn list_feedback_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let feedback = state.storage.feedback_store.list(params.limit).await?;
    Ok(Json(feedback).into_response())
}

async fn create_feedback_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FeedbackInput>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(input) = payload?;
    let feedback = state.storage.feedback_store.create(input).await?;
    Ok((StatusCode::CREATED, Json(feedback)).into_response())
}

// =============================================================================
// Dataset
// =============================================================================

async fn export_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Dataset>> {
    Ok(Json(dashboard::export_dataset(&state.storage).await?))
}

async fn import_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Dataset>, JsonRejection>,
) -> ApiResult<Json<dashboard::ImportSummary>> {
    let Json(dataset) = payload?;
    if dataset.version > dashboard::DATASET_VERSION {
        return Err(ApiError::BadRequest(format!(
            "unsupported dataset version {}",
            dataset.version
        )));
    }
    Ok(Json(dashboard::import_dataset(&state.storage, &dataset).await?))
}

// =============================================================================
// Live Metrics
// =============================================================================

/// Stream live metric snapshots for one session as `live` events.
///
/// The subscription lives as long as the client stays connected.
async fn live_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if state.storage.session_reader.get(&session_id).await?.is_none() {
        return Err(StorageError::NotFound(format!("session '{session_id}'")).into());
    }

    tracing::debug!(session = %session_id, "Opening live metrics stream");
    let live = LiveSessionMetrics::spawn(state.feed.clone(), session_id, state.live);
    let snapshots = WatchStream::new(live.subscribe());
    let stream = snapshots.map(move |snapshot| {
        // keeps the subscription alive until the client disconnects
        let _live = &live;
        let event = Event::default()
            .event("live")
            .json_data(&snapshot)
            .unwrap_or_else(|err| Event::default().event("error").data(err.to_string()));
        Ok(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AlertSeverity, MetricSample, MetricType, NewAlert, Session, StorageBuilder};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn create_test_state() -> AppState {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        AppState::new(handles, LiveConfig::default())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn seed_alert(state: &AppState) -> String {
        state
            .storage
            .alert_store
            .raise(NewAlert {
                config_id: "cfg-1".to_string(),
                severity: AlertSeverity::Warning,
                metric_value: 41.0,
                threshold: 45.0,
                message: "FPS below warning threshold".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = create_router(create_test_state().await);
        let (status, body) = send(app.clone(), get_req("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(app, get_req("/readyz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["db"], "ready");
    }

    #[tokio::test]
    async fn test_summary_and_trends() {
        let state = create_test_state().await;
        let now = Utc::now();
        state
            .storage
            .writer
            .upsert_session(&Session {
                id: "s-1".to_string(),
                device_id: "d-1".to_string(),
                app_version: "1.0.0".to_string(),
                platform: "android".to_string(),
                device_type: None,
                started_at: now,
                ended_at: None,
            })
            .await
            .unwrap();
        state
            .storage
            .writer
            .insert_metrics(&[
                MetricSample::new("s-1", MetricType::Fps, 58.0, now),
                MetricSample::new("s-1", MetricType::MemoryUsage, 150.0, now),
            ])
            .await
            .unwrap();
        let app = create_router(state);

        let (status, body) = send(app.clone(), get_req("/api/performance/summary?range=7d")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["avg_fps"], 58.0);
        assert_eq!(body["avg_memory"], 150.0);
        assert_eq!(body["health"]["fps_score"], 100);

        let (status, body) = send(app.clone(), get_req("/api/performance/trends?limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["days"].as_array().unwrap().len(), 1);

        let (status, body) = send(app, get_req("/api/performance/summary?range=2y")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("2y"));
    }

    #[tokio::test]
    async fn test_unknown_device_returns_404() {
        let app = create_router(create_test_state().await);
        let (status, body) = send(app, get_req("/api/devices/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_alert_transitions() {
        let state = create_test_state().await;
        let id = seed_alert(&state).await;
        let app = create_router(state);

        // no actor
        let (status, body) = send(
            app.clone(),
            Request::builder()
                .method("POST")
                .uri(format!("/api/alerts/{id}/acknowledge"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("unauthenticated"));

        let with_actor = |path: String| {
            Request::builder()
                .method("POST")
                .uri(path)
                .header(ACTOR_HEADER, "ops@example.com")
                .body(Body::empty())
                .unwrap()
        };

        let (status, body) = send(app.clone(), with_actor(format!("/api/alerts/{id}/resolve"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "resolved");
        assert_eq!(body["resolved_by"], "ops@example.com");

        let (status, _) = send(app.clone(), with_actor(format!("/api/alerts/{id}/acknowledge"))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(app.clone(), with_actor("/api/alerts/missing/resolve".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app.clone(), get_req("/api/alerts?status=resolved")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(app, get_req("/api/alerts?status=snoozed")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_alert_config_crud() {
        let app = create_router(create_test_state().await);
        let input = json!({
            "name": "Memory pressure",
            "metric_type": "memory_usage",
            "warning_threshold": 400.0,
            "critical_threshold": 800.0,
            "notification_channels": ["email"]
        });

        let (status, created) = send(app.clone(), json_req("POST", "/api/alert-configs", input.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["is_active"], true);
        let id = created["id"].as_str().unwrap().to_string();

        let mut updated = input.clone();
        updated["is_active"] = json!(false);
        let (status, body) = send(
            app.clone(),
            json_req("PUT", &format!("/api/alert-configs/{id}"), updated),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_active"], false);

        // critical below warning for a lower-is-better metric
        let mut invalid = input;
        invalid["critical_threshold"] = json!(100.0);
        let (status, _) = send(app.clone(), json_req("POST", "/api/alert-configs", invalid)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(app.clone(), get_req("/api/alert-configs")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let delete = |id: &str| {
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/alert-configs/{id}"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, _) = send(app.clone(), delete(&id)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(app, delete(&id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_json_uses_error_body() {
        let app = create_router(create_test_state().await);
        let request = Request::builder()
            .method("POST")
            .uri("/api/feedback")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_feedback_and_export_import() {
        let app = create_router(create_test_state().await);
        let (status, _) = send(
            app.clone(),
            json_req(
                "POST",
                "/api/feedback",
                json!({"category": "performance", "rating": 4, "message": "Much faster now"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, dataset) = send(app.clone(), get_req("/api/export")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dataset["feedback"].as_array().unwrap().len(), 1);

        // importing the same records again collides on ids
        let (status, _) = send(app.clone(), json_req("POST", "/api/import", dataset.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let fresh = create_router(create_test_state().await);
        let (status, summary) = send(fresh.clone(), json_req("POST", "/api/import", dataset)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["feedback"], 1);

        let (_, listed) = send(fresh, get_req("/api/feedback")).await;
        assert_eq!(listed[0]["message"], "Much faster now");
    }

    #[tokio::test]
    async fn test_live_stream_for_unknown_session() {
        let app = create_router(create_test_state().await);
        let (status, _) = send(app, get_req("/api/sessions/ghost/live")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
