use crate::capacity::estimate_capacity;
use crate::config::CrowdConfig;
use crate::error::{ApiError, MonitorError};
use crate::monitor::{FrameAssessment, FrameMonitor, VideoReport};
use crate::rule_engine::evaluate_alert;
use crate::types::*;
use crate::video_source::resolve_video_path;
use ai_service::PluginRegistry;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use common::ai_tasks::{PluginListResponse, VideoFrame};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use telemetry::metrics::CROWD_CAPACITY;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CrowdConfig>,
    pub registry: PluginRegistry,
    pub monitor: Arc<FrameMonitor>,
    capacity: Arc<RwLock<Option<CapacityEstimate>>>,
    video_root: Option<Arc<PathBuf>>,
}

impl AppState {
    pub fn new(
        config: CrowdConfig,
        registry: PluginRegistry,
        detector_id: impl Into<String>,
    ) -> Self {
        let monitor = FrameMonitor::new(registry.clone(), detector_id, config.clone());
        Self {
            config: Arc::new(config),
            registry,
            monitor: Arc::new(monitor),
            capacity: Arc::new(RwLock::new(None)),
            video_root: None,
        }
    }

    /// Allow video analysis of files under `root`
    pub fn with_video_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.video_root = Some(Arc::new(root.into()));
        self
    }

    /// Most recently calculated venue capacity
    pub async fn current_capacity(&self) -> Option<CapacityEstimate> {
        *self.capacity.read().await
    }

    async fn require_capacity(&self) -> Result<CapacityEstimate, MonitorError> {
        self.current_capacity()
            .await
            .ok_or(MonitorError::CapacityNotSet)
    }

    /// Replace the venue capacity used by later evaluations
    pub async fn set_capacity(&self, estimate: CapacityEstimate) {
        *self.capacity.write().await = Some(estimate);

        CROWD_CAPACITY
            .with_label_values(&["safe"])
            .set(estimate.safe_capacity.min(i64::MAX as u64) as i64);
        CROWD_CAPACITY
            .with_label_values(&["max"])
            .set(estimate.max_capacity.min(i64::MAX as u64) as i64);
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and metrics
        .route("/health", get(health_check))
        .route("/readyz", get(ready_check))
        .route("/metrics", get(metrics))
        // Detectors
        .route("/v1/detectors", get(list_detectors))
        // Venue capacity
        .route("/v1/capacity", post(calculate_capacity).get(get_capacity))
        // Alert evaluation
        .route("/v1/alerts/evaluate", post(evaluate))
        // Frame and video monitoring
        .route("/v1/frames", post(assess_frame))
        .route("/v1/videos", post(analyze_video))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "alert-service"
    }))
}

async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.registry.health_check_all().await;
    let detector = state.monitor.detector_id();

    match health.get(detector) {
        Some(true) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "detector": detector
            })),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "detector": detector
            })),
        ),
    }
}

async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {}", e),
        )
        .into_response(),
    }
}

async fn list_detectors(State(state): State<AppState>) -> Json<PluginListResponse> {
    let plugins = state.registry.list().await;
    Json(PluginListResponse { plugins })
}

async fn calculate_capacity(
    State(state): State<AppState>,
    Json(req): Json<CapacityRequest>,
) -> Json<CapacityEstimate> {
    let estimate = estimate_capacity(&state.config, req.area);

    info!(
        requested_area = ?req.area,
        area = estimate.area,
        safe_capacity = estimate.safe_capacity,
        max_capacity = estimate.max_capacity,
        "venue capacity calculated"
    );

    state.set_capacity(estimate).await;
    Json(estimate)
}

async fn get_capacity(State(state): State<AppState>) -> Result<Json<CapacityEstimate>, ApiError> {
    state
        .current_capacity()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("venue capacity has not been calculated"))
}

async fn evaluate(
    State(state): State<AppState>,
    Json(req): Json<EvaluateAlertRequest>,
) -> Result<Json<AlertResult>, ApiError> {
    let (safe_capacity, max_capacity) = match (req.safe_capacity, req.max_capacity) {
        (Some(safe), Some(max)) => (safe, max),
        (None, None) => {
            let capacity = state.require_capacity().await?;
            (capacity.safe_capacity, capacity.max_capacity)
        }
        _ => {
            return Err(MonitorError::InvalidRequest(
                "safe_capacity and max_capacity must be given together".to_string(),
            )
            .into())
        }
    };

    let result = evaluate_alert(req.count, safe_capacity, max_capacity);
    telemetry::metrics::CROWD_ALERTS
        .with_label_values(&[result.status.as_str()])
        .inc();

    Ok(Json(result))
}

async fn assess_frame(
    State(state): State<AppState>,
    Json(frame): Json<VideoFrame>,
) -> Result<Json<FrameAssessment>, ApiError> {
    let capacity = state.require_capacity().await?;
    let assessment = state.monitor.assess_frame(&frame, &capacity).await;
    Ok(Json(assessment))
}

async fn analyze_video(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeVideoRequest>,
) -> Result<Json<VideoReport>, ApiError> {
    let root = state.video_root.as_deref().ok_or_else(|| {
        MonitorError::Forbidden("video analysis is disabled; set VIDEO_ROOT".to_string())
    })?;
    let path = resolve_video_path(root, &req.path)?;

    let capacity = state.require_capacity().await?;
    let report = state.monitor.assess_video(&path, &capacity).await?;
    Ok(Json(report))
}
