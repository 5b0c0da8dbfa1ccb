use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::services::ServeDir;

use crate::pipeline::Orchestrator;
use crate::service::contract::{
    DetectRequest, DetectResponse, GroupRequest, GroupResponse, HealthResponse, ProcessResponse,
    VisualizeRequest, VisualizeResponse,
};
use crate::service::local::{LocalDetect, LocalGroup, LocalVisualize};
use crate::service::{DetectStage, GroupStage, VisualizeStage};

/// Base64 images inflate request bodies well past axum's default limit.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

const MISSING_INPUT: &str = "Missing image or detections data";

/// URL prefix under which rendered result images are served.
pub const RESULTS_PREFIX: &str = "/static/results";

/// `POST /detect`
pub fn detect_routes(stage: LocalDetect) -> Router {
    Router::new()
        .route("/detect", post(detect_handler))
        .with_state(Arc::new(stage))
}

/// `POST /group`
pub fn group_routes(stage: LocalGroup) -> Router {
    Router::new()
        .route("/group", post(group_handler))
        .with_state(Arc::new(stage))
}

/// `POST /visualize`
pub fn visualize_routes(stage: LocalVisualize) -> Router {
    Router::new()
        .route("/visualize", post(visualize_handler))
        .with_state(Arc::new(stage))
}

/// `POST /process` (raw image bytes in the body) and `GET /health`, which
/// probes every collaborator.
pub fn process_routes<D, G, V>(orchestrator: Arc<Orchestrator<D, G, V>>) -> Router
where
    D: DetectStage + 'static,
    G: GroupStage + 'static,
    V: VisualizeStage + 'static,
{
    Router::new()
        .route("/process", post(process_handler::<D, G, V>))
        .route("/health", get(orchestrator_health::<D, G, V>))
        .with_state(orchestrator)
}

/// `GET /static/results/<file>`: the images written by visualization.
pub fn results_routes(results_dir: &Path) -> Router {
    tracing::info!(dir = %results_dir.display(), "serving result images");
    Router::new().nest_service(RESULTS_PREFIX, ServeDir::new(results_dir))
}

/// `GET /health` for a stage service, reporting its optional capabilities.
pub fn stage_health_routes(service: &'static str, capabilities: BTreeMap<String, bool>) -> Router {
    let response = HealthResponse::new(service, true, capabilities);
    Router::new().route(
        "/health",
        get(move || {
            let response = response.clone();
            async move { Json(response) }
        }),
    )
}

/// Bind and serve until the process is stopped.
pub async fn serve(bind: SocketAddr, app: Router) -> anyhow::Result<()> {
    let app = app.layer(DefaultBodyLimit::max(MAX_BODY_BYTES));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("listening on {bind}");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn detect_handler(
    State(stage): State<Arc<LocalDetect>>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> Json<DetectResponse> {
    let Ok(Json(request)) = payload else {
        return Json(DetectResponse::failed("No image data provided"));
    };
    Json(DetectResponse::from_result(stage.detect(request).await))
}

async fn group_handler(
    State(stage): State<Arc<LocalGroup>>,
    payload: Result<Json<GroupRequest>, JsonRejection>,
) -> Json<GroupResponse> {
    let Ok(Json(request)) = payload else {
        return Json(GroupResponse::failed(MISSING_INPUT));
    };
    Json(GroupResponse::from_result(stage.group(request).await))
}

async fn visualize_handler(
    State(stage): State<Arc<LocalVisualize>>,
    payload: Result<Json<VisualizeRequest>, JsonRejection>,
) -> Json<VisualizeResponse> {
    let Ok(Json(request)) = payload else {
        return Json(VisualizeResponse::failed(MISSING_INPUT));
    };
    Json(VisualizeResponse::from_result(stage.visualize(request).await))
}

async fn process_handler<D, G, V>(
    State(orchestrator): State<Arc<Orchestrator<D, G, V>>>,
    body: Bytes,
) -> Json<ProcessResponse>
where
    D: DetectStage,
    G: GroupStage,
    V: VisualizeStage,
{
    if body.is_empty() {
        return Json(ProcessResponse {
            success: false,
            error: Some("No image provided".to_string()),
            ..Default::default()
        });
    }
    Json(orchestrator.process(body.to_vec()).await)
}

async fn orchestrator_health<D, G, V>(
    State(orchestrator): State<Arc<Orchestrator<D, G, V>>>,
) -> Json<HealthResponse>
where
    D: DetectStage,
    G: GroupStage,
    V: VisualizeStage,
{
    let services = orchestrator.health().await;
    let healthy = services.values().all(|ok| *ok);
    Json(HealthResponse::new("orchestrator", healthy, services))
}
