//! Driver Fatigue Monitor API Server
//!
//! Runs one monitoring session and exposes its latest state, alert
//! acknowledgment, reset and Prometheus metrics over HTTP.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub mod logging;
pub mod replay;
mod routes;
pub mod settings;
pub mod sink;

use camera_capture::CaptureHandle;
use inference_engine::{InferenceEngine, MockClassifier, RecordedLandmarks};
use monitor::{MonitoringSession, SessionHandle, SystemClock};
use replay::Replay;
use settings::{ClassifierKind, Settings};
use sink::LoggingAlertSink;

/// Application state shared across handlers
pub struct AppState {
    pub session: SessionHandle,
    /// Absent when another recorder was already installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(session: SessionHandle, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            session,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub session: SessionHealth,
}

/// Session part of the health response
#[derive(Debug, Default, Serialize)]
pub struct SessionHealth {
    pub running: bool,
    pub generation: Option<u64>,
    pub observed_fps: f64,
    pub inference_ms: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub last_frame_error: Option<String>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/assessment", get(routes::session::get_assessment))
        .route("/api/v1/alerts/acknowledge", post(routes::session::acknowledge))
        .route("/api/v1/session/reset", post(routes::session::reset))
        .route("/metrics", get(routes::metrics::render))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let running = state.session.is_running();
    let session = match state.session.latest() {
        Some(snapshot) => SessionHealth {
            running,
            generation: Some(snapshot.generation),
            observed_fps: snapshot.observed_fps,
            inference_ms: snapshot.inference_ms,
            frames_received: snapshot.stats.frames_received,
            frames_dropped: snapshot.stats.frames_dropped(),
            last_frame_error: snapshot.last_frame_error,
        },
        None => SessionHealth {
            running,
            ..Default::default()
        },
    };

    Json(HealthResponse {
        status: if running { "healthy" } else { "stopped" }.to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        session,
    })
}

/// Install the global Prometheus recorder
pub fn install_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics recorder not installed: {}", e);
            None
        }
    }
}

/// Start the session, the optional replay and the HTTP server
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let metrics = install_metrics();

    let landmarks = Arc::new(RecordedLandmarks::new());
    let classifier = match settings.classifier {
        ClassifierKind::Mock => Arc::new(MockClassifier::new()),
    };
    let engine = InferenceEngine::new(landmarks.clone(), classifier);

    let (session, handle) = MonitoringSession::start(
        settings.session.clone(),
        engine,
        Arc::new(LoggingAlertSink),
        Arc::new(SystemClock),
    )?;

    let (capture, frames) = CaptureHandle::channel();
    let session_task = tokio::spawn(session.run(frames));

    match settings.replay.path.clone() {
        Some(path) => {
            let replay = Replay::new(landmarks, capture, settings.replay.realtime);
            tokio::spawn(async move {
                if let Err(e) = replay.run(&path).await {
                    error!("Replay failed: {}", e);
                }
            });
        }
        None => {
            info!("No replay configured; waiting for frames");
            // Keep the frame source open so the session stays up
            tokio::spawn(async move {
                let _capture = capture;
                std::future::pending::<()>().await;
            });
        }
    }

    let state = Arc::new(AppState::new(handle.clone(), metrics));
    serve(settings.server.addr, state).await?;

    if handle.stop().await.is_ok() {
        let summary = session_task.await?;
        info!(
            assessed = summary.stats.frames_assessed,
            dropped = summary.stats.frames_dropped(),
            "Session finished"
        );
    }
    Ok(())
}

/// Serve the router until Ctrl-C
pub async fn serve(addr: std::net::SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!("Starting API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
