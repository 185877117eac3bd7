//! Explainer Server - HTTP front end for single-server deployment.
//!
//! It wires up:
//! - The production pipeline (Gemini, infographic renderer, TTS, ffmpeg)
//! - A publisher (served directory, or DigitalOcean Spaces with the `s3` feature)
//! - `/generate`, `/videos` and `/health` routes

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use explainer::adapters::{default_orchestrator, storage, DefaultOrchestrator};
use explainer::config::{SpeechBackend, StorageBackend};
use explainer::domain::workspace::WorkspaceManager;
use explainer::ports::storage::StoragePort;
use explainer::{logging, AppConfig, GenerateRequest, JobReport};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    orchestrator: Arc<DefaultOrchestrator>,
    storage: Arc<dyn StoragePort>,
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    #[serde(default)]
    text_content: String,
    #[serde(default = "default_target_duration")]
    target_duration: u32,
    segments_count: Option<u32>,
}

fn default_target_duration() -> u32 {
    60
}

type ApiResponse = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: &str, details: impl Into<Value>) -> ApiResponse {
    (
        status,
        Json(json!({ "status": "error", "message": message, "details": details.into() })),
    )
}

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate))
        .nest_service("/videos", ServeDir::new(&state.config.publish_dir))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn generate(State(state): State<AppState>, Json(body): Json<GenerateBody>) -> ApiResponse {
    if body.text_content.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "text_content is required", Value::Null);
    }

    let request = GenerateRequest {
        target_duration: body.target_duration,
        segments_count: body.segments_count,
        ..GenerateRequest::new(body.text_content)
    };

    let report = match state.orchestrator.run(&request).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "job could not be started");
            return api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Video generation failed",
                e.to_string(),
            );
        }
    };

    match publish(&state, &report).await {
        Ok(download_url) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "job_id": report.job_id,
                "download_url": download_url,
            })),
        ),
        Err(details) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Video generation failed",
            details,
        ),
    }
}

/// Hand the final video to the publisher and return its download URL.
async fn publish(state: &AppState, report: &JobReport) -> Result<String, Value> {
    let Some(video) = &report.final_video else {
        return Err(failure_details(report));
    };
    let file_name = video
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let key = match state.config.storage_backend {
        StorageBackend::Local => format!("{}/{}", report.job_id, file_name),
        StorageBackend::S3 => format!("videos/{}/{}", report.job_id, file_name),
    };

    if let Err(e) = state.storage.upload(video, &key).await {
        error!(job_id = %report.job_id, key, error = %e, "upload failed");
        return Err(Value::String(format!("upload failed: {}", e)));
    }
    let url = state.storage.object_url(&key);
    info!(job_id = %report.job_id, url, "video published");

    // Local publishes are served from PUBLISH_DIR; only a remote copy frees the job folder.
    if state.config.is_production() && state.config.storage_backend == StorageBackend::S3 {
        match tokio::fs::remove_dir_all(&report.job_root).await {
            Ok(()) => info!(job_id = %report.job_id, "removed local job folder"),
            Err(e) => warn!(job_id = %report.job_id, error = %e, "could not remove job folder"),
        }
    }
    Ok(url)
}

fn failure_details(report: &JobReport) -> Value {
    let reason = report
        .fatal_error
        .clone()
        .or_else(|| report.concatenation_error.as_ref().map(|e| e.to_string()))
        .or_else(|| report.compile_skipped.clone())
        .unwrap_or_else(|| "no segment could be compiled".to_string());
    json!({
        "job_id": report.job_id,
        "state": report.state,
        "reason": reason,
        "asset_errors": report.asset_errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "compile_errors": report.compile_errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    })
}

#[tokio::main]
async fn main() {
    logging::init();
    let config = Arc::new(AppConfig::from_env());

    if config.google_api_key.is_empty() {
        warn!("GOOGLE_API_KEY is not set; planning requests will fail");
    }
    if config.tts_service == SpeechBackend::Azure && config.azure_speech.is_none() {
        warn!("TTS_SERVICE=azure without AZURE_SPEECH_KEY and AZURE_SPEECH_REGION; audio will fail");
    }

    let storage = match storage(&config).await {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Failed to configure storage: {}", e);
            std::process::exit(1);
        }
    };

    let workspace = Arc::new(WorkspaceManager::new(&config.output_dir));
    let state = AppState {
        orchestrator: Arc::new(default_orchestrator(&config, workspace)),
        storage,
        config: config.clone(),
    };

    let listener = match tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}:{}: {}", config.addr, config.port, e);
            std::process::exit(1);
        }
    };
    info!("Listening at {}:{}", config.addr, config.port);
    if let Err(e) = axum::serve(listener, app(state)).await {
        error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use explainer::adapters::local::FsAdapter;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn state(output_dir: &std::path::Path) -> AppState {
        state_with(output_dir, &[])
    }

    fn state_with(output_dir: &std::path::Path, extra: &[(&'static str, String)]) -> AppState {
        let mut vars: HashMap<&str, String> =
            HashMap::from([("OUTPUT_DIR", output_dir.display().to_string())]);
        vars.extend(extra.iter().cloned());
        let config = Arc::new(AppConfig::from_vars(|key| vars.get(key).cloned()));
        let workspace = Arc::new(WorkspaceManager::new(&config.output_dir));
        AppState {
            orchestrator: Arc::new(default_orchestrator(&config, workspace)),
            storage: Arc::new(FsAdapter::new(&config.publish_dir, "/videos")),
            config,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(state(dir.path()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn generate_rejects_blank_text() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(state(dir.path()))
            .oneshot(
                Request::post("/generate")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text_content": "   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "text_content is required");
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn videos_are_served_from_publish_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("job")).unwrap();
        std::fs::write(dir.path().join("job/final.mp4"), b"mp4").unwrap();

        let response = app(state(dir.path()))
            .oneshot(Request::get("/videos/job/final.mp4").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"mp4");
    }

    #[tokio::test]
    async fn publish_without_video_reports_reason() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = JobReport::new("job", dir.path().join("job"));
        report.compile_skipped = Some("audio disabled".to_string());

        let details = publish(&state(dir.path()), &report).await.unwrap_err();
        assert_eq!(details["reason"], "audio disabled");
        assert_eq!(details["job_id"], "job");
    }

    #[tokio::test]
    async fn publish_local_keeps_video_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let job_root = dir.path().join("job");
        std::fs::create_dir(&job_root).unwrap();
        let video = job_root.join("explainer_video_1.mp4");
        std::fs::write(&video, b"mp4").unwrap();
        let mut report = JobReport::new("job", job_root);
        report.final_video = Some(video.clone());

        let url = publish(&state(dir.path()), &report).await.unwrap();
        assert_eq!(url, "/videos/job/explainer_video_1.mp4");
        assert_eq!(std::fs::read(&video).unwrap(), b"mp4");
    }

    #[tokio::test]
    async fn production_publish_to_separate_dir_stays_downloadable() {
        let output = tempfile::tempdir().unwrap();
        let published = tempfile::tempdir().unwrap();
        let job_root = output.path().join("job");
        std::fs::create_dir(&job_root).unwrap();
        let video = job_root.join("explainer_video_1.mp4");
        std::fs::write(&video, b"mp4").unwrap();
        let mut report = JobReport::new("job", job_root.clone());
        report.final_video = Some(video);

        let state = state_with(
            output.path(),
            &[
                ("PUBLISH_DIR", published.path().display().to_string()),
                ("APP_ENV", "production".to_string()),
            ],
        );
        let url = publish(&state, &report).await.unwrap();
        assert_eq!(url, "/videos/job/explainer_video_1.mp4");
        assert!(job_root.exists());
        assert!(published.path().join("job/explainer_video_1.mp4").exists());

        let response = app(state)
            .oneshot(Request::get(url.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"mp4");
    }
}
