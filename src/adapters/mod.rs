//! Adapters - Concrete implementations of ports.

#[cfg(feature = "s3")]
pub mod aws;

pub mod local;
pub mod remote;

use crate::application::orchestrator::StageOrchestrator;
use crate::config::{AppConfig, SpeechBackend, StorageBackend};
use crate::domain::workspace::WorkspaceManager;
use crate::ports::storage::StoragePort;
use local::{FfmpegEncoder, FsAdapter};
use remote::{AzureSpeech, GeminiPlanner, GttsSpeech, InfographicRenderer, SpeechService};
use std::sync::Arc;

/// Orchestrator wired to the production collaborators.
pub type DefaultOrchestrator =
    StageOrchestrator<GeminiPlanner, InfographicRenderer, SpeechService, FfmpegEncoder>;

/// Speech backend named by `TTS_SERVICE`. Azure without credentials fails per segment.
pub fn speech_service(config: &AppConfig) -> SpeechService {
    match config.tts_service {
        SpeechBackend::Gtts => SpeechService::Gtts(GttsSpeech::new()),
        SpeechBackend::Azure => {
            let (key, region) = config
                .azure_speech
                .as_ref()
                .map(|azure| (azure.key.as_str(), azure.region.as_str()))
                .unwrap_or_default();
            SpeechService::Azure(AzureSpeech::new(key, region))
        }
    }
}

pub fn default_orchestrator(
    config: &AppConfig,
    workspace: Arc<WorkspaceManager>,
) -> DefaultOrchestrator {
    StageOrchestrator::new(
        workspace,
        GeminiPlanner::new(&config.google_api_key, &config.gemini_model),
        InfographicRenderer::new(&config.infographic_api_url, &config.chromium_bin),
        speech_service(config),
        FfmpegEncoder::new(&config.ffmpeg_bin, &config.ffprobe_bin),
        config.pipeline(),
    )
}

/// Publisher for finished videos. Local files are served under `/videos`.
pub async fn storage(config: &AppConfig) -> Result<Arc<dyn StoragePort>, String> {
    match config.storage_backend {
        StorageBackend::Local => Ok(Arc::new(FsAdapter::new(&config.publish_dir, "/videos"))),
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            let spaces = config.spaces.as_ref().ok_or(
                "STORAGE_BACKEND=s3 needs DO_SPACES_KEY, DO_SPACES_SECRET and DO_SPACES_BUCKET",
            )?;
            Ok(Arc::new(
                aws::s3::S3Adapter::for_spaces(
                    &spaces.key,
                    &spaces.secret,
                    &spaces.region,
                    &spaces.bucket,
                )
                .await,
            ))
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => Err("STORAGE_BACKEND=s3 requires building with the `s3` feature".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&'static str, &'static str)]) -> AppConfig {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        AppConfig::from_vars(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn speech_service_follows_configuration() {
        assert!(matches!(speech_service(&config(&[])), SpeechService::Gtts(_)));
        assert!(matches!(
            speech_service(&config(&[("TTS_SERVICE", "azure")])),
            SpeechService::Azure(_)
        ));
    }
}
