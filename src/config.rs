//! Configuration from the environment (and an optional `.env` file).

use crate::adapters::remote::gemini::DEFAULT_GEMINI_MODEL;
use crate::adapters::remote::infographic::DEFAULT_INFOGRAPHIC_API_URL;
use crate::application::orchestrator::PipelineSettings;
use crate::domain::media::EncoderTimeouts;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// Videos stay in (or are copied to) a served directory.
    Local,
    /// Videos are uploaded to DigitalOcean Spaces.
    S3,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "fs" => Ok(StorageBackend::Local),
            "s3" | "spaces" => Ok(StorageBackend::S3),
            other => Err(format!("unknown storage backend `{}`", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeechBackend {
    /// Google Translate TTS, no credentials needed.
    Gtts,
    /// Azure Cognitive Services neural voices.
    Azure,
}

impl FromStr for SpeechBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gtts" => Ok(SpeechBackend::Gtts),
            "azure" => Ok(SpeechBackend::Azure),
            other => Err(format!("unknown speech service `{}`", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AzureSpeechConfig {
    pub key: String,
    pub region: String,
}

/// DigitalOcean Spaces credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpacesConfig {
    pub key: String,
    pub secret: String,
    pub region: String,
    pub bucket: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    /// Gemini API key
    pub google_api_key: String,
    pub gemini_model: String,
    pub infographic_api_url: String,
    pub chromium_bin: String,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    /// Root under which every job directory is created
    pub output_dir: PathBuf,
    pub max_concurrency: usize,
    pub collaborator_timeout: Duration,
    pub tts_service: SpeechBackend,
    pub azure_speech: Option<AzureSpeechConfig>,
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// `production` deletes job folders once their video is published
    pub app_env: String,
    pub storage_backend: StorageBackend,
    /// Where the local backend copies published videos; defaults to the output dir
    pub publish_dir: PathBuf,
    pub spaces: Option<SpacesConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| {
            var(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| String::from(default))
        };
        let number = |key: &str, default: u64| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };

        let output_dir = PathBuf::from(get("OUTPUT_DIR", "generated_videos"));
        let spaces = match (var("DO_SPACES_KEY"), var("DO_SPACES_SECRET"), var("DO_SPACES_BUCKET")) {
            (Some(key), Some(secret), Some(bucket)) => Some(SpacesConfig {
                key,
                secret,
                bucket,
                region: get("DO_SPACES_REGION", "sfo3"),
            }),
            _ => None,
        };
        let azure_speech = match (var("AZURE_SPEECH_KEY"), var("AZURE_SPEECH_REGION")) {
            (Some(key), Some(region)) if !key.trim().is_empty() && !region.trim().is_empty() => {
                Some(AzureSpeechConfig { key, region })
            }
            _ => None,
        };

        Self {
            google_api_key: get("GOOGLE_API_KEY", ""),
            gemini_model: get("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            infographic_api_url: get("INFOGRAPHIC_API_URL", DEFAULT_INFOGRAPHIC_API_URL),
            chromium_bin: get("CHROMIUM_BIN", "chromium"),
            ffmpeg_bin: get("FFMPEG_BIN", "ffmpeg"),
            ffprobe_bin: get("FFPROBE_BIN", "ffprobe"),
            max_concurrency: number("MAX_CONCURRENCY", 4) as usize,
            collaborator_timeout: Duration::from_secs(number("COLLABORATOR_TIMEOUT_SECS", 60)),
            tts_service: get("TTS_SERVICE", "gtts")
                .parse()
                .unwrap_or(SpeechBackend::Gtts),
            azure_speech,
            addr: get("ADDR", "127.0.0.1"),
            port: get("PORT", "3000"),
            app_env: get("APP_ENV", "local"),
            storage_backend: get("STORAGE_BACKEND", "local")
                .parse()
                .unwrap_or(StorageBackend::Local),
            publish_dir: var("PUBLISH_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| output_dir.clone()),
            output_dir,
            spaces,
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            max_concurrency: self.max_concurrency,
            collaborator_timeout: self.collaborator_timeout,
            encoder_timeouts: EncoderTimeouts::default(),
        }
    }
}
