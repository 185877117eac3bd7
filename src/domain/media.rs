//! Fixed encoding profile and the encoder invocations built from it.
//!
//! Every clip is encoded to the same profile so that concatenation can stream
//! copy without re-encoding.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FALLBACK_DURATION: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "4k")]
    Uhd,
}

impl Resolution {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Hd => (1280, 720),
            Resolution::FullHd => (1920, 1080),
            Resolution::Uhd => (3840, 2160),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "720p" => Ok(Resolution::Hd),
            "1080p" => Ok(Resolution::FullHd),
            "4k" | "2160p" => Ok(Resolution::Uhd),
            other => Err(format!("unknown resolution `{}` (expected 720p, 1080p or 4k)", other)),
        }
    }
}

/// Target format shared by every clip of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub pixel_format: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    /// Used when the audio duration cannot be probed.
    pub fallback_duration: f64,
}

impl VideoProfile {
    pub fn new(resolution: Resolution, fps: u32) -> Self {
        let (width, height) = resolution.dimensions();
        Self {
            width,
            height,
            fps,
            ..Self::default()
        }
    }

    fn filter_graph(&self) -> String {
        let (w, h) = (self.width, self.height);
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black"
        )
    }
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            pixel_format: "yuv420p".to_string(),
            video_bitrate: "2M".to_string(),
            audio_bitrate: "128k".to_string(),
            fallback_duration: DEFAULT_FALLBACK_DURATION,
        }
    }
}

/// One invocation of the external encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeSpec {
    /// Hold `image` for `duration` seconds, muxed with `audio`.
    StillClip {
        image: PathBuf,
        audio: PathBuf,
        duration: f64,
        profile: VideoProfile,
        output: PathBuf,
    },
    /// Stream-copy every file listed in `manifest` into `output`.
    Concat { manifest: PathBuf, output: PathBuf },
}

impl EncodeSpec {
    pub fn output(&self) -> &Path {
        match self {
            EncodeSpec::StillClip { output, .. } | EncodeSpec::Concat { output, .. } => output,
        }
    }

    /// Command-line arguments for `ffmpeg`, output path last.
    pub fn args(&self) -> Vec<String> {
        match self {
            EncodeSpec::StillClip {
                image,
                audio,
                duration,
                profile,
                output,
            } => vec![
                "-y".into(),
                "-loop".into(),
                "1".into(),
                "-i".into(),
                image.to_string_lossy().into_owned(),
                "-i".into(),
                audio.to_string_lossy().into_owned(),
                "-c:v".into(),
                profile.video_codec.clone(),
                "-c:a".into(),
                profile.audio_codec.clone(),
                "-pix_fmt".into(),
                profile.pixel_format.clone(),
                "-shortest".into(),
                "-t".into(),
                format!("{:.3}", duration),
                "-vf".into(),
                profile.filter_graph(),
                "-r".into(),
                profile.fps.to_string(),
                "-b:v".into(),
                profile.video_bitrate.clone(),
                "-b:a".into(),
                profile.audio_bitrate.clone(),
                output.to_string_lossy().into_owned(),
            ],
            EncodeSpec::Concat { manifest, output } => vec![
                "-y".into(),
                "-f".into(),
                "concat".into(),
                "-safe".into(),
                "0".into(),
                "-i".into(),
                manifest.to_string_lossy().into_owned(),
                "-c".into(),
                "copy".into(),
                output.to_string_lossy().into_owned(),
            ],
        }
    }
}

/// Per-call limits for the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderTimeouts {
    pub probe: Duration,
    pub clip: Duration,
    pub concat: Duration,
}

impl Default for EncoderTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(10),
            clip: Duration::from_secs(300),
            concat: Duration::from_secs(600),
        }
    }
}

/// Concat demuxer manifest: one `file '<path>'` line per clip, in order.
pub fn concat_manifest(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| {
            let escaped = clip.to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}
