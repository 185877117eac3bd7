//! Error taxonomy for the generation pipeline.
//!
//! Only [`PlanningError`] and [`WorkspaceError`] fail a job. Asset, compile and
//! concatenation errors are recorded in the job report and the job carries on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error type returned by collaborator ports (planner, renderer, speech, storage).
pub type PortError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace i/o failure at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown job `{0}`")]
    UnknownJob(String),

    #[error("could not allocate a fresh job directory under `{0}`")]
    Collision(PathBuf),

    #[error("`{0}` is not a job directory")]
    NotAJob(PathBuf),

    #[error("script serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkspaceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("planner service failed: {0}")]
    Planner(String),

    #[error("planner service timed out after {0:?}")]
    TimedOut(Duration),

    #[error("no JSON array could be recovered from the planner response: {0}")]
    Unrecoverable(String),

    #[error("planner returned an empty segment list")]
    EmptyPlan,
}

/// Which artifact of a segment an [`AssetError`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Overlay,
    Narration,
    Audio,
    CompleteAudio,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Image => "image",
            AssetKind::Overlay => "overlay",
            AssetKind::Narration => "narration",
            AssetKind::Audio => "audio",
            AssetKind::CompleteAudio => "complete_audio",
        };
        f.write_str(name)
    }
}

/// A per-segment, per-artifact failure. Never fatal to the job.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind} asset failed{}: {cause}", segment_suffix(.segment_number))]
pub struct AssetError {
    /// `None` for job-level artifacts such as the complete narration track.
    pub segment_number: Option<u32>,
    pub kind: AssetKind,
    pub cause: String,
}

fn segment_suffix(segment_number: &Option<u32>) -> String {
    match segment_number {
        Some(n) => format!(" for segment {}", n),
        None => String::new(),
    }
}

impl AssetError {
    pub fn new(segment_number: Option<u32>, kind: AssetKind, cause: impl Into<String>) -> Self {
        Self {
            segment_number,
            kind,
            cause: cause.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompileError {
    #[error("segment {segment_number}: input `{path}` is missing or empty")]
    MissingInput { segment_number: u32, path: PathBuf },

    #[error("segment {segment_number}: encoder exited with status {status:?}: {stderr}")]
    EncoderFailed {
        segment_number: u32,
        status: Option<i32>,
        stderr: String,
    },

    #[error("segment {segment_number}: encoder timed out after {timeout_secs}s")]
    TimedOut { segment_number: u32, timeout_secs: u64 },

    #[error("segment {segment_number}: encoder could not run: {cause}")]
    Encoder { segment_number: u32, cause: String },

    #[error("segment {segment_number}: encoder produced no output at `{path}`")]
    EmptyOutput { segment_number: u32, path: PathBuf },
}

impl CompileError {
    pub fn segment_number(&self) -> u32 {
        match self {
            CompileError::MissingInput { segment_number, .. }
            | CompileError::EncoderFailed { segment_number, .. }
            | CompileError::TimedOut { segment_number, .. }
            | CompileError::Encoder { segment_number, .. }
            | CompileError::EmptyOutput { segment_number, .. } => *segment_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConcatenationError {
    #[error("no clips to concatenate")]
    NoClips,

    #[error("clip `{0}` is missing or empty")]
    MissingClip(PathBuf),

    #[error("could not write concat manifest: {0}")]
    Manifest(String),

    #[error("encoder exited with status {status:?}: {stderr}")]
    EncoderFailed { status: Option<i32>, stderr: String },

    #[error("encoder timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },

    #[error("encoder could not run: {0}")]
    Encoder(String),

    #[error("encoder produced no output at `{0}`")]
    EmptyOutput(PathBuf),
}

/// Failures of the encoder capability itself (as opposed to a non-zero exit).
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("could not run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("probe of `{path}` failed: {reason}")]
    Probe { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_error_display_names_segment_and_kind() {
        let err = AssetError::new(Some(2), AssetKind::Image, "renderer returned 500");
        assert_eq!(
            err.to_string(),
            "image asset failed for segment 2: renderer returned 500"
        );

        let job_level = AssetError::new(None, AssetKind::CompleteAudio, "quota");
        assert_eq!(job_level.to_string(), "complete_audio asset failed: quota");
    }

    #[test]
    fn compile_error_reports_its_segment() {
        let err = CompileError::TimedOut {
            segment_number: 4,
            timeout_secs: 300,
        };
        assert_eq!(err.segment_number(), 4);
        assert!(err.to_string().contains("300s"));
    }

    #[test]
    fn asset_kind_serializes_snake_case() {
        let json = serde_json::to_string(&AssetKind::CompleteAudio).unwrap();
        assert_eq!(json, "\"complete_audio\"");
    }
}
