use crate::domain::media::VideoProfile;
use crate::domain::plan::SegmentPlan;
use crate::error::{AssetError, AssetKind, CompileError, ConcatenationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_TARGET_DURATION: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Planning,
    AssetGeneration,
    Compiling,
    Complete,
    DegradedComplete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::DegradedComplete | JobState::Failed
        )
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Planning, AssetGeneration)
                | (Planning, Failed)
                | (AssetGeneration, Compiling)
                | (Compiling, Complete)
                | (Compiling, DegradedComplete)
                | (Compiling, Failed)
        )
    }

    /// Move to `next`, refusing any transition the state machine does not allow.
    pub fn advance(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.can_transition_to(next) {
            return Err(InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Planning => "planning",
            JobState::AssetGeneration => "asset_generation",
            JobState::Compiling => "compiling",
            JobState::Complete => "complete",
            JobState::DegradedComplete => "degraded_complete",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid job state transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechOptions {
    pub lang: String,
    pub voice: String,
    pub tld: String,
    pub slow: bool,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            voice: "en-US-AriaNeural".to_string(),
            tld: "com".to_string(),
            slow: false,
        }
    }
}

/// Everything a caller can ask of one generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub text: String,
    pub target_duration: u32,
    pub segments_count: Option<u32>,
    pub enable_audio: bool,
    pub speech: SpeechOptions,
    pub compile_video: bool,
    pub profile: VideoProfile,
    pub topic_hint: Option<String>,
}

impl GenerateRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target_duration: DEFAULT_TARGET_DURATION,
            segments_count: None,
            enable_audio: true,
            speech: SpeechOptions::default(),
            compile_video: true,
            profile: VideoProfile::default(),
            topic_hint: None,
        }
    }
}

/// Which artifacts exist for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentStatus {
    pub segment_number: u32,
    pub image: bool,
    pub narration: bool,
    pub audio: bool,
    pub clip: bool,
}

/// Programmatic outcome of a job. Also the source of the production summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub job_root: PathBuf,
    pub state: JobState,
    pub plan: Option<SegmentPlan>,
    pub segments: Vec<SegmentStatus>,
    pub asset_errors: Vec<AssetError>,
    pub compile_errors: Vec<CompileError>,
    /// Segments not compiled because their image or audio is missing.
    pub skipped_segments: Vec<u32>,
    pub concatenation_error: Option<ConcatenationError>,
    /// Why compilation did not run at all, when it did not.
    pub compile_skipped: Option<String>,
    pub fatal_error: Option<String>,
    pub final_video: Option<PathBuf>,
    pub total_duration: Option<f64>,
    pub complete_audio: Option<PathBuf>,
    pub summary: Option<PathBuf>,
}

impl JobReport {
    pub fn new(job_id: impl Into<String>, job_root: PathBuf) -> Self {
        Self {
            job_id: job_id.into(),
            job_root,
            state: JobState::Planning,
            plan: None,
            segments: Vec::new(),
            asset_errors: Vec::new(),
            compile_errors: Vec::new(),
            skipped_segments: Vec::new(),
            concatenation_error: None,
            compile_skipped: None,
            fatal_error: None,
            final_video: None,
            total_duration: None,
            complete_audio: None,
            summary: None,
        }
    }

    pub fn asset_failed(&self, segment_number: u32, kind: AssetKind) -> bool {
        self.asset_errors
            .iter()
            .any(|e| e.segment_number == Some(segment_number) && e.kind == kind)
    }

    pub fn compiled_segments(&self) -> Vec<u32> {
        self.segments
            .iter()
            .filter(|s| s.clip)
            .map(|s| s.segment_number)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut state = JobState::Planning;
        state.advance(JobState::AssetGeneration).unwrap();
        state.advance(JobState::Compiling).unwrap();
        state.advance(JobState::Complete).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn terminal_states_have_no_way_out() {
        for terminal in [
            JobState::Complete,
            JobState::DegradedComplete,
            JobState::Failed,
        ] {
            let mut state = terminal;
            let err = state.advance(JobState::Planning).unwrap_err();
            assert_eq!(err.from, terminal);
            assert_eq!(state, terminal);
        }
    }

    #[test]
    fn asset_generation_cannot_fail_the_job() {
        assert!(!JobState::AssetGeneration.can_transition_to(JobState::Failed));
        assert!(!JobState::Planning.can_transition_to(JobState::Compiling));
    }

    #[test]
    fn report_serializes_state_snake_case() {
        let mut report = JobReport::new("1_deadbeef_x", PathBuf::from("/tmp/x"));
        report.state = JobState::DegradedComplete;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "degraded_complete");
    }
}
