//! The Segment Plan: the ordered list of scenes that every later stage consumes.
//!
//! It is persisted as `video_script.json` in the job root and rewritten after
//! every stage that learns a new fact about a segment. Each asset runner owns
//! exactly one optional field (`background_image`, `narration_file`,
//! `audio_file`), and the compile stage owns `actual_timing`.

pub mod parser;
pub mod prompt;

use crate::error::{PlanningError, WorkspaceError};
use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub use parser::recover_segments;
pub use prompt::{enhance_image_prompt, PlanRequest};

pub const DEFAULT_SEGMENT_DURATION: u32 = 10;
pub const SCRIPT_FORMAT: &str = "explainer_video";
const GENERATION_METHOD: &str = "gemini_with_separate_prompts";

/// A segment record as emitted by the planner, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawSegment {
    #[serde(deserialize_with = "lenient_u32")]
    pub segment_number: Option<u32>,
    pub title: Option<String>,
    pub narration_text: Option<String>,
    pub key_points: Vec<String>,
    pub image_prompt: Option<String>,
    pub text_overlay: Option<String>,
    #[serde(deserialize_with = "lenient_u32")]
    pub duration_seconds: Option<u32>,
}

/// Accepts integers, floats and numeric strings; anything else becomes `None`.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().and_then(|f| {
            if f >= 0.0 && f <= u32::MAX as f64 {
                Some(f.round() as u32)
            } else {
                None
            }
        }),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_number: u32,
    pub title: String,
    #[serde(default)]
    pub narration_text: String,
    #[serde(default)]
    pub text_overlay: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub image_prompt: String,
    #[serde(default = "default_duration")]
    pub duration_seconds: u32,
    /// Planner intent: cumulative hint durations, never rewritten.
    pub timing: Timing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<PathBuf>,
    /// Position in the final video, from measured clip durations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_timing: Option<Timing>,
}

fn default_duration() -> u32 {
    DEFAULT_SEGMENT_DURATION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub total_segments: usize,
    /// Sum of the hint durations, in seconds.
    pub estimated_duration: u64,
    pub created_at: String,
    pub format: String,
    #[serde(default)]
    pub generation_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPlan {
    pub video_metadata: VideoMetadata,
    pub segments: Vec<Segment>,
}

impl SegmentPlan {
    /// Validate and repair planner output into a plan.
    ///
    /// Segments are ordered by the planner's numbering (records without a
    /// number keep their relative position after the numbered ones) and then
    /// renumbered contiguously from 1.
    pub fn from_raw(
        raw: Vec<RawSegment>,
        created_at: DateTime<Local>,
    ) -> Result<Self, PlanningError> {
        if raw.is_empty() {
            return Err(PlanningError::EmptyPlan);
        }

        let mut ordered: Vec<(usize, RawSegment)> = raw.into_iter().enumerate().collect();
        ordered.sort_by_key(|(position, seg)| (seg.segment_number.unwrap_or(u32::MAX), *position));

        let mut start = 0u64;
        let segments: Vec<Segment> = ordered
            .into_iter()
            .enumerate()
            .map(|(index, (_, raw))| {
                let number = index as u32 + 1;
                let duration = raw
                    .duration_seconds
                    .filter(|d| *d > 0)
                    .unwrap_or(DEFAULT_SEGMENT_DURATION);
                let end = start + u64::from(duration);
                let segment = Segment {
                    segment_number: number,
                    title: raw
                        .title
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| format!("Segment {}", number)),
                    narration_text: raw.narration_text.unwrap_or_default().trim().to_string(),
                    text_overlay: raw.text_overlay.unwrap_or_default().trim().to_string(),
                    key_points: raw.key_points,
                    image_prompt: enhance_image_prompt(&raw.image_prompt.unwrap_or_default()),
                    duration_seconds: duration,
                    timing: Timing {
                        start_time: start as f64,
                        end_time: end as f64,
                    },
                    background_image: None,
                    narration_file: None,
                    audio_file: None,
                    actual_timing: None,
                };
                start = end;
                segment
            })
            .collect();

        Ok(Self {
            video_metadata: VideoMetadata {
                total_segments: segments.len(),
                estimated_duration: start,
                created_at: created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                format: SCRIPT_FORMAT.to_string(),
                generation_method: GENERATION_METHOD.to_string(),
            },
            segments,
        })
    }

    pub fn segment(&self, number: u32) -> Option<&Segment> {
        self.segments.iter().find(|s| s.segment_number == number)
    }

    pub fn segment_mut(&mut self, number: u32) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.segment_number == number)
    }

    pub fn segment_numbers(&self) -> Vec<u32> {
        self.segments.iter().map(|s| s.segment_number).collect()
    }

    /// Record where each compiled segment sits in the final video.
    ///
    /// `clips` must be in playback order; segments not listed lose any
    /// previous `actual_timing`.
    pub fn apply_actual_durations(&mut self, clips: &[(u32, f64)]) {
        for segment in &mut self.segments {
            segment.actual_timing = None;
        }
        let mut start = 0.0;
        for (number, duration) in clips {
            if let Some(segment) = self.segment_mut(*number) {
                segment.actual_timing = Some(Timing {
                    start_time: start,
                    end_time: start + duration,
                });
            }
            start += duration;
        }
    }

    pub async fn load(path: &Path) -> Result<Self, WorkspaceError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| WorkspaceError::io(path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Rewrite the script file in place.
    pub async fn save(&self, path: &Path) -> Result<(), WorkspaceError> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| WorkspaceError::io(path, e))
    }
}
