//! Human-readable `production_summary.md`, rendered from a [`JobReport`].

use crate::domain::jobs::{JobReport, JobState};
use crate::error::AssetKind;
use std::path::Path;

const NARRATION_PREVIEW_CHARS: usize = 100;

fn mark(present: bool) -> &'static str {
    if present {
        "✅"
    } else {
        "❌"
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn render(report: &JobReport) -> String {
    let mut lines: Vec<String> = vec![
        "# Explainer Video Production Summary\n".to_string(),
        format!("- **Job**: `{}`", report.job_id),
        format!("- **State**: {}\n", report.state),
    ];

    if let Some(plan) = &report.plan {
        let meta = &plan.video_metadata;
        lines.push("## Video Details".to_string());
        lines.push(format!("- **Total Segments**: {}", meta.total_segments));
        lines.push(format!("- **Estimated Duration**: {} seconds", meta.estimated_duration));
        if let Some(total) = report.total_duration {
            lines.push(format!("- **Actual Duration**: {:.1} seconds", total));
        }
        lines.push(format!("- **Created**: {}", meta.created_at));
        lines.push(format!("- **Format**: {}\n", meta.format));

        lines.push("## Segments Overview\n".to_string());
        for segment in &plan.segments {
            let n = segment.segment_number;
            lines.push(format!("### Segment {}: {}", n, segment.title));
            lines.push(format!("- **Duration**: {} seconds", segment.duration_seconds));
            lines.push(format!(
                "- **Timing**: {}s - {}s",
                segment.timing.start_time, segment.timing.end_time
            ));
            if let Some(actual) = segment.actual_timing {
                lines.push(format!(
                    "- **In Final Video**: {:.2}s - {:.2}s",
                    actual.start_time, actual.end_time
                ));
            }
            if let Some(status) = report.segments.iter().find(|s| s.segment_number == n) {
                lines.push(format!(
                    "- **Assets**: image {} narration {} audio {} clip {}",
                    mark(status.image),
                    mark(status.narration),
                    mark(status.audio),
                    mark(status.clip)
                ));
            }
            let preview: String = segment
                .narration_text
                .chars()
                .take(NARRATION_PREVIEW_CHARS)
                .collect();
            let ellipsis = if segment.narration_text.chars().count() > NARRATION_PREVIEW_CHARS {
                "..."
            } else {
                ""
            };
            lines.push(format!("- **Narration**: {}{}\n", preview, ellipsis));
        }
    }

    let failures: Vec<String> = report
        .asset_errors
        .iter()
        .map(ToString::to_string)
        .chain(report.compile_errors.iter().map(ToString::to_string))
        .chain(
            report
                .concatenation_error
                .iter()
                .map(|e| format!("concatenation failed: {}", e)),
        )
        .chain(report.fatal_error.iter().cloned())
        .collect();
    if !failures.is_empty() {
        lines.push("## Failures\n".to_string());
        lines.extend(failures.iter().map(|failure| format!("- {}", failure)));
        lines.push(String::new());
    }

    lines.push("## Final Video\n".to_string());
    match &report.final_video {
        Some(video) => {
            lines.push(format!("- `{}`", file_name(video)));
            if !report.skipped_segments.is_empty() {
                let skipped: Vec<String> =
                    report.skipped_segments.iter().map(u32::to_string).collect();
                lines.push(format!("- Missing segments: {}", skipped.join(", ")));
            }
        }
        None => {
            let reason = report
                .compile_skipped
                .clone()
                .or_else(|| report.concatenation_error.as_ref().map(ToString::to_string))
                .unwrap_or_else(|| match report.state {
                    JobState::Failed => "job failed".to_string(),
                    _ => "no segment could be compiled".to_string(),
                });
            lines.push(format!("- Not created: {}", reason));
        }
    }

    let complete_audio_failed = report
        .asset_errors
        .iter()
        .any(|e| e.kind == AssetKind::CompleteAudio);
    if report.complete_audio.is_some() {
        lines.push("\n## Complete Narration Audio\n".to_string());
        lines.push("- `complete_narration_audio.mp3`".to_string());
    } else if complete_audio_failed {
        lines.push("\n## Complete Narration Audio\n".to_string());
        lines.push("- Not created".to_string());
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
