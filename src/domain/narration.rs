//! Plain-text artifacts derived from the plan: per-segment narration scripts,
//! overlay text files and the complete narration script.

use crate::domain::plan::{Segment, SegmentPlan};

const SECTION_RULE_WIDTH: usize = 50;

pub fn narration_file(segment: &Segment) -> String {
    format!(
        "# Narration for Segment {}\n# Title: {}\n# Duration: {} seconds\n\n{}",
        segment.segment_number, segment.title, segment.duration_seconds, segment.narration_text
    )
}

/// `None` when the segment has no overlay text.
pub fn overlay_file(segment: &Segment) -> Option<String> {
    if segment.text_overlay.trim().is_empty() {
        return None;
    }
    Some(format!(
        "# Text Overlay for Segment {}\n# Title: {}\n\n{}",
        segment.segment_number, segment.title, segment.text_overlay
    ))
}

pub fn complete_narration_file(plan: &SegmentPlan) -> String {
    let rule = "-".repeat(SECTION_RULE_WIDTH);
    let header = format!(
        "# Complete Video Narration Script\n# Total Duration: {} seconds\n\n",
        plan.video_metadata.estimated_duration
    );
    let sections: String = plan
        .segments
        .iter()
        .map(|segment| {
            format!(
                "## Segment {}: {}\nDuration: {} seconds\nTiming: {}s - {}s\n\n{}\n\n{}\n\n",
                segment.segment_number,
                segment.title,
                segment.duration_seconds,
                segment.timing.start_time,
                segment.timing.end_time,
                segment.narration_text,
                rule
            )
        })
        .collect();
    header + &sections
}

/// Collapse every whitespace run into a single space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::RawSegment;
    use chrono::Local;

    fn plan() -> SegmentPlan {
        let raw = vec![
            RawSegment {
                title: Some("Intro".into()),
                narration_text: Some("Hello\n  world.".into()),
                text_overlay: Some("1. First".into()),
                duration_seconds: Some(8),
                ..Default::default()
            },
            RawSegment {
                title: Some("Outro".into()),
                narration_text: Some("Bye.".into()),
                ..Default::default()
            },
        ];
        SegmentPlan::from_raw(raw, Local::now()).unwrap()
    }

    #[test]
    fn narration_file_has_header_then_text() {
        let plan = plan();
        assert_eq!(
            narration_file(&plan.segments[0]),
            "# Narration for Segment 1\n# Title: Intro\n# Duration: 8 seconds\n\nHello\n  world."
        );
    }

    #[test]
    fn overlay_only_when_present() {
        let plan = plan();
        assert!(overlay_file(&plan.segments[0])
            .unwrap()
            .ends_with("# Title: Intro\n\n1. First"));
        assert!(overlay_file(&plan.segments[1]).is_none());
    }

    #[test]
    fn complete_script_lists_segments_with_hint_timing() {
        let text = complete_narration_file(&plan());
        assert!(text.starts_with("# Complete Video Narration Script\n# Total Duration: 18 seconds"));
        assert!(text.contains("## Segment 2: Outro\nDuration: 10 seconds\nTiming: 8s - 18s\n\nBye."));
        assert_eq!(text.matches(&"-".repeat(50)).count(), 2);
    }

    #[test]
    fn complete_script_layout() {
        let rule = "-".repeat(50);
        assert_eq!(
            complete_narration_file(&plan()),
            format!(
                "# Complete Video Narration Script\n# Total Duration: 18 seconds\n\n\
                 ## Segment 1: Intro\nDuration: 8 seconds\nTiming: 0s - 8s\n\nHello\n  world.\n\n{rule}\n\n\
                 ## Segment 2: Outro\nDuration: 10 seconds\nTiming: 8s - 18s\n\nBye.\n\n{rule}\n\n"
            )
        );
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(normalize_whitespace(" a\n\tb   c "), "a b c");
    }
}
