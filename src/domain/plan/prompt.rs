//! Prompts sent to the planner, and the image prompt enhancement template.

use serde::Serialize;

pub const SYSTEM_PROMPT: &str = r#"You are an expert infographic designer and educational content strategist. Your task is to create coordinated image-text pairs for explainer videos.

CRITICAL: You must respond with ONLY a valid JSON array. No explanations, no markdown, no extra text.

Required JSON format - each segment must have these exact fields:
- segment_number: Integer (1, 2, 3...)
- title: String (short, descriptive title)
- narration_text: String (conversational text for TTS, 1-2 sentences)
- key_points: Array of strings (main concepts to highlight)
- image_prompt: String (detailed prompt for coordinated infographic with empty placeholders)
- text_overlay: String (detailed structured text that maps to image placeholders)
- duration_seconds: Integer (8-12 seconds per segment)

The image_prompt and text_overlay must work together as one coordinated infographic:
- image_prompt describes a light-coloured, professional infographic with specific empty
  placeholder areas for text and NO text in the image itself;
- text_overlay holds the structured content (numbered lists, steps, full sentences) that
  fills those placeholders.

IMPORTANT: Return ONLY the JSON array, nothing else. No ```json``` markers, no explanations."#;

const REQUIREMENTS: [&str; 5] = [
    "Create logical, flowing segments",
    "Each segment covers one main concept",
    "Suitable for 8-12 seconds of narration",
    "Include detailed image generation prompts",
    "Professional, educational tone",
];

/// What the planner is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub text: String,
    pub target_duration: u32,
    pub segments_count: u32,
}

impl PlanRequest {
    /// Aims for roughly 8 seconds per segment, between 3 and 10 segments.
    pub fn new(text: impl Into<String>, target_duration: u32, segments_count: Option<u32>) -> Self {
        let segments_count = segments_count
            .filter(|n| *n > 0)
            .unwrap_or_else(|| (target_duration / 8).clamp(3, 10));
        Self {
            text: text.into(),
            target_duration,
            segments_count,
        }
    }

    pub fn user_prompt(&self) -> String {
        #[derive(Serialize)]
        struct UserPrompt<'a> {
            task: &'static str,
            text_content: &'a str,
            segments_count: u32,
            target_duration: u32,
            requirements: [&'static str; 5],
        }

        let prompt = UserPrompt {
            task: "analyze_text_for_video_segments",
            text_content: &self.text,
            segments_count: self.segments_count,
            target_duration: self.target_duration,
            requirements: REQUIREMENTS,
        };
        serde_json::to_string_pretty(&prompt).unwrap_or_default()
    }
}

/// Wrap a planner image prompt in the infographic layout template.
///
/// Already-enhanced prompts are returned unchanged, so re-validating a saved
/// plan does not nest the template.
pub fn enhance_image_prompt(original: &str) -> String {
    let original = original.trim();
    if original.is_empty() || original.starts_with(ENHANCED_MARKER) {
        return original.to_string();
    }
    format!(
        "{ENHANCED_MARKER}\n\n\
BASE DESIGN CONCEPT:\n{original}\n\n\
CRITICAL REQUIREMENTS:\n\
- Light color palette: whites, light blues, soft pastels, light grays\n\
- 16:9 aspect ratio (1920x1080 pixels)\n\
- Professional infographic/educational style\n\
- Clean, minimal, uncluttered design\n\n\
EMPTY PLACEHOLDER AREAS:\n\
- Specific empty rectangular areas with light backgrounds for text placement\n\
- Placeholders positioned logically along the content flow\n\
- NO TEXT OR TYPOGRAPHY in the image, only empty spaces for text\n\n\
VISUAL ELEMENTS:\n\
- Simple icons and illustrations related to the topic\n\
- Connecting arrows or flow indicators where appropriate\n\
- Plenty of white space\n\n\
The image should function as a structured template ready for detailed text overlays."
    )
}

const ENHANCED_MARKER: &str =
    "Create a light-colored, professional infographic layout for an explainer video.";
