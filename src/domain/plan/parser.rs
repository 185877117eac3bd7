//! Recovery of a segment list from an untrusted planner response.
//!
//! The planner is a generative model and routinely wraps its answer in
//! markdown fences, adds prose around it, leaves stray words between array
//! elements or emits trailing commas. [`recover_segments`] undoes all of that.

use super::RawSegment;
use crate::error::PlanningError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, warn};

const JSON_PUNCTUATION: &[char] = &['{', '}', '[', ']', '"', ':', ','];

/// Parse the planner response into raw segment records.
///
/// Fails only when no JSON array can be recovered at all.
pub fn recover_segments(response: &str) -> Result<Vec<RawSegment>, PlanningError> {
    let candidate = drop_stray_lines(outer_array(strip_fences(response)));

    let values = match serde_json::from_str::<Vec<Value>>(&candidate) {
        Ok(values) => values,
        Err(first) => {
            debug!(error = %first, "strict parse failed, applying repairs");
            let repaired = repair(&candidate);
            serde_json::from_str::<Vec<Value>>(&repaired).map_err(|second| {
                PlanningError::Unrecoverable(format!("{} (after repair: {})", first, second))
            })?
        }
    };

    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawSegment>(value) {
            Ok(segment) => Some(segment),
            Err(e) => {
                warn!(error = %e, "dropping malformed segment record");
                None
            }
        })
        .collect())
}

fn strip_fences(response: &str) -> &str {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn outer_array(text: &str) -> &str {
    match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

fn drop_stray_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let stripped = line.trim();
            let stray = !stripped.is_empty()
                && !stripped.contains(JSON_PUNCTUATION)
                && stripped.len() < 20
                && stripped.chars().all(|c| c.is_alphabetic() || c == ' ');
            if stray {
                debug!(line = stripped, "removing stray text");
            }
            !stray
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn repair(text: &str) -> String {
    static TRAILING_OBJECT: OnceLock<Regex> = OnceLock::new();
    static TRAILING_ARRAY: OnceLock<Regex> = OnceLock::new();
    static MISSING_SEPARATOR: OnceLock<Regex> = OnceLock::new();

    let trailing_object = TRAILING_OBJECT.get_or_init(|| Regex::new(r",\s*\}").unwrap());
    let trailing_array = TRAILING_ARRAY.get_or_init(|| Regex::new(r",\s*\]").unwrap());
    let missing_separator = MISSING_SEPARATOR.get_or_init(|| Regex::new(r"\}\s*\{").unwrap());

    let fixed = trailing_object.replace_all(text, "}");
    let fixed = trailing_array.replace_all(&fixed, "]");
    missing_separator.replace_all(&fixed, "},{").into_owned()
}
