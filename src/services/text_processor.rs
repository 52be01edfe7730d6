// Text Processing Service
// Cleanup, length and preview helpers shared by segmentation and delivery

use crate::models::{ContentUnit, Segment};
use regex::Regex;

/// Remove every `pattern` match from the segment's text units.
///
/// Produces a new segment; the input is left untouched. Text units that
/// become empty are dropped, all other units pass through as-is.
pub fn apply_cleanup(segment: &Segment, pattern: Option<&Regex>) -> Segment {
    let Some(re) = pattern else {
        return segment.clone();
    };

    segment
        .units
        .iter()
        .filter_map(|unit| match unit {
            ContentUnit::Text { text } => {
                let cleaned = re.replace_all(text, "");
                if cleaned.is_empty() {
                    None
                } else {
                    Some(ContentUnit::text(cleaned.into_owned()))
                }
            }
            other => Some(other.clone()),
        })
        .collect::<Vec<_>>()
        .into()
}

/// Number of text characters in a segment (media contributes nothing).
pub fn text_length(segment: &Segment) -> usize {
    segment
        .units
        .iter()
        .filter_map(ContentUnit::as_text)
        .map(|t| t.chars().count())
        .sum()
}

/// Total text characters across a unit sequence.
pub fn total_text_length(units: &[ContentUnit]) -> usize {
    units
        .iter()
        .filter_map(ContentUnit::as_text)
        .map(|t| t.chars().count())
        .sum()
}

/// Single-line preview for logs, with media shown as bracketed tags.
pub fn preview(segment: &Segment, max_chars: usize) -> String {
    let mut rendered = String::new();
    for unit in &segment.units {
        match unit {
            ContentUnit::Text { text } => rendered.push_str(text),
            ContentUnit::Image { .. } => rendered.push_str("[image]"),
            ContentUnit::Mention { target } => {
                rendered.push('@');
                rendered.push_str(target);
            }
            ContentUnit::FaceIcon { id } => {
                rendered.push_str("[face:");
                rendered.push_str(id);
                rendered.push(']');
            }
            ContentUnit::ReplyMarker { .. } => rendered.push_str("[reply]"),
            ContentUnit::Audio { .. } => rendered.push_str("[audio]"),
            ContentUnit::Other { kind, .. } => {
                rendered.push('[');
                rendered.push_str(kind);
                rendered.push(']');
            }
        }
    }

    let flat = rendered.trim().replace(&['\n', '\r'][..], " ");
    let mut out: String = flat.chars().take(max_chars).collect();
    if flat.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
