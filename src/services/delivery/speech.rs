// Speech Substitution
// Replaces qualifying text units of a segment with synthesized audio

use super::SpeechSynthesizer;
use crate::models::{ContentUnit, Segment};
use tracing::{debug, warn};

/// Length of the unit as written; whitespace-only units are never spoken.
const MIN_SPEECH_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechResult {
    pub segment: Segment,
    /// At least one text unit became audio.
    pub substituted: bool,
}

/// Send each qualifying text unit to the synthesizer. On success the unit
/// becomes audio (kept alongside the text when `dual_output` is set); on
/// failure or empty output the text stays as it was.
pub async fn substitute_speech(
    segment: &Segment,
    synthesizer: &dyn SpeechSynthesizer,
    dual_output: bool,
) -> SpeechResult {
    let mut units = Vec::with_capacity(segment.len() + 1);
    let mut substituted = false;

    for unit in &segment.units {
        let ContentUnit::Text { text } = unit else {
            units.push(unit.clone());
            continue;
        };

        let spoken = text.trim();
        if text.chars().count() < MIN_SPEECH_CHARS || spoken.is_empty() {
            units.push(unit.clone());
            continue;
        }

        match synthesizer.synthesize(spoken).await {
            Ok(Some(path)) => {
                if dual_output {
                    units.push(unit.clone());
                }
                units.push(ContentUnit::audio(path));
                substituted = true;
            }
            Ok(None) => {
                debug!("[speech] synthesizer produced no audio, keeping text");
                units.push(unit.clone());
            }
            Err(e) => {
                warn!("[speech] synthesis failed, keeping text: {}", e);
                units.push(unit.clone());
            }
        }
    }

    SpeechResult {
        segment: Segment::from(units),
        substituted,
    }
}
