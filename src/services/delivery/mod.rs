// Delivery Module
// Collaborator contracts plus the paced, per-segment delivery pipeline:
// - speech: optional text-to-speech substitution per segment
// - pipeline: gating, segmentation and sequential dispatch of one reply

pub mod speech;
pub mod pipeline;

pub use pipeline::ReplySplitter;
pub use speech::substitute_speech;

use crate::models::{ContentUnit, ReplyEnvelope};
use crate::services::tts_provider::SynthesisError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Out-of-band send primitive for intermediate segments. One attempt per
/// call; the caller never retries.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, destination: &str, units: &[ContentUnit]) -> anyhow::Result<()>;
}

/// Turns text into an audio file. `Ok(None)` means nothing was produced.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Option<PathBuf>, SynthesisError>;
}

/// Host-level speech settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostSpeechSettings {
    pub enabled: bool,
    pub trigger_probability: f64,
    pub dual_output: bool,
}

impl Default for HostSpeechSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_probability: 1.0,
            dual_output: false,
        }
    }
}

/// Host's view on whether speech applies.
pub trait SpeechPolicy: Send + Sync {
    fn settings(&self) -> HostSpeechSettings;

    /// Whether this particular reply (and its session) should be spoken.
    fn should_speak(&self, reply: &ReplyEnvelope) -> bool;
}
