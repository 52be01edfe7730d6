// Reply Splitter Data Models
// Content units, segments and per-reply processing state

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============ Content Units ============

/// One atomic piece of reply content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentUnit {
    Text { text: String },
    Image { source: String },
    Mention { target: String },
    FaceIcon { id: String },
    #[serde(rename_all = "camelCase")]
    ReplyMarker { message_id: String },
    Audio { path: PathBuf },
    Other {
        kind: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl ContentUnit {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(source: impl Into<String>) -> Self {
        Self::Image { source: source.into() }
    }

    pub fn mention(target: impl Into<String>) -> Self {
        Self::Mention { target: target.into() }
    }

    pub fn face(id: impl Into<String>) -> Self {
        Self::FaceIcon { id: id.into() }
    }

    pub fn reply_marker(message_id: impl Into<String>) -> Self {
        Self::ReplyMarker { message_id: message_id.into() }
    }

    pub fn audio(path: impl Into<PathBuf>) -> Self {
        Self::Audio { path: path.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_reply_marker(&self) -> bool {
        matches!(self, Self::ReplyMarker { .. })
    }

    /// Units other than text and reply markers carry deliverable media.
    pub fn is_media(&self) -> bool {
        !matches!(self, Self::Text { .. } | Self::ReplyMarker { .. })
    }
}

/// The full original reply in reading order.
pub type UnitSequence = Vec<ContentUnit>;

// ============ Segments ============

/// One outbound message: an ordered, non-empty group of units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub units: Vec<ContentUnit>,
}

impl Segment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(unit: ContentUnit) -> Self {
        Self { units: vec![unit] }
    }

    pub fn push(&mut self, unit: ContentUnit) {
        self.units.push(unit);
    }

    /// Append text, coalescing with a trailing text unit so a chunk that
    /// continues an earlier one stays a single run.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(ContentUnit::Text { text: last }) = self.units.last_mut() {
            last.push_str(text);
            return;
        }
        self.units.push(ContentUnit::text(text));
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn has_media(&self) -> bool {
        self.units.iter().any(ContentUnit::is_media)
    }

    pub fn has_reply_marker(&self) -> bool {
        self.units.iter().any(ContentUnit::is_reply_marker)
    }

    /// Concatenated text of all text units.
    pub fn plain_text(&self) -> String {
        self.units.iter().filter_map(ContentUnit::as_text).collect()
    }

    /// Blank text and nothing else worth sending.
    pub fn is_blank(&self) -> bool {
        !self.has_media() && self.plain_text().trim().is_empty()
    }
}

impl From<Vec<ContentUnit>> for Segment {
    fn from(units: Vec<ContentUnit>) -> Self {
        Self { units }
    }
}

// ============ Reply Envelope ============

/// A reply that is ready to be decorated before it is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    /// Stable identity of this reply, used for logging and reentrancy.
    pub reply_id: String,
    /// Channel the reply would have been delivered to.
    pub destination: String,
    /// Message this reply answers, referenced by an injected reply marker.
    #[serde(default)]
    pub source_message_id: Option<String>,
    /// Whether the language model produced this reply.
    #[serde(default)]
    pub from_llm: bool,
    pub units: UnitSequence,
}

impl ReplyEnvelope {
    pub fn new(destination: impl Into<String>, units: UnitSequence) -> Self {
        Self {
            reply_id: uuid::Uuid::new_v4().to_string(),
            destination: destination.into(),
            source_message_id: None,
            from_llm: true,
            units,
        }
    }

    pub fn with_source_message(mut self, message_id: impl Into<String>) -> Self {
        self.source_message_id = Some(message_id.into());
        self
    }

    pub fn with_llm_origin(mut self, from_llm: bool) -> Self {
        self.from_llm = from_llm;
        self
    }
}

// ============ Processing State ============

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelinePhase {
    #[default]
    Idle,
    Gated,
    Segmenting,
    Delivering,
    Done,
}

/// Explicit per-reply state threaded through the pipeline. Created once
/// per reply by the host and handed to every invocation for that reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyProcessingState {
    pub reply_id: String,
    pub phase: PipelinePhase,
    processed: bool,
}

impl ReplyProcessingState {
    pub fn new(reply_id: impl Into<String>) -> Self {
        Self {
            reply_id: reply_id.into(),
            phase: PipelinePhase::Idle,
            processed: false,
        }
    }

    pub fn for_reply(reply: &ReplyEnvelope) -> Self {
        Self::new(reply.reply_id.clone())
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Sets the reentrancy guard. Returns false if it was already set.
    pub(crate) fn claim(&mut self) -> bool {
        if self.processed {
            return false;
        }
        self.processed = true;
        true
    }
}

// ============ Delivery Results ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DeliveryOutcome {
    Sent,
    SentWithAudioSubstitution,
    SkippedEmpty,
    Failed { reason: String },
    Cancelled,
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent | Self::SentWithAudioSubstitution)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDelivery {
    pub index: usize,
    pub preview: String,
    pub outcome: DeliveryOutcome,
    /// Pacing wait performed after this segment, in milliseconds.
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub segment_count: usize,
    pub deliveries: Vec<SegmentDelivery>,
}

impl DeliveryReport {
    pub fn sent_count(&self) -> usize {
        self.deliveries.iter().filter(|d| d.outcome.is_sent()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.outcome, DeliveryOutcome::Failed { .. }))
            .count()
    }
}

/// What the host should leave in place of the original reply content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "units", rename_all = "camelCase")]
pub enum Handback {
    /// Deliver the original reply untouched.
    Unchanged,
    /// Deliver these units instead. Empty means nothing further to send.
    Replace(Vec<ContentUnit>),
}

impl Handback {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    /// Resolve against the original units.
    pub fn resolve(self, original: &[ContentUnit]) -> Vec<ContentUnit> {
        match self {
            Self::Unchanged => original.to_vec(),
            Self::Replace(units) => units,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub handback: Handback,
    pub report: DeliveryReport,
}

impl ProcessOutcome {
    pub fn pass_through() -> Self {
        Self {
            handback: Handback::Unchanged,
            report: DeliveryReport::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_text_coalesces_runs() {
        let mut seg = Segment::new();
        seg.push_text("Hello");
        seg.push_text(", world");
        seg.push(ContentUnit::image("a.png"));
        seg.push_text("!");
        assert_eq!(seg.len(), 3);
        assert_eq!(seg.plain_text(), "Hello, world!");
    }

    #[test]
    fn test_blank_segment_detection() {
        let blank = Segment::from(vec![ContentUnit::text("  \n"), ContentUnit::reply_marker("1")]);
        assert!(blank.is_blank());
        let media = Segment::from(vec![ContentUnit::text(" "), ContentUnit::face("14")]);
        assert!(!media.is_blank());
    }

    #[test]
    fn test_state_guard_claims_once() {
        let mut state = ReplyProcessingState::new("r1");
        assert!(state.claim());
        assert!(!state.claim());
        assert!(state.is_processed());
    }

    #[test]
    fn test_unit_serialization_is_tagged() {
        let json = serde_json::to_string(&ContentUnit::reply_marker("42")).unwrap();
        assert_eq!(json, r#"{"type":"replyMarker","messageId":"42"}"#);
        let parsed: ContentUnit = serde_json::from_str(r#"{"type":"text","text":"hi"}"#).unwrap();
        assert_eq!(parsed, ContentUnit::text("hi"));
    }
}
