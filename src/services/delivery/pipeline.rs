// Reply Delivery Pipeline
// Gates a reply, splits it into segments, sends all but the last with paced
// waits and hands the last one back to the host

use super::speech::substitute_speech;
use super::{MessageSender, SpeechPolicy, SpeechSynthesizer};
use crate::models::{
    ContentUnit, DeliveryOutcome, DeliveryReport, Handback, PipelinePhase, ProcessOutcome,
    ReplyEnvelope, ReplyProcessingState, Segment, SegmentDelivery,
};
use crate::services::config_store::{
    SegmentationConfig, SegmentationRules, SplitScope, ThresholdMode,
};
use crate::services::segmentation::plan_segments;
use crate::services::text_processor::{apply_cleanup, preview, text_length, total_text_length};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PREVIEW_CHARS: usize = 40;

struct SpeechHook {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    policy: Arc<dyn SpeechPolicy>,
}

/// Splits one reply at a time into paced outbound messages.
///
/// Holds no per-reply state; overlapping replies may share one instance.
pub struct ReplySplitter {
    config: SegmentationConfig,
    /// None when a configured pattern failed to compile.
    rules: Option<SegmentationRules>,
    sender: Arc<dyn MessageSender>,
    speech: Option<SpeechHook>,
    rng: Mutex<StdRng>,
}

impl ReplySplitter {
    pub fn new(config: SegmentationConfig, sender: Arc<dyn MessageSender>) -> Self {
        let rules = match config.compile() {
            Ok(rules) => Some(rules),
            Err(e) => {
                warn!("[splitter] {}; replies will pass through unsplit", e);
                None
            }
        };

        Self {
            config,
            rules,
            sender,
            speech: None,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_speech(
        mut self,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        policy: Arc<dyn SpeechPolicy>,
    ) -> Self {
        self.speech = Some(SpeechHook { synthesizer, policy });
        self
    }

    /// Fix the random source used for speech draws and random pacing.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn rules(&self) -> Option<&SegmentationRules> {
        self.rules.as_ref()
    }

    /// Segments this reply would be split into, without sending anything.
    /// Cleanup is applied; empty when the reply would pass through.
    pub fn plan(&self, reply: &ReplyEnvelope) -> Vec<Segment> {
        let Some(rules) = self.rules.as_ref() else {
            return Vec::new();
        };
        if self.gate(reply).is_some() {
            return Vec::new();
        }
        let segments = plan_segments(&reply.units, rules, self.config.inject_reply_marker);
        if segments.len() <= 1 && rules.cleanup.is_none() {
            return Vec::new();
        }
        self.prepare(segments, rules, reply)
    }

    /// Wait before sending a segment with `text_len` characters of text.
    pub fn pacing_delay(&self, text_len: usize) -> Duration {
        let Some(rules) = self.rules.as_ref() else {
            return Duration::ZERO;
        };
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rules.pacing.delay(text_len, &mut *rng)
    }

    /// Run the whole pipeline for one reply.
    ///
    /// Intermediate segments are sent through the sender; the returned
    /// handback tells the host what to deliver in place of the original
    /// content. A second call with the same state is a no-op.
    pub async fn process_reply(
        &self,
        state: &mut ReplyProcessingState,
        reply: &ReplyEnvelope,
        cancel: &CancellationToken,
    ) -> ProcessOutcome {
        if !state.claim() {
            debug!(reply_id = %reply.reply_id, "[splitter] already processed, skipping");
            return ProcessOutcome::pass_through();
        }

        state.phase = PipelinePhase::Gated;
        let Some(rules) = self.rules.as_ref() else {
            state.phase = PipelinePhase::Done;
            return ProcessOutcome::pass_through();
        };
        if let Some(reason) = self.gate(reply) {
            info!(reply_id = %reply.reply_id, "[splitter] passing through: {}", reason);
            state.phase = PipelinePhase::Done;
            return ProcessOutcome::pass_through();
        }

        state.phase = PipelinePhase::Segmenting;
        let planned = plan_segments(&reply.units, rules, self.config.inject_reply_marker);
        if planned.is_empty() || (planned.len() == 1 && rules.cleanup.is_none()) {
            debug!(reply_id = %reply.reply_id, "[splitter] nothing to split");
            state.phase = PipelinePhase::Done;
            return ProcessOutcome::pass_through();
        }
        let mut segments = self.prepare(planned, rules, reply);
        info!(
            reply_id = %reply.reply_id,
            segments = segments.len(),
            "[splitter] reply split"
        );

        state.phase = PipelinePhase::Delivering;
        let mut report = DeliveryReport {
            segment_count: segments.len(),
            deliveries: Vec::with_capacity(segments.len()),
        };
        let last = segments.pop().unwrap_or_default();
        let mut cancelled = false;

        for (index, segment) in segments.iter().enumerate() {
            let preview_text = preview(segment, PREVIEW_CHARS);

            if cancelled || cancel.is_cancelled() {
                cancelled = true;
                report.deliveries.push(SegmentDelivery {
                    index,
                    preview: preview_text,
                    outcome: DeliveryOutcome::Cancelled,
                    delay_ms: 0,
                });
                continue;
            }

            if segment.is_blank() {
                debug!(reply_id = %reply.reply_id, segment = index, "[splitter] skipping empty segment");
                report.deliveries.push(SegmentDelivery {
                    index,
                    preview: preview_text,
                    outcome: DeliveryOutcome::SkippedEmpty,
                    delay_ms: 0,
                });
                continue;
            }

            let (outgoing, substituted) = self.maybe_speak(segment, reply).await;
            let outcome = match self.sender.send(&reply.destination, &outgoing.units).await {
                Ok(()) if substituted => DeliveryOutcome::SentWithAudioSubstitution,
                Ok(()) => DeliveryOutcome::Sent,
                Err(e) => {
                    warn!(
                        reply_id = %reply.reply_id,
                        segment = index,
                        "[splitter] failed to send segment: {:#}", e
                    );
                    DeliveryOutcome::Failed {
                        reason: format!("{:#}", e),
                    }
                }
            };

            // No wait after the last thing that actually goes out.
            let more_to_deliver =
                !last.is_blank() || segments[index + 1..].iter().any(|s| !s.is_blank());

            let mut delay_ms = 0;
            if outcome.is_sent() && more_to_deliver {
                let next = segments.get(index + 1).unwrap_or(&last);
                let delay = self.pacing_delay(text_length(next));
                delay_ms = delay.as_millis() as u64;
                info!(
                    reply_id = %reply.reply_id,
                    segment = index,
                    delay_ms,
                    "[splitter] sent: {}", preview_text
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        info!(reply_id = %reply.reply_id, "[splitter] cancelled during pacing wait");
                        cancelled = true;
                    }
                }
            }

            report.deliveries.push(SegmentDelivery {
                index,
                preview: preview_text,
                outcome,
                delay_ms,
            });
        }

        state.phase = PipelinePhase::Done;
        let cancelled = cancelled || cancel.is_cancelled();
        let handback = if cancelled && report.sent_count() == 0 {
            // Nothing went out, so the host still owns the whole reply.
            info!(reply_id = %reply.reply_id, "[splitter] cancelled before any send, passing through");
            Handback::Unchanged
        } else if cancelled || last.is_blank() {
            Handback::Replace(Vec::new())
        } else {
            Handback::Replace(last.units)
        };

        info!(
            reply_id = %reply.reply_id,
            sent = report.sent_count(),
            failed = report.failed_count(),
            "[splitter] delivery finished"
        );
        ProcessOutcome { handback, report }
    }

    /// Reason to leave the reply alone, if any.
    fn gate(&self, reply: &ReplyEnvelope) -> Option<&'static str> {
        if self.config.scope == SplitScope::LlmOnly && !reply.from_llm {
            return Some("not a generated reply");
        }

        let threshold = self.config.length_threshold;
        if threshold == 0 {
            return None;
        }
        let total = total_text_length(&reply.units);
        match self.config.threshold_mode {
            ThresholdMode::SkipAbove if total > threshold => Some("longer than length threshold"),
            ThresholdMode::SkipBelow if total < threshold => Some("shorter than length threshold"),
            _ => None,
        }
    }

    /// Apply cleanup to every segment and inject the reply marker into the
    /// first one that will actually be delivered.
    fn prepare(
        &self,
        segments: Vec<Segment>,
        rules: &SegmentationRules,
        reply: &ReplyEnvelope,
    ) -> Vec<Segment> {
        let mut segments: Vec<Segment> = segments
            .iter()
            .map(|segment| apply_cleanup(segment, rules.cleanup.as_ref()))
            .collect();

        if self.config.inject_reply_marker {
            if let Some(message_id) = reply.source_message_id.as_deref() {
                if let Some(first) = segments.iter_mut().find(|s| !s.is_blank()) {
                    if !first.has_reply_marker() {
                        first.units.insert(0, ContentUnit::reply_marker(message_id));
                    }
                }
            }
        }

        segments
    }

    /// Speech substitution for one intermediate segment, when local and host
    /// settings both allow it and the probability draw passes.
    async fn maybe_speak(&self, segment: &Segment, reply: &ReplyEnvelope) -> (Segment, bool) {
        let Some(hook) = self.speech.as_ref() else {
            return (segment.clone(), false);
        };
        if !self.config.tts_enabled {
            return (segment.clone(), false);
        }

        let host = hook.policy.settings();
        if !host.enabled {
            return (segment.clone(), false);
        }

        let probability = self
            .config
            .tts_trigger_probability
            .min(host.trigger_probability);
        let draw: f64 = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.gen()
        };
        if probability <= 0.0 || draw > probability {
            return (segment.clone(), false);
        }
        if !hook.policy.should_speak(reply) {
            return (segment.clone(), false);
        }

        let dual_output = self.config.tts_dual_output || host.dual_output;
        let result = substitute_speech(segment, hook.synthesizer.as_ref(), dual_output).await;
        (result.segment, result.substituted)
    }
}
