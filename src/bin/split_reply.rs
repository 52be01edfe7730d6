use async_trait::async_trait;
use reply_splitter_lib::models::{ContentUnit, ReplyEnvelope, ReplyProcessingState, Segment};
use reply_splitter_lib::services::delivery::{HostSpeechSettings, MessageSender, SpeechPolicy};
use reply_splitter_lib::services::text_processor::{preview, text_length};
use reply_splitter_lib::services::{ConfigStore, HttpSpeechSynthesizer, ReplySplitter, SegmentationConfig};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Prints each segment instead of sending it anywhere.
struct ConsoleSender;

#[async_trait]
impl MessageSender for ConsoleSender {
    async fn send(&self, destination: &str, units: &[ContentUnit]) -> anyhow::Result<()> {
        let segment = Segment::from(units.to_vec());
        println!("[send -> {}] {}", destination, preview(&segment, 120));
        Ok(())
    }
}

/// Speaks every reply with the host defaults.
struct AlwaysSpeak;

impl SpeechPolicy for AlwaysSpeak {
    fn settings(&self) -> HostSpeechSettings {
        HostSpeechSettings::default()
    }

    fn should_speak(&self, _reply: &ReplyEnvelope) -> bool {
        true
    }
}

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn read_input(path: &str) -> Result<String, String> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| format!("read stdin failed: {}", e))?;
        return Ok(text);
    }
    std::fs::read_to_string(path).map_err(|e| format!("read file failed: {}", e))
}

fn load_config(path: Option<&str>) -> Result<SegmentationConfig, String> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p).map_err(|e| format!("read config failed: {}", e))?;
            let value: serde_json::Value =
                serde_json::from_str(&raw).map_err(|e| format!("parse config failed: {}", e))?;
            let map = match value {
                serde_json::Value::Object(map) => map,
                _ => return Err("config must be a JSON object".to_string()),
            };
            SegmentationConfig::from_flat_map(map).map_err(|e| e.to_string())
        }
        None => match ConfigStore::default_config_dir() {
            Some(dir) => ConfigStore::new(dir).load().map_err(|e| e.to_string()),
            None => Ok(SegmentationConfig::default()),
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage:\n  cargo run --bin split_reply -- <reply.txt|-> [--config <config.json>] [--deliver] [--tts <audio_dir>] [--human] [--out <json_path>]\n\nNotes:\n  - Without --config the saved config under the user config dir is used (defaults if absent).\n  - --deliver sends segments to the console with real pacing waits.\n  - --tts needs REPLY_SPLITTER_TTS_API_KEY and a config with ttsEnabled=true."
        );
        return Ok(());
    }

    reply_splitter_lib::init_logging();

    let path = args[1].clone();
    let config_path = parse_arg_value(&args, "--config");
    let deliver = has_flag(&args, "--deliver");
    let tts_dir = parse_arg_value(&args, "--tts");
    let from_llm = !has_flag(&args, "--human");
    let out_path = parse_arg_value(&args, "--out");

    let text = read_input(&path)?;
    let config = load_config(config_path.as_deref())?;
    let reply = ReplyEnvelope::new("console", vec![ContentUnit::text(text.clone())])
        .with_llm_origin(from_llm)
        .with_source_message("console-0");

    let mut splitter = ReplySplitter::new(config, Arc::new(ConsoleSender));
    if let Some(dir) = tts_dir {
        splitter = splitter.with_speech(
            Arc::new(HttpSpeechSynthesizer::new(PathBuf::from(dir))),
            Arc::new(AlwaysSpeak),
        );
    }
    if splitter.rules().is_none() {
        return Err("config contains an invalid pattern".to_string());
    }

    let segments = splitter.plan(&reply);

    println!("Input: {}", path);
    println!("Text: {} chars", text.chars().count());
    println!("Delay strategy: {:?}", splitter.config().delay_strategy);
    println!();

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct PlannedSegment {
        index: usize,
        text_chars: usize,
        delay_ms: u64,
        preview: String,
        units: Vec<ContentUnit>,
    }

    let mut planned = Vec::with_capacity(segments.len());
    if segments.is_empty() {
        println!("Segments: none (reply passes through unsplit)");
    } else {
        println!("Segments: {}", segments.len());
        for (i, seg) in segments.iter().enumerate() {
            // Wait after a segment depends on the one that follows it.
            let delay_ms = match segments.get(i + 1) {
                Some(next) => splitter.pacing_delay(text_length(next)).as_millis() as u64,
                None => 0,
            };
            let role = if i + 1 == segments.len() { "handback" } else { "send" };
            println!(
                "[S{:03}] {:<8} chars={} wait={}ms  {}",
                i,
                role,
                text_length(seg),
                delay_ms,
                preview(seg, 120)
            );
            planned.push(PlannedSegment {
                index: i,
                text_chars: text_length(seg),
                delay_ms,
                preview: preview(seg, 120),
                units: seg.units.clone(),
            });
        }
    }

    let mut report = None;
    if deliver {
        println!();
        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });

        let mut state = ReplyProcessingState::for_reply(&reply);
        let outcome = splitter.process_reply(&mut state, &reply, &cancel).await;
        let handback = outcome.handback.clone().resolve(&reply.units);
        println!(
            "[handback] {}",
            preview(&Segment::from(handback), 120)
        );
        println!(
            "Delivered: sent={} failed={}",
            outcome.report.sent_count(),
            outcome.report.failed_count()
        );
        report = Some(outcome);
    }

    if let Some(out_path) = out_path {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Output<'a> {
            input: String,
            config: &'a SegmentationConfig,
            segments: Vec<PlannedSegment>,
            #[serde(skip_serializing_if = "Option::is_none")]
            delivery: Option<reply_splitter_lib::models::ProcessOutcome>,
        }

        let out = Output {
            input: path.clone(),
            config: splitter.config(),
            segments: planned,
            delivery: report,
        };

        let json = serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?;
        std::fs::write(&out_path, json).map_err(|e| format!("write out failed: {}", e))?;
        println!();
        println!("Wrote JSON: {}", out_path);
    }

    Ok(())
}
