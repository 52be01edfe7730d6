// Configuration Storage Service
// Segmentation settings, compiled rules, config file read/write and version backup

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::services::segmentation::pacing::PacingModel;
use crate::services::segmentation::placement::{Placement, PlacementTable};
use crate::services::segmentation::tokenizer::{Delimiter, NestingTable};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid {field} pattern: {source}")]
    InvalidPattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SplitScope {
    #[default]
    LlmOnly,
    All,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdMode {
    /// Keep replies longer than the threshold whole.
    #[default]
    SkipAbove,
    /// Only split replies at least as long as the threshold.
    SkipBelow,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SplitMode {
    #[default]
    Simple,
    Regex,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DelayStrategy {
    Fixed,
    Linear,
    #[default]
    Log,
    Random,
}

/// Flat key/value segmentation settings, one field per host config key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationConfig {
    #[serde(default)]
    pub scope: SplitScope,
    #[serde(default, alias = "noSplitAboveLength")]
    pub length_threshold: usize,
    #[serde(default)]
    pub threshold_mode: ThresholdMode,
    #[serde(default)]
    pub mode: SplitMode,
    #[serde(default = "default_simple_delimiters")]
    pub simple_delimiter_chars: String,
    #[serde(default = "default_regex_delimiter")]
    pub regex_delimiter_pattern: String,
    #[serde(default)]
    pub cleanup_pattern: String,
    #[serde(default = "default_true")]
    pub smart_bracket_aware: bool,
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,
    #[serde(default = "default_image_placement")]
    pub image_placement: Placement,
    #[serde(default)]
    pub mention_placement: Placement,
    #[serde(default = "default_face_placement")]
    pub face_placement: Placement,
    #[serde(default)]
    pub other_placement: Placement,
    #[serde(default, alias = "injectReplyMarkerOnFirstSegment")]
    pub inject_reply_marker: bool,
    #[serde(default)]
    pub delay_strategy: DelayStrategy,
    #[serde(default = "default_fixed_delay")]
    pub fixed_delay: f64,
    #[serde(default = "default_linear_base")]
    pub linear_base: f64,
    #[serde(default = "default_linear_factor")]
    pub linear_factor: f64,
    #[serde(default = "default_log_base")]
    pub log_base: f64,
    #[serde(default = "default_log_factor")]
    pub log_factor: f64,
    #[serde(default = "default_log_cap")]
    pub log_cap: f64,
    #[serde(default = "default_random_min")]
    pub random_min: f64,
    #[serde(default = "default_random_max")]
    pub random_max: f64,
    #[serde(default)]
    pub tts_enabled: bool,
    #[serde(default)]
    pub tts_dual_output: bool,
    #[serde(default = "default_tts_probability")]
    pub tts_trigger_probability: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            scope: SplitScope::LlmOnly,
            length_threshold: 0,
            threshold_mode: ThresholdMode::SkipAbove,
            mode: SplitMode::Simple,
            simple_delimiter_chars: default_simple_delimiters(),
            regex_delimiter_pattern: default_regex_delimiter(),
            cleanup_pattern: String::new(),
            smart_bracket_aware: true,
            max_segments: default_max_segments(),
            image_placement: default_image_placement(),
            mention_placement: Placement::FollowsNext,
            face_placement: default_face_placement(),
            other_placement: Placement::FollowsNext,
            inject_reply_marker: false,
            delay_strategy: DelayStrategy::Log,
            fixed_delay: default_fixed_delay(),
            linear_base: default_linear_base(),
            linear_factor: default_linear_factor(),
            log_base: default_log_base(),
            log_factor: default_log_factor(),
            log_cap: default_log_cap(),
            random_min: default_random_min(),
            random_max: default_random_max(),
            tts_enabled: false,
            tts_dual_output: false,
            tts_trigger_probability: default_tts_probability(),
        }
    }
}

fn default_true() -> bool { true }
fn default_simple_delimiters() -> String { "。？！?!；;\n…".to_string() }
fn default_regex_delimiter() -> String { r"[。？！?!；;\n…]+".to_string() }
fn default_max_segments() -> usize { 8 }
fn default_image_placement() -> Placement { Placement::Standalone }
fn default_face_placement() -> Placement { Placement::FollowsPrevious }
fn default_fixed_delay() -> f64 { 1.5 }
fn default_linear_base() -> f64 { 0.5 }
fn default_linear_factor() -> f64 { 0.05 }
fn default_log_base() -> f64 { 0.8 }
fn default_log_factor() -> f64 { 0.6 }
fn default_log_cap() -> f64 { 4.0 }
fn default_random_min() -> f64 { 1.0 }
fn default_random_max() -> f64 { 3.0 }
fn default_tts_probability() -> f64 { 1.0 }

impl SegmentationConfig {
    /// Build from a host's flat key/value map. Unknown keys are ignored and
    /// missing keys take their defaults.
    pub fn from_flat_map(
        map: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }

    pub fn placement_table(&self) -> PlacementTable {
        PlacementTable {
            image: self.image_placement,
            mention: self.mention_placement,
            face_icon: self.face_placement,
            other: self.other_placement,
        }
    }

    pub fn pacing(&self) -> PacingModel {
        match self.delay_strategy {
            DelayStrategy::Fixed => PacingModel::Fixed {
                seconds: self.fixed_delay,
            },
            DelayStrategy::Linear => PacingModel::Linear {
                base: self.linear_base,
                factor: self.linear_factor,
            },
            DelayStrategy::Log => PacingModel::Log {
                base: self.log_base,
                factor: self.log_factor,
                cap: self.log_cap,
            },
            DelayStrategy::Random => PacingModel::Random {
                min: self.random_min,
                max: self.random_max,
            },
        }
    }

    /// Delimiter pattern source for the configured mode.
    pub fn delimiter_pattern(&self) -> String {
        match self.mode {
            SplitMode::Simple => {
                let class: String = self
                    .simple_delimiter_chars
                    .chars()
                    .map(|c| regex::escape(&c.to_string()))
                    .collect();
                if class.is_empty() {
                    String::new()
                } else {
                    format!("[{}]+", class)
                }
            }
            SplitMode::Regex => self.regex_delimiter_pattern.clone(),
        }
    }

    /// Validate and compile the patterns this config refers to.
    pub fn compile(&self) -> Result<SegmentationRules, ConfigError> {
        let pattern = self.delimiter_pattern();
        let delimiter = if pattern.is_empty() {
            None
        } else {
            Some(Delimiter::new(&pattern).map_err(|source| ConfigError::InvalidPattern {
                field: "delimiter",
                source,
            })?)
        };

        let cleanup = if self.cleanup_pattern.is_empty() {
            None
        } else {
            Some(
                Regex::new(&self.cleanup_pattern).map_err(|source| ConfigError::InvalidPattern {
                    field: "cleanup",
                    source,
                })?,
            )
        };

        Ok(SegmentationRules {
            delimiter,
            cleanup,
            nesting: self.smart_bracket_aware.then(NestingTable::default),
            placement: self.placement_table(),
            max_segments: self.max_segments,
            pacing: self.pacing(),
        })
    }
}

/// Compiled, ready-to-run form of a [`SegmentationConfig`].
#[derive(Debug, Clone)]
pub struct SegmentationRules {
    /// No delimiter means text never splits.
    pub delimiter: Option<Delimiter>,
    pub cleanup: Option<Regex>,
    /// Present when splitting inside brackets and quotes is suppressed.
    pub nesting: Option<NestingTable>,
    pub placement: PlacementTable,
    pub max_segments: usize,
    pub pacing: PacingModel,
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("reply-splitter"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir)?;
        Ok(())
    }

    /// Load configuration from file, defaults when absent
    pub fn load(&self) -> Result<SegmentationConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(SegmentationConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save(&self, config: &SegmentationConfig) -> Result<(), ConfigError> {
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));
        fs::copy(&self.config_file, &backup_file)?;

        // Keep only last 10 backups
        self.cleanup_old_backups(&backup_dir, 10)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // File names embed the timestamp, so name order is age order.
        entries.sort_by_key(|e| e.file_name());

        let remove_count = entries.len() - keep;
        for entry in entries.iter().take(remove_count) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }
}
