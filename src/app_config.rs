use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Subtitle chunking and timing
    #[serde(default)]
    pub subtitle: SubtitleConfig,

    /// Reading-speed estimates used for duration pre-flight
    #[serde(default)]
    pub reading: ReadingSpeedConfig,

    /// Output video shape and duration limits
    #[serde(default)]
    pub video: VideoConfig,

    /// Speech synthesis parameters
    #[serde(default)]
    pub tts: TtsConfig,

    /// Image generation parameters
    #[serde(default)]
    pub image: ImageConfig,

    /// Orchestration: concurrency, retries, cost estimate
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Pronunciation dictionary (YAML) applied to narration sent to TTS
    #[serde(default)]
    pub readings_path: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Subtitle fragment sizing and display timing
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubtitleConfig {
    /// Maximum characters per fragment for CJK-dominant text
    #[serde(default = "default_max_cjk_chars")]
    pub max_cjk_chars: usize,

    /// Maximum words per fragment for other text
    #[serde(default = "default_max_words_per_fragment")]
    pub max_words_per_fragment: usize,

    /// Minimum time a fragment stays on screen, in seconds
    #[serde(default = "default_min_display_secs")]
    pub min_display_secs: f64,

    /// Share of CJK characters from which text is treated as CJK-dominant
    #[serde(default = "default_cjk_threshold")]
    pub cjk_threshold: f64,

    /// Reading speed above which the timeline validator warns (chars/sec)
    #[serde(default = "default_max_cps")]
    pub max_cps: f64,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            max_cjk_chars: default_max_cjk_chars(),
            max_words_per_fragment: default_max_words_per_fragment(),
            min_display_secs: default_min_display_secs(),
            cjk_threshold: default_cjk_threshold(),
            max_cps: default_max_cps(),
        }
    }
}

/// Narration reading speeds
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReadingSpeedConfig {
    /// Characters per minute for CJK-dominant narration
    #[serde(default = "default_cjk_chars_per_minute")]
    pub cjk_chars_per_minute: f64,

    /// Words per minute for other narration
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: f64,
}

impl Default for ReadingSpeedConfig {
    fn default() -> Self {
        Self {
            cjk_chars_per_minute: default_cjk_chars_per_minute(),
            words_per_minute: default_words_per_minute(),
        }
    }
}

/// Video output configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VideoConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Upper bound for the estimated narration time, in seconds
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f64,

    /// Fail the run instead of warning when the estimate exceeds the bound
    #[serde(default)]
    pub enforce_max_duration: bool,

    /// Plain-text input is grouped into at most this many scenes (0 = no cap)
    #[serde(default = "default_max_scenes")]
    pub max_scenes: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            max_duration_secs: default_max_duration_secs(),
            enforce_max_duration: false,
            max_scenes: default_max_scenes(),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TtsConfig {
    #[serde(default = "default_tts_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    /// Playback speed multiplier (0.25 - 4.0)
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Audio container; also the extension of `scene_NNN.<ext>`
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model: default_tts_model(),
            voice: default_voice(),
            speed: default_speed(),
            output_format: default_output_format(),
        }
    }
}

/// Image generation configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageConfig {
    #[serde(default = "default_image_model")]
    pub model: String,

    #[serde(default = "default_image_size")]
    pub size: String,

    /// One of "low", "medium", "high"
    #[serde(default = "default_image_quality")]
    pub quality: String,

    /// Prepended to every image prompt so scenes share one look
    #[serde(default = "default_style_prefix")]
    pub style_prefix: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model: default_image_model(),
            size: default_image_size(),
            quality: default_image_quality(),
            style_prefix: default_style_prefix(),
        }
    }
}

/// Pipeline orchestration settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Maximum number of concurrent external calls within a stage
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Retry count for transient failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound for a single backoff delay (in milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Price of one speech synthesis call, shown in the cost estimate
    #[serde(default)]
    pub tts_unit_cost: Option<f64>,

    /// Price of one image generation call, shown in the cost estimate
    #[serde(default)]
    pub image_unit_cost: Option<f64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrent_requests: default_concurrent_requests(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            tts_unit_cost: None,
            image_unit_cost: None,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_max_cjk_chars() -> usize {
    22
}

fn default_max_words_per_fragment() -> usize {
    6
}

fn default_min_display_secs() -> f64 {
    1.0
}

fn default_cjk_threshold() -> f64 {
    0.20
}

fn default_max_cps() -> f64 {
    25.0
}

fn default_cjk_chars_per_minute() -> f64 {
    350.0
}

fn default_words_per_minute() -> f64 {
    150.0
}

fn default_width() -> u32 {
    1080
}

fn default_height() -> u32 {
    1920
}

fn default_fps() -> u32 {
    24
}

fn default_max_duration_secs() -> f64 {
    90.0
}

fn default_max_scenes() -> usize {
    6
}

fn default_tts_model() -> String {
    "gpt-4o-mini-tts".to_string()
}

fn default_voice() -> String {
    "nova".to_string()
}

fn default_speed() -> f64 {
    1.0
}

fn default_output_format() -> String {
    "mp3".to_string()
}

fn default_image_model() -> String {
    "gpt-image-1".to_string()
}

fn default_image_size() -> String {
    "1024x1536".to_string()
}

fn default_image_quality() -> String {
    "medium".to_string()
}

fn default_style_prefix() -> String {
    "Cinematic vertical composition, vibrant colors, high detail, dramatic lighting. ".to_string()
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    5000 // 5 second base backoff time, doubled on each retry
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

const IMAGE_QUALITIES: [&str; 3] = ["low", "medium", "high"];

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let subtitle = &self.subtitle;
        if subtitle.max_cjk_chars < 4 {
            return Err(ConfigError::new("subtitle.max_cjk_chars", "must be at least 4"));
        }
        if subtitle.max_words_per_fragment == 0 {
            return Err(ConfigError::new("subtitle.max_words_per_fragment", "must be at least 1"));
        }
        if !(subtitle.min_display_secs.is_finite() && subtitle.min_display_secs > 0.0) {
            return Err(ConfigError::new("subtitle.min_display_secs", "must be a positive number"));
        }
        if !(subtitle.cjk_threshold > 0.0 && subtitle.cjk_threshold <= 1.0) {
            return Err(ConfigError::new("subtitle.cjk_threshold", "must be in (0, 1]"));
        }
        if !(subtitle.max_cps > 0.0) {
            return Err(ConfigError::new("subtitle.max_cps", "must be positive"));
        }

        if !(self.reading.cjk_chars_per_minute > 0.0) {
            return Err(ConfigError::new("reading.cjk_chars_per_minute", "must be positive"));
        }
        if !(self.reading.words_per_minute > 0.0) {
            return Err(ConfigError::new("reading.words_per_minute", "must be positive"));
        }

        if !(self.video.max_duration_secs > 0.0) {
            return Err(ConfigError::new("video.max_duration_secs", "must be positive"));
        }
        if self.video.width == 0 || self.video.height == 0 || self.video.fps == 0 {
            return Err(ConfigError::new("video", "width, height and fps must be non-zero"));
        }

        if !(0.25..=4.0).contains(&self.tts.speed) {
            return Err(ConfigError::new("tts.speed", "must be between 0.25 and 4.0"));
        }
        if self.tts.output_format.trim().is_empty() {
            return Err(ConfigError::new("tts.output_format", "must not be empty"));
        }
        if self.tts.voice.trim().is_empty() {
            return Err(ConfigError::new("tts.voice", "must not be empty"));
        }

        if !IMAGE_QUALITIES.contains(&self.image.quality.as_str()) {
            return Err(ConfigError::new(
                "image.quality",
                format!("must be one of {}", IMAGE_QUALITIES.join(", ")),
            ));
        }

        if self.pipeline.concurrent_requests == 0 {
            return Err(ConfigError::new("pipeline.concurrent_requests", "must be at least 1"));
        }
        if self.pipeline.max_backoff_ms < self.pipeline.retry_backoff_ms {
            return Err(ConfigError::new(
                "pipeline.max_backoff_ms",
                "must not be smaller than retry_backoff_ms",
            ));
        }
        for (field, cost) in [
            ("pipeline.tts_unit_cost", self.pipeline.tts_unit_cost),
            ("pipeline.image_unit_cost", self.pipeline.image_unit_cost),
        ] {
            if let Some(cost) = cost {
                if !(cost.is_finite() && cost >= 0.0) {
                    return Err(ConfigError::new(field, "must be a non-negative number"));
                }
            }
        }

        Ok(())
    }

    /// Load the configuration from a JSON file, writing the defaults there
    /// first if the file does not exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))?;
        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            subtitle: SubtitleConfig::default(),
            reading: ReadingSpeedConfig::default(),
            video: VideoConfig::default(),
            tts: TtsConfig::default(),
            image: ImageConfig::default(),
            pipeline: PipelineSettings::default(),
            readings_path: None,
            log_level: LogLevel::default(),
        }
    }
}
