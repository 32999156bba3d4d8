/*!
 * Error types for the talecast library.
 *
 * Each seam of the system has its own error enum, defined with thiserror:
 * input parsing (`FormatError`), external collaborators (`ProviderError`),
 * subtitle files (`SubtitleError`), configuration (`ConfigError`) and the
 * pipeline as a whole (`PipelineError`).
 */

use std::fmt;
use thiserror::Error;

use crate::pipeline::Stage;

/// Errors raised while turning input text into scenes.
///
/// These are caller-visible and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Input was empty after trimming
    #[error("Input text is empty")]
    EmptyInput,

    /// Storyboard mode was requested but no scene heading was found
    #[error("No scenes found in storyboard")]
    NoScenes,

    /// A storyboard scene has no narration field (1-based scene number)
    #[error("Narration not found in scene {scene_number}")]
    MissingNarration {
        /// 1-based position of the scene heading in the document
        scene_number: usize,
    },
}

/// Errors returned by external collaborators (speech, image, composition).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Server-side failure reported by the service
    #[error("Service responded with error: {status_code} - {message}")]
    ServerError {
        /// HTTP-like status code
        status_code: u16,
        /// Error message from the service
        message: String,
    },

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The service refused the content
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    /// The request itself was invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local I/O failure while storing the artifact
    #[error("Artifact I/O error: {0}")]
    Io(String),
}

impl ProviderError {
    /// Whether the failure class is worth retrying.
    ///
    /// Timeouts, rate limits, dropped connections and 5xx responses are
    /// transient; everything else fails the scene immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimitExceeded(_) | Self::ConnectionError(_) => true,
            Self::ServerError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::AuthenticationError(_)
            | Self::ContentRejected(_)
            | Self::InvalidRequest(_)
            | Self::Io(_) => false,
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Errors that can occur while reading a subtitle file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubtitleError {
    /// A timestamp line could not be parsed
    #[error("Invalid timestamp at line {line}: {value}")]
    InvalidTimestamp {
        /// 1-based line number
        line: usize,
        /// Offending text
        value: String,
    },

    /// A cue did not start with a sequence number
    #[error("Invalid sequence number at line {line}: {value}")]
    InvalidSequence {
        /// 1-based line number
        line: usize,
        /// Offending text
        value: String,
    },

    /// The file contains no cues
    #[error("No valid subtitle entries were found")]
    NoEntries,
}

/// Invalid configuration value
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid configuration for '{field}': {message}")]
pub struct ConfigError {
    /// Dotted path of the offending field
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl ConfigError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// A single scene that could not be produced by a stage
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFailure {
    /// 0-based scene index
    pub scene_index: usize,
    /// The error returned by the last attempt
    pub error: ProviderError,
    /// Number of attempts made
    pub attempts: u32,
}

impl SceneFailure {
    /// True when the scene failed only because retries ran out
    pub fn retries_exhausted(&self) -> bool {
        self.error.is_transient()
    }
}

impl fmt::Display for SceneFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.retries_exhausted() {
            "retries exhausted"
        } else {
            "permanent"
        };
        write!(
            f,
            "scene {} ({}, {} attempt(s)): {}",
            self.scene_index, kind, self.attempts, self.error
        )
    }
}

fn join_failures(failures: &[SceneFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn preservation_note(preserved: &bool) -> &'static str {
    if *preserved {
        "Completed artifacts were preserved for resumption"
    } else {
        "No artifacts were preserved"
    }
}

/// Errors surfaced by the pipeline orchestrator
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input could not be split into scenes
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Configuration rejected at pipeline start
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A cached subtitle file could not be read back
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// One or more scenes failed in a stage
    #[error(
        "Stage {stage} failed for {} scene(s): {}. {}",
        .failures.len(),
        join_failures(.failures),
        preservation_note(.artifacts_preserved)
    )]
    StageFailed {
        /// Stage that failed
        stage: Stage,
        /// Per-scene failures
        failures: Vec<SceneFailure>,
        /// Scenes whose artifacts were committed before the failure
        completed_scenes: Vec<usize>,
        /// Whether the manifest and artifacts on disk were kept
        artifacts_preserved: bool,
    },

    /// The composition collaborator failed
    #[error(
        "Stage compose failed after {attempts} attempt(s): {error}. Completed artifacts were preserved for resumption"
    )]
    CompositionFailed {
        /// Error of the last attempt
        error: ProviderError,
        /// Number of attempts made
        attempts: u32,
    },

    /// Estimated narration time exceeds the configured maximum
    #[error("Estimated narration of {estimated_secs:.1}s exceeds the maximum of {max_secs:.1}s")]
    DurationExceeded {
        /// Estimated reading time of all scenes
        estimated_secs: f64,
        /// Configured limit
        max_secs: f64,
    },

    /// The run manifest could not be read or written
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Local file system failure
    #[error("I/O error during {stage}: {message}")]
    Io {
        /// Stage that was running
        stage: Stage,
        /// Underlying error text
        message: String,
    },
}

impl PipelineError {
    pub(crate) fn io(stage: Stage, error: impl fmt::Display) -> Self {
        Self::Io {
            stage,
            message: error.to_string(),
        }
    }

    /// Stage the error belongs to, when it belongs to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Format(_) | Self::DurationExceeded { .. } => Some(Stage::Split),
            Self::Subtitle(_) => Some(Stage::Subtitle),
            Self::CompositionFailed { .. } => Some(Stage::Compose),
            Self::StageFailed { stage, .. } | Self::Io { stage, .. } => Some(*stage),
            Self::Config(_) | Self::Manifest(_) => None,
        }
    }
}
