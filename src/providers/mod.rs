/*!
 * External collaborators of the pipeline.
 *
 * The pipeline never talks to a network service itself. Speech synthesis,
 * image generation and video composition are reached through the traits
 * below:
 * - `SpeechSynthesizer`: narration text to an audio file with a duration
 * - `ImageGenerator`: a prompt to an image file
 * - `VideoComposer`: images, audio and subtitles to the final video
 *
 * `mock` holds offline implementations of all three.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::errors::ProviderError;

pub mod mock;

/// Narration request for one scene
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub scene_index: usize,
    /// Text to speak, with pronunciation readings applied
    pub text: String,
    pub model: String,
    pub voice: String,
    pub speed: f64,
    pub output_format: String,
}

/// Narration audio for one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub scene_index: usize,
    pub path: PathBuf,
    /// Playback length in seconds; the timing source of truth
    pub duration_secs: f64,
}

/// Illustration request for one scene
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub scene_index: usize,
    pub prompt: String,
    pub model: String,
    pub size: String,
    pub quality: String,
}

/// Illustration for one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub scene_index: usize,
    pub path: PathBuf,
}

/// Everything the composer needs, in scene order
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionJob {
    pub title: Option<String>,
    pub images: Vec<PathBuf>,
    pub audio: Vec<AudioArtifact>,
    pub subtitles: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Text-to-speech collaborator
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + Debug {
    /// Synthesize `request` into `output` and report the audio duration
    async fn synthesize(&self, request: SpeechRequest, output: &Path) -> Result<AudioArtifact, ProviderError>;
}

/// Image-generation collaborator
#[async_trait]
pub trait ImageGenerator: Send + Sync + Debug {
    /// Generate an image for `request` into `output`
    async fn generate(&self, request: ImageRequest, output: &Path) -> Result<ImageArtifact, ProviderError>;
}

/// Video composition collaborator
#[async_trait]
pub trait VideoComposer: Send + Sync + Debug {
    /// Produce the final video and return its path
    async fn compose(&self, job: CompositionJob) -> Result<PathBuf, ProviderError>;
}
