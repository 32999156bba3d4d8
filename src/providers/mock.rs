/*!
 * Offline collaborators.
 *
 * `MockCollaborator` implements speech, image and composition traits and
 * writes small placeholder files instead of calling a service. Behaviors:
 * - `MockCollaborator::working()` - always succeeds
 * - `MockCollaborator::failing()` - always fails permanently
 * - `MockCollaborator::slow(ms)` - succeeds after a delay, tracking how many
 *   calls overlap
 * - `MockCollaborator::new(MockBehavior::FailOnScenes { .. })` - fails for
 *   chosen scenes only
 *
 * Clones share their call counters, so a test can keep one handle and give
 * the other to the pipeline.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::app_config::{Config, ReadingSpeedConfig, SubtitleConfig};
use crate::errors::ProviderError;
use crate::file_utils::FileManager;
use crate::language_utils::estimate_duration;
use crate::providers::{
    AudioArtifact, CompositionJob, ImageArtifact, ImageGenerator, ImageRequest, SpeechRequest, SpeechSynthesizer,
    VideoComposer,
};

/// Behavior mode for the mock collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Always fails with a permanent error
    Failing,
    /// The first `failures` calls for each scene fail transiently
    TransientThenOk { failures: usize },
    /// Calls for the listed scenes fail, transiently or permanently
    FailOnScenes { scenes: Vec<usize>, transient: bool },
    /// Succeeds after a delay
    Slow { delay_ms: u64 },
}

/// Offline speech/image/composition collaborator
#[derive(Debug, Clone)]
pub struct MockCollaborator {
    behavior: MockBehavior,
    /// Fixed audio duration; `None` estimates it from the text
    audio_duration_secs: Option<f64>,
    reading: ReadingSpeedConfig,
    cjk_threshold: f64,
    request_count: Arc<AtomicUsize>,
    scene_calls: Arc<Mutex<Vec<usize>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockCollaborator {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            audio_duration_secs: None,
            reading: ReadingSpeedConfig::default(),
            cjk_threshold: SubtitleConfig::default().cjk_threshold,
            request_count: Arc::new(AtomicUsize::new(0)),
            scene_calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Report this duration for every synthesized scene
    pub fn with_audio_duration(mut self, secs: f64) -> Self {
        self.audio_duration_secs = Some(secs);
        self
    }

    /// Estimate audio durations with the configured reading speeds and
    /// CJK threshold
    pub fn with_estimates_from(mut self, config: &Config) -> Self {
        self.reading = config.reading.clone();
        self.cjk_threshold = config.subtitle.cjk_threshold;
        self
    }

    /// Most calls that were in progress at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Total calls made, including failed ones
    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Scene index of every call, in call order
    pub fn scene_calls(&self) -> Vec<usize> {
        self.scene_calls.lock().clone()
    }

    /// Calls made for one scene
    pub fn calls_for_scene(&self, scene_index: usize) -> usize {
        self.scene_calls.lock().iter().filter(|&&s| s == scene_index).count()
    }

    /// Change the behavior of this handle and every clone made afterwards
    pub fn set_behavior(&mut self, behavior: MockBehavior) {
        self.behavior = behavior;
    }

    async fn check(&self, scene_index: usize) -> Result<(), ProviderError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let result = self.respond(scene_index).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn respond(&self, scene_index: usize) -> Result<(), ProviderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        let scene_attempt = {
            let mut calls = self.scene_calls.lock();
            calls.push(scene_index);
            calls.iter().filter(|&&s| s == scene_index).count()
        };

        match &self.behavior {
            MockBehavior::Working => Ok(()),
            MockBehavior::Failing => Err(ProviderError::ContentRejected(format!(
                "mock rejects scene {}",
                scene_index
            ))),
            MockBehavior::TransientThenOk { failures } => {
                if scene_attempt <= *failures {
                    Err(ProviderError::Timeout(format!(
                        "mock timeout for scene {} (attempt {})",
                        scene_index, scene_attempt
                    )))
                } else {
                    Ok(())
                }
            }
            MockBehavior::FailOnScenes { scenes, transient } => {
                if !scenes.contains(&scene_index) {
                    Ok(())
                } else if *transient {
                    Err(ProviderError::ServerError {
                        status_code: 503,
                        message: format!("mock outage for scene {}", scene_index),
                    })
                } else {
                    Err(ProviderError::ContentRejected(format!(
                        "mock rejects scene {}",
                        scene_index
                    )))
                }
            }
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
                Ok(())
            }
        }
    }

    fn write_placeholder(path: &Path, content: String) -> Result<(), ProviderError> {
        FileManager::write_atomic(path, content.as_bytes()).map_err(|e| ProviderError::Io(format!("{:#}", e)))
    }
}

#[async_trait]
impl SpeechSynthesizer for MockCollaborator {
    async fn synthesize(&self, request: SpeechRequest, output: &Path) -> Result<AudioArtifact, ProviderError> {
        self.check(request.scene_index).await?;

        let duration_secs = self.audio_duration_secs.unwrap_or_else(|| {
            let estimate = estimate_duration(&request.text, &self.reading, self.cjk_threshold);
            (estimate / request.speed).max(0.5)
        });
        Self::write_placeholder(
            output,
            format!(
                "MOCK-AUDIO\nmodel={}\nvoice={}\nspeed={}\nduration={}\n{}\n",
                request.model, request.voice, request.speed, duration_secs, request.text
            ),
        )?;

        Ok(AudioArtifact {
            scene_index: request.scene_index,
            path: output.to_path_buf(),
            duration_secs,
        })
    }
}

#[async_trait]
impl ImageGenerator for MockCollaborator {
    async fn generate(&self, request: ImageRequest, output: &Path) -> Result<ImageArtifact, ProviderError> {
        self.check(request.scene_index).await?;

        Self::write_placeholder(
            output,
            format!(
                "MOCK-IMAGE\nmodel={}\nsize={}\nquality={}\n{}\n",
                request.model, request.size, request.quality, request.prompt
            ),
        )?;

        Ok(ImageArtifact {
            scene_index: request.scene_index,
            path: output.to_path_buf(),
        })
    }
}

#[async_trait]
impl VideoComposer for MockCollaborator {
    async fn compose(&self, job: CompositionJob) -> Result<PathBuf, ProviderError> {
        self.check(0).await?;

        let mut listing = format!(
            "MOCK-VIDEO {}x{}@{}\ntitle={}\nsubtitles={}\n",
            job.width,
            job.height,
            job.fps,
            job.title.as_deref().unwrap_or(""),
            job.subtitles.display()
        );
        for (image, audio) in job.images.iter().zip(&job.audio) {
            listing.push_str(&format!(
                "{} + {} ({:.3}s)\n",
                image.display(),
                audio.path.display(),
                audio.duration_secs
            ));
        }
        Self::write_placeholder(&job.output, listing)?;
        Ok(job.output)
    }
}
