/*!
 * Pipeline orchestrator.
 *
 * Drives split → narrate → illustrate → subtitle → compose against a
 * working directory. Every stage is classified as missing, stale or fresh
 * from the fingerprints in the run manifest; fresh artifacts are fed
 * forward untouched, so a repeated run over a complete directory makes no
 * external call and leaves `subtitles.srt` byte-identical.
 *
 * Paid stages ask the confirmation gate first unless the run is
 * pre-authorized. Per-scene calls run concurrently up to the configured
 * limit, each wrapped in the retry policy. Successful scenes are committed
 * to the manifest immediately, so a failed stage can be resumed for the
 * failed scenes only.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::confirmation::{AutoDecline, ConfirmationGate, CostEstimate};
use super::manifest::{ArtifactRecord, AudioRecord, RunManifest};
use super::retry::RetryPolicy;
use super::stage::{Stage, StageState, fingerprint};
use super::workspace::{IMAGE_EXTENSION, SCENES_FILE, WorkDir};
use crate::app_config::Config;
use crate::errors::{ConfigError, PipelineError, ProviderError, SceneFailure};
use crate::file_utils::FileManager;
use crate::language_utils::estimate_duration;
use crate::providers::{
    AudioArtifact, CompositionJob, ImageArtifact, ImageGenerator, ImageRequest, SpeechRequest, SpeechSynthesizer,
    VideoComposer,
};
use crate::scene::{ImagePromptBuilder, InputFormat, ReadingDictionary, Scene, SceneSplitter, SplitResult};
use crate::subtitle::{SubtitleChunker, TimingAllocator};
use crate::subtitle_processor::{SubtitleCollection, SubtitleEntry};
use crate::validation::TimelineValidator;

/// Per-run choices made by the caller
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stages to regenerate even when fresh
    pub force: HashSet<Stage>,
    /// Stages to leave out (illustrate and compose only)
    pub skip: HashSet<Stage>,
    /// Skip the confirmation gate for paid stages
    pub pre_authorized: bool,
    /// Where the composed video goes; defaults to the working directory
    pub output_path: Option<PathBuf>,
    /// Input format; detected from the content when `None`
    pub input_format: Option<InputFormat>,
}

impl RunOptions {
    pub fn pre_authorized() -> Self {
        Self {
            pre_authorized: true,
            ..Self::default()
        }
    }

    pub fn force(mut self, stage: Stage) -> Self {
        self.force.insert(stage);
        self
    }

    pub fn skip(mut self, stage: Stage) -> Self {
        self.skip.insert(stage);
        self
    }
}

/// Why a stage did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Cached artifacts match the current inputs
    Fresh,
    /// The caller asked to skip it
    Requested,
    /// An earlier stage was skipped
    MissingInputs,
    /// No composition collaborator was configured
    NoComposer,
}

/// Events emitted while a run progresses
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineProgress {
    StageStarted { stage: Stage, pending: usize, total: usize },
    SceneCompleted { stage: Stage, scene_index: usize },
    SceneFailed { stage: Stage, scene_index: usize },
    StageSkipped { stage: Stage, reason: SkipReason },
    StageFinished { stage: Stage },
}

pub type ProgressCallback = Arc<dyn Fn(PipelineProgress) + Send + Sync>;

/// What happened to one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    /// State before the run touched it
    pub state: StageState,
    pub executed: bool,
    /// External calls made, retries included
    pub external_calls: usize,
}

impl StageReport {
    fn skipped(stage: Stage, state: StageState) -> Self {
        Self {
            stage,
            state,
            executed: false,
            external_calls: 0,
        }
    }

    fn executed(stage: Stage, state: StageState, external_calls: usize) -> Self {
        Self {
            stage,
            state,
            executed: true,
            external_calls,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub title: Option<String>,
    pub scenes: Vec<Scene>,
    pub audio: Vec<AudioArtifact>,
    pub images: Vec<ImageArtifact>,
    pub subtitles_path: PathBuf,
    pub subtitle_count: usize,
    pub video_path: Option<PathBuf>,
    pub stages: Vec<StageReport>,
    pub estimated_narration_secs: f64,
    pub timeline_findings: usize,
}

impl RunReport {
    /// External calls made across all stages
    pub fn external_calls(&self) -> usize {
        self.stages.iter().map(|s| s.external_calls).sum()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Total narration length in seconds
    pub fn total_duration_secs(&self) -> f64 {
        self.audio.iter().map(|a| a.duration_secs).sum()
    }
}

/// How a run ended without error
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    /// The confirmation gate declined a paid stage
    Cancelled { stage: Stage, completed: Vec<StageReport> },
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled { .. })
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Cancelled { .. } => None,
        }
    }
}

/// Per-scene view of a plan
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePlan {
    pub scene_index: usize,
    pub narration: StageState,
    pub illustration: StageState,
}

/// Stage states of a working directory, computed without running anything
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub stages: Vec<(Stage, StageState)>,
    pub scenes: Vec<ScenePlan>,
    /// Scene files left over from runs with more scenes
    pub orphans: Vec<PathBuf>,
}

impl RunPlan {
    pub fn state(&self, stage: Stage) -> Option<StageState> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, state)| *state)
    }
}

enum StageRun {
    Done(StageReport),
    Declined,
}

enum SceneArtifact {
    Audio(AudioArtifact),
    Image(ImageArtifact),
}

/// Per-scene fingerprint and state for a paid stage
struct SceneJob {
    fingerprint: String,
    state: StageState,
}

pub struct Orchestrator {
    config: Config,
    workdir: WorkDir,
    speech: Arc<dyn SpeechSynthesizer>,
    images: Arc<dyn ImageGenerator>,
    composer: Option<Arc<dyn VideoComposer>>,
    gate: Arc<dyn ConfirmationGate>,
    readings: ReadingDictionary,
    retry: RetryPolicy,
    progress: Option<ProgressCallback>,
    splitter: SceneSplitter,
    chunker: SubtitleChunker,
    prompts: ImagePromptBuilder,
}

impl Orchestrator {
    /// Create an orchestrator; the configuration is validated here, once
    pub fn new(
        config: Config,
        workdir: WorkDir,
        speech: Arc<dyn SpeechSynthesizer>,
        images: Arc<dyn ImageGenerator>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            splitter: SceneSplitter::from_config(&config),
            chunker: SubtitleChunker::from_config(&config.subtitle),
            prompts: ImagePromptBuilder::from_config(&config.image),
            retry: RetryPolicy::from_settings(&config.pipeline),
            config,
            workdir,
            speech,
            images,
            composer: None,
            gate: Arc::new(AutoDecline),
            readings: ReadingDictionary::default(),
            progress: None,
        })
    }

    pub fn with_composer(mut self, composer: Arc<dyn VideoComposer>) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_readings(mut self, readings: ReadingDictionary) -> Self {
        self.readings = readings;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn workdir(&self) -> &WorkDir {
        &self.workdir
    }

    fn emit(&self, event: PipelineProgress) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    fn commit(&self, manifest: &Mutex<RunManifest>, update: impl FnOnce(&mut RunManifest)) -> Result<(), PipelineError> {
        let mut guard = manifest.lock();
        update(&mut guard);
        guard.save(self.workdir.manifest_path())
    }

    // Fingerprints

    fn split_fingerprint(&self, input: &str, format: Option<InputFormat>) -> String {
        let format = format.map(|f| format!("{:?}", f)).unwrap_or_default();
        fingerprint([
            "split",
            input,
            self.config.video.max_scenes.to_string().as_str(),
            format.as_str(),
        ])
    }

    fn speech_request(&self, scene: &Scene) -> SpeechRequest {
        let tts = &self.config.tts;
        SpeechRequest {
            scene_index: scene.index,
            text: self.readings.apply(&scene.narration_text),
            model: tts.model.clone(),
            voice: tts.voice.clone(),
            speed: tts.speed,
            output_format: tts.output_format.clone(),
        }
    }

    fn narration_fingerprint(request: &SpeechRequest) -> String {
        fingerprint([
            "narrate",
            request.text.as_str(),
            request.model.as_str(),
            request.voice.as_str(),
            request.speed.to_string().as_str(),
            request.output_format.as_str(),
        ])
    }

    fn image_request(&self, scene: &Scene) -> ImageRequest {
        let image = &self.config.image;
        ImageRequest {
            scene_index: scene.index,
            prompt: self.prompts.build(scene),
            model: image.model.clone(),
            size: image.size.clone(),
            quality: image.quality.clone(),
        }
    }

    fn illustration_fingerprint(request: &ImageRequest) -> String {
        fingerprint([
            "illustrate",
            request.prompt.as_str(),
            request.model.as_str(),
            request.size.as_str(),
            request.quality.as_str(),
        ])
    }

    fn subtitle_fingerprint(&self, scenes: &[Scene], audio: &[AudioRecord]) -> String {
        let subtitle = &self.config.subtitle;
        let mut parts = vec![
            "subtitle".to_string(),
            subtitle.max_cjk_chars.to_string(),
            subtitle.max_words_per_fragment.to_string(),
            subtitle.min_display_secs.to_string(),
            subtitle.cjk_threshold.to_string(),
        ];
        for (scene, record) in scenes.iter().zip(audio) {
            parts.push(scene.narration_text.clone());
            parts.push(record.fingerprint.clone());
            parts.push(record.duration_secs.to_string());
        }
        fingerprint(parts)
    }

    fn composition_fingerprint(&self, title: Option<&str>, subtitles_fp: &str, manifest: &RunManifest) -> String {
        let video = &self.config.video;
        let mut parts = vec![
            "compose".to_string(),
            title.unwrap_or_default().to_string(),
            subtitles_fp.to_string(),
            format!("{}x{}@{}", video.width, video.height, video.fps),
        ];
        parts.extend(manifest.narration.values().map(|r| r.fingerprint.clone()));
        parts.extend(manifest.illustration.values().map(|r| r.fingerprint.clone()));
        fingerprint(parts)
    }

    // Classification

    fn narration_jobs(&self, scenes: &[Scene], manifest: &RunManifest) -> Vec<SceneJob> {
        scenes
            .iter()
            .map(|scene| {
                let fingerprint = Self::narration_fingerprint(&self.speech_request(scene));
                let record = manifest.narration.get(&scene.index);
                let state = StageState::classify(
                    record.map(|r| r.fingerprint.as_str()),
                    &fingerprint,
                    record.is_some_and(|r| self.workdir.exists(&r.file)),
                );
                SceneJob { fingerprint, state }
            })
            .collect()
    }

    fn illustration_jobs(&self, scenes: &[Scene], manifest: &RunManifest) -> Vec<SceneJob> {
        scenes
            .iter()
            .map(|scene| {
                let fingerprint = Self::illustration_fingerprint(&self.image_request(scene));
                let record = manifest.illustration.get(&scene.index);
                let state = StageState::classify(
                    record.map(|r| r.fingerprint.as_str()),
                    &fingerprint,
                    record.is_some_and(|r| self.workdir.exists(&r.file)),
                );
                SceneJob { fingerprint, state }
            })
            .collect()
    }

    fn load_scenes(&self) -> anyhow::Result<SplitResult> {
        let content = FileManager::read_to_string(self.workdir.scenes_path())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Split-stage state and the scenes it yields, without writing anything
    fn classify_split(
        &self,
        input: &str,
        options: &RunOptions,
        manifest: &RunManifest,
    ) -> (String, StageState, Option<SplitResult>) {
        let expected = self.split_fingerprint(input, options.input_format);
        let state = StageState::classify(
            manifest.split.as_ref().map(|r| r.fingerprint.as_str()),
            &expected,
            FileManager::file_exists(self.workdir.scenes_path()),
        );
        let cached = if state == StageState::Fresh {
            match self.load_scenes() {
                Ok(split) => Some(split),
                Err(e) => {
                    warn!("Cached scenes are unreadable, splitting again: {:#}", e);
                    None
                }
            }
        } else {
            None
        };
        (expected, state, cached)
    }

    /// Classify every stage without running anything
    pub fn plan(&self, input: &str, options: &RunOptions) -> Result<RunPlan, PipelineError> {
        let manifest = RunManifest::load(self.workdir.manifest_path())?;

        let (_, split_state, cached) = self.classify_split(input, options, &manifest);
        let split = match cached {
            Some(split) => split,
            None => self.splitter.split(input, options.input_format)?,
        };
        let split_state = if split_state == StageState::Fresh && !options.force.contains(&Stage::Split) {
            StageState::Fresh
        } else {
            split_state.max(StageState::Stale)
        };

        let narration = self.narration_jobs(&split.scenes, &manifest);
        let illustration = self.illustration_jobs(&split.scenes, &manifest);
        let narration_state = StageState::aggregate(narration.iter().map(|j| j.state));
        let illustration_state = StageState::aggregate(illustration.iter().map(|j| j.state));

        let subtitles_exist = manifest
            .subtitles
            .as_ref()
            .is_some_and(|r| self.workdir.exists(&r.file));
        let subtitle_fp = (narration_state == StageState::Fresh).then(|| {
            let audio: Vec<AudioRecord> = manifest.narration.values().cloned().collect();
            self.subtitle_fingerprint(&split.scenes, &audio)
        });
        let subtitle_state = match &subtitle_fp {
            Some(fp) => StageState::classify(manifest.subtitles.as_ref().map(|r| r.fingerprint.as_str()), fp, subtitles_exist),
            None if subtitles_exist => StageState::Stale,
            None => StageState::Missing,
        };

        let composition_exists = manifest
            .composition
            .as_ref()
            .is_some_and(|r| self.workdir.exists(&r.file));
        let compose_state = match &subtitle_fp {
            Some(fp) if subtitle_state == StageState::Fresh && illustration_state == StageState::Fresh => {
                let expected = self.composition_fingerprint(split.title.as_deref(), fp, &manifest);
                StageState::classify(
                    manifest.composition.as_ref().map(|r| r.fingerprint.as_str()),
                    &expected,
                    composition_exists,
                )
            }
            _ if composition_exists => StageState::Stale,
            _ => StageState::Missing,
        };

        let orphans = self
            .workdir
            .orphaned_scene_files(split.scenes.len(), &[self.config.tts.output_format.as_str(), IMAGE_EXTENSION])
            .map_err(|e| PipelineError::io(Stage::Split, format!("{:#}", e)))?;

        let scenes = narration
            .iter()
            .zip(&illustration)
            .enumerate()
            .map(|(scene_index, (n, i))| ScenePlan {
                scene_index,
                narration: n.state,
                illustration: i.state,
            })
            .collect();

        Ok(RunPlan {
            stages: vec![
                (Stage::Split, split_state),
                (Stage::Narrate, narration_state),
                (Stage::Illustrate, illustration_state),
                (Stage::Subtitle, subtitle_state),
                (Stage::Compose, compose_state),
            ],
            scenes,
            orphans,
        })
    }

    // Execution

    /// Run the pipeline over `input`.
    ///
    /// A declined confirmation ends the run with `RunOutcome::Cancelled`;
    /// artifacts committed before that point stay in place.
    pub async fn run(&self, input: &str, options: &RunOptions) -> Result<RunOutcome, PipelineError> {
        if let Some(stage) = options.skip.iter().find(|s| !s.is_skippable()) {
            return Err(ConfigError::new("skip", format!("stage '{}' cannot be skipped", stage)).into());
        }

        let manifest = Mutex::new(RunManifest::load(self.workdir.manifest_path())?);
        let mut stages = Vec::new();

        let (split, report) = self.run_split(input, options, &manifest)?;
        stages.push(report);
        let estimated_narration_secs = self.preflight(&split.scenes)?;

        match self.run_narration(&split.scenes, options, &manifest).await? {
            StageRun::Done(report) => stages.push(report),
            StageRun::Declined => {
                return Ok(RunOutcome::Cancelled {
                    stage: Stage::Narrate,
                    completed: stages,
                });
            }
        }
        let audio_records = self.committed_audio(split.scenes.len(), &manifest)?;

        let illustrated = if options.skip.contains(&Stage::Illustrate) {
            self.emit(PipelineProgress::StageSkipped {
                stage: Stage::Illustrate,
                reason: SkipReason::Requested,
            });
            false
        } else {
            match self.run_illustration(&split.scenes, options, &manifest).await? {
                StageRun::Done(report) => {
                    stages.push(report);
                    true
                }
                StageRun::Declined => {
                    return Ok(RunOutcome::Cancelled {
                        stage: Stage::Illustrate,
                        completed: stages,
                    });
                }
            }
        };

        let (subtitles_fp, entries, report) = self.run_subtitles(&split.scenes, &audio_records, options, &manifest)?;
        stages.push(report);
        let findings = TimelineValidator::from_config(&self.config.subtitle).validate(&entries);
        for finding in &findings.findings {
            warn!("Subtitle {}: {}", finding.seq_num, finding.issue);
        }

        let (video_path, compose_report) = self
            .run_composition(&split, &audio_records, &subtitles_fp, illustrated, options, &manifest)
            .await?;
        if let Some(report) = compose_report {
            stages.push(report);
        }

        let audio = split
            .scenes
            .iter()
            .zip(&audio_records)
            .map(|(scene, record)| AudioArtifact {
                scene_index: scene.index,
                path: self.workdir.resolve(&record.file),
                duration_secs: record.duration_secs,
            })
            .collect();
        let images = if illustrated {
            let manifest = manifest.lock();
            manifest
                .illustration
                .iter()
                .map(|(&scene_index, record)| ImageArtifact {
                    scene_index,
                    path: self.workdir.resolve(&record.file),
                })
                .collect()
        } else {
            Vec::new()
        };

        let report = RunReport {
            title: split.title,
            scenes: split.scenes,
            audio,
            images,
            subtitles_path: self.workdir.subtitles_path(),
            subtitle_count: entries.len(),
            video_path,
            stages,
            estimated_narration_secs,
            timeline_findings: findings.findings.len(),
        };
        info!(
            "Run finished: {} scene(s), {} subtitle(s), {} external call(s)",
            report.scenes.len(),
            report.subtitle_count,
            report.external_calls()
        );
        Ok(RunOutcome::Completed(report))
    }

    fn run_split(
        &self,
        input: &str,
        options: &RunOptions,
        manifest: &Mutex<RunManifest>,
    ) -> Result<(SplitResult, StageReport), PipelineError> {
        let stage = Stage::Split;
        let (expected, state, cached) = {
            let guard = manifest.lock();
            self.classify_split(input, options, &guard)
        };

        if let Some(split) = cached {
            if !options.force.contains(&stage) {
                debug!("Reusing {} cached scene(s)", split.scenes.len());
                self.emit(PipelineProgress::StageSkipped {
                    stage,
                    reason: SkipReason::Fresh,
                });
                return Ok((split, StageReport::skipped(stage, state)));
            }
        }

        self.emit(PipelineProgress::StageStarted {
            stage,
            pending: 1,
            total: 1,
        });
        let split = self.splitter.split(input, options.input_format)?;
        let json = serde_json::to_string_pretty(&split).map_err(|e| PipelineError::io(stage, e))?;
        FileManager::write_atomic(self.workdir.scenes_path(), json.as_bytes())
            .map_err(|e| PipelineError::io(stage, format!("{:#}", e)))?;

        let scene_count = split.scenes.len();
        self.commit(manifest, |m| {
            m.split = Some(ArtifactRecord {
                fingerprint: expected,
                file: SCENES_FILE.to_string(),
            });
            m.retain_scenes(scene_count);
        })?;
        info!("Split input into {} scene(s)", scene_count);
        self.emit(PipelineProgress::StageFinished { stage });
        Ok((split, StageReport::executed(stage, state, 0)))
    }

    /// Check the estimated narration time against the configured maximum
    fn preflight(&self, scenes: &[Scene]) -> Result<f64, PipelineError> {
        let estimated: f64 = scenes
            .iter()
            .map(|s| estimate_duration(&s.narration_text, &self.config.reading, self.config.subtitle.cjk_threshold))
            .sum();
        let max_secs = self.config.video.max_duration_secs;

        if estimated > max_secs {
            if self.config.video.enforce_max_duration {
                return Err(PipelineError::DurationExceeded {
                    estimated_secs: estimated,
                    max_secs,
                });
            }
            warn!(
                "Estimated narration of {:.1}s exceeds the maximum of {:.1}s; the video will run long",
                estimated, max_secs
            );
        }
        Ok(estimated)
    }

    fn approve(&self, stage: Stage, pending: usize, total: usize, options: &RunOptions) -> bool {
        if options.pre_authorized || !stage.is_paid() {
            return true;
        }
        let unit_cost = if stage == Stage::Narrate {
            self.config.pipeline.tts_unit_cost
        } else {
            self.config.pipeline.image_unit_cost
        };
        let estimate = CostEstimate {
            stage,
            pending_calls: pending,
            total_scenes: total,
            unit_cost,
        };
        let approved = self.gate.confirm(&estimate);
        if !approved {
            info!("Run cancelled before stage {}", stage);
        }
        approved
    }

    /// Dispatch per-scene calls for a paid stage and commit each success
    async fn dispatch<F, Fut>(
        &self,
        stage: Stage,
        pending: &[usize],
        jobs: &[SceneJob],
        manifest: &Mutex<RunManifest>,
        call: F,
    ) -> Result<(Vec<SceneFailure>, usize), PipelineError>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<SceneArtifact, ProviderError>>,
    {
        let calls = AtomicUsize::new(0);
        let concurrency = self.config.pipeline.concurrent_requests.max(1);

        let outcomes = stream::iter(pending.iter().copied())
            .map(|index| {
                let calls = &calls;
                let call = &call;
                async move {
                    let label = format!("{} scene {}", stage, index);
                    let (result, attempts) = self
                        .retry
                        .execute(&label, |_| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            call(index)
                        })
                        .await;

                    match result {
                        Ok(artifact) => {
                            let fingerprint = jobs[index].fingerprint.clone();
                            let committed = self.commit(manifest, |m| match artifact {
                                SceneArtifact::Audio(audio) => {
                                    m.narration.insert(
                                        index,
                                        AudioRecord {
                                            fingerprint,
                                            file: self.workdir.relative_name(&audio.path),
                                            duration_secs: audio.duration_secs,
                                        },
                                    );
                                }
                                SceneArtifact::Image(image) => {
                                    m.illustration.insert(
                                        index,
                                        ArtifactRecord {
                                            fingerprint,
                                            file: self.workdir.relative_name(&image.path),
                                        },
                                    );
                                }
                            });
                            if let Err(e) = committed {
                                return Err(e);
                            }
                            self.emit(PipelineProgress::SceneCompleted {
                                stage,
                                scene_index: index,
                            });
                            Ok(None)
                        }
                        Err(error) => {
                            error!("{} failed: {}", label, error);
                            self.emit(PipelineProgress::SceneFailed {
                                stage,
                                scene_index: index,
                            });
                            Ok(Some(SceneFailure {
                                scene_index: index,
                                error,
                                attempts,
                            }))
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<Result<Option<SceneFailure>, PipelineError>>>()
            .await;

        let mut failures = Vec::new();
        for outcome in outcomes {
            if let Some(failure) = outcome? {
                failures.push(failure);
            }
        }
        failures.sort_by_key(|f| f.scene_index);
        Ok((failures, calls.load(Ordering::SeqCst)))
    }

    /// Shared flow of the narrate and illustrate stages
    async fn run_paid_stage<F, Fut>(
        &self,
        stage: Stage,
        jobs: Vec<SceneJob>,
        options: &RunOptions,
        manifest: &Mutex<RunManifest>,
        call: F,
    ) -> Result<StageRun, PipelineError>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<SceneArtifact, ProviderError>>,
    {
        let state = StageState::aggregate(jobs.iter().map(|j| j.state));
        let forced = options.force.contains(&stage);
        let pending: Vec<usize> = jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| forced || job.state.needs_run())
            .map(|(index, _)| index)
            .collect();

        if pending.is_empty() {
            debug!("All {} artifact(s) of stage {} are fresh", jobs.len(), stage);
            self.emit(PipelineProgress::StageSkipped {
                stage,
                reason: SkipReason::Fresh,
            });
            return Ok(StageRun::Done(StageReport::skipped(stage, state)));
        }

        if !self.approve(stage, pending.len(), jobs.len(), options) {
            return Ok(StageRun::Declined);
        }

        // Records of scenes about to be regenerated no longer describe their files
        self.commit(manifest, |m| {
            for index in &pending {
                match stage {
                    Stage::Narrate => {
                        m.narration.remove(index);
                    }
                    _ => {
                        m.illustration.remove(index);
                    }
                }
            }
        })?;

        info!("Stage {}: generating {} of {} scene(s)", stage, pending.len(), jobs.len());
        self.emit(PipelineProgress::StageStarted {
            stage,
            pending: pending.len(),
            total: jobs.len(),
        });

        let (failures, calls) = self.dispatch(stage, &pending, &jobs, manifest, call).await?;

        if !failures.is_empty() {
            let completed_scenes = {
                let m = manifest.lock();
                (0..jobs.len())
                    .filter(|index| match stage {
                        Stage::Narrate => m.narration.contains_key(index),
                        _ => m.illustration.contains_key(index),
                    })
                    .collect()
            };
            return Err(PipelineError::StageFailed {
                stage,
                failures,
                completed_scenes,
                artifacts_preserved: true,
            });
        }

        self.emit(PipelineProgress::StageFinished { stage });
        Ok(StageRun::Done(StageReport::executed(stage, state, calls)))
    }

    async fn run_narration(
        &self,
        scenes: &[Scene],
        options: &RunOptions,
        manifest: &Mutex<RunManifest>,
    ) -> Result<StageRun, PipelineError> {
        let jobs = {
            let guard = manifest.lock();
            self.narration_jobs(scenes, &guard)
        };
        let extension = self.config.tts.output_format.clone();

        self.run_paid_stage(Stage::Narrate, jobs, options, manifest, |index| {
            let request = self.speech_request(&scenes[index]);
            let output = self.workdir.audio_path(index, &extension);
            async move {
                match self.speech.synthesize(request, &output).await {
                    Ok(audio) if !(audio.duration_secs.is_finite() && audio.duration_secs >= 0.0) => {
                        Err(ProviderError::InvalidRequest(format!(
                            "speech returned an invalid duration: {}",
                            audio.duration_secs
                        )))
                    }
                    result => result.map(SceneArtifact::Audio),
                }
            }
        })
        .await
    }

    async fn run_illustration(
        &self,
        scenes: &[Scene],
        options: &RunOptions,
        manifest: &Mutex<RunManifest>,
    ) -> Result<StageRun, PipelineError> {
        let jobs = {
            let guard = manifest.lock();
            self.illustration_jobs(scenes, &guard)
        };

        self.run_paid_stage(Stage::Illustrate, jobs, options, manifest, |index| {
            let request = self.image_request(&scenes[index]);
            let output = self.workdir.image_path(index);
            async move { self.images.generate(request, &output).await.map(SceneArtifact::Image) }
        })
        .await
    }

    /// Narration records of all scenes in scene order
    fn committed_audio(&self, scene_count: usize, manifest: &Mutex<RunManifest>) -> Result<Vec<AudioRecord>, PipelineError> {
        let m = manifest.lock();
        (0..scene_count)
            .map(|index| {
                m.narration
                    .get(&index)
                    .cloned()
                    .ok_or_else(|| PipelineError::Manifest(format!("no narration recorded for scene {}", index)))
            })
            .collect()
    }

    fn build_entries(&self, scenes: &[Scene], audio: &[AudioRecord]) -> Vec<SubtitleEntry> {
        let mut allocator = TimingAllocator::new(self.config.subtitle.min_display_secs);
        let mut entries = Vec::new();
        for (scene, record) in scenes.iter().zip(audio) {
            let fragments = self.chunker.chunk_scene(scene);
            entries.extend(allocator.allocate(&fragments, record.duration_secs));
        }
        entries
    }

    fn run_subtitles(
        &self,
        scenes: &[Scene],
        audio: &[AudioRecord],
        options: &RunOptions,
        manifest: &Mutex<RunManifest>,
    ) -> Result<(String, Vec<SubtitleEntry>, StageReport), PipelineError> {
        let stage = Stage::Subtitle;
        let expected = self.subtitle_fingerprint(scenes, audio);
        let path = self.workdir.subtitles_path();
        let state = {
            let m = manifest.lock();
            StageState::classify(
                m.subtitles.as_ref().map(|r| r.fingerprint.as_str()),
                &expected,
                FileManager::file_exists(&path),
            )
        };

        if state == StageState::Fresh && !options.force.contains(&stage) {
            match SubtitleCollection::read_from_srt(&path) {
                Ok(collection) => {
                    self.emit(PipelineProgress::StageSkipped {
                        stage,
                        reason: SkipReason::Fresh,
                    });
                    return Ok((expected, collection.entries, StageReport::skipped(stage, state)));
                }
                Err(e) => warn!("Cached subtitles are unreadable, regenerating: {:#}", e),
            }
        }

        self.emit(PipelineProgress::StageStarted {
            stage,
            pending: scenes.len(),
            total: scenes.len(),
        });
        let entries = self.build_entries(scenes, audio);
        let collection = SubtitleCollection::new(entries);
        collection
            .write_to_srt(&path)
            .map_err(|e| PipelineError::io(stage, format!("{:#}", e)))?;

        let file = self.workdir.relative_name(&path);
        let fingerprint = expected.clone();
        self.commit(manifest, |m| {
            m.subtitles = Some(ArtifactRecord { fingerprint, file });
            m.composition = None;
        })?;
        info!("Wrote {} subtitle(s) to {}", collection.entries.len(), path.display());
        self.emit(PipelineProgress::StageFinished { stage });
        Ok((expected, collection.entries, StageReport::executed(stage, state, 0)))
    }

    async fn run_composition(
        &self,
        split: &SplitResult,
        audio: &[AudioRecord],
        subtitles_fp: &str,
        illustrated: bool,
        options: &RunOptions,
        manifest: &Mutex<RunManifest>,
    ) -> Result<(Option<PathBuf>, Option<StageReport>), PipelineError> {
        let stage = Stage::Compose;
        let skip = |reason: SkipReason| -> Result<(Option<PathBuf>, Option<StageReport>), PipelineError> {
            self.emit(PipelineProgress::StageSkipped { stage, reason });
            Ok((None, None))
        };

        let Some(composer) = &self.composer else {
            debug!("No composer configured, stopping after subtitles");
            return skip(SkipReason::NoComposer);
        };
        if options.skip.contains(&stage) {
            return skip(SkipReason::Requested);
        }
        if !illustrated {
            info!("Illustrations were skipped, not composing a video");
            return skip(SkipReason::MissingInputs);
        }

        let output = options
            .output_path
            .clone()
            .unwrap_or_else(|| self.workdir.default_video_path());
        let (expected, state, images) = {
            let m = manifest.lock();
            let expected = self.composition_fingerprint(split.title.as_deref(), subtitles_fp, &m);
            let recorded = m
                .composition
                .as_ref()
                .filter(|r| self.workdir.resolve(&r.file) == output);
            let state = StageState::classify(
                recorded.map(|r| r.fingerprint.as_str()),
                &expected,
                FileManager::file_exists(&output),
            );
            let images: Vec<PathBuf> = m.illustration.values().map(|r| self.workdir.resolve(&r.file)).collect();
            (expected, state, images)
        };

        if state == StageState::Fresh && !options.force.contains(&stage) {
            self.emit(PipelineProgress::StageSkipped {
                stage,
                reason: SkipReason::Fresh,
            });
            return Ok((Some(output), Some(StageReport::skipped(stage, state))));
        }

        let job = CompositionJob {
            title: split.title.clone(),
            images,
            audio: split
                .scenes
                .iter()
                .zip(audio)
                .map(|(scene, record)| AudioArtifact {
                    scene_index: scene.index,
                    path: self.workdir.resolve(&record.file),
                    duration_secs: record.duration_secs,
                })
                .collect(),
            subtitles: self.workdir.subtitles_path(),
            output: output.clone(),
            width: self.config.video.width,
            height: self.config.video.height,
            fps: self.config.video.fps,
        };

        self.emit(PipelineProgress::StageStarted {
            stage,
            pending: 1,
            total: 1,
        });
        let calls = AtomicUsize::new(0);
        let (result, attempts) = self
            .retry
            .execute("compose", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                composer.compose(job.clone())
            })
            .await;
        let video = result.map_err(|error| PipelineError::CompositionFailed { error, attempts })?;

        let file = self.workdir.relative_name(&video);
        self.commit(manifest, |m| {
            m.composition = Some(ArtifactRecord {
                fingerprint: expected,
                file,
            });
        })?;
        info!("Composed {}", video.display());
        self.emit(PipelineProgress::StageFinished { stage });
        Ok((
            Some(video),
            Some(StageReport::executed(stage, state, calls.load(Ordering::SeqCst))),
        ))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workdir", &self.workdir.root())
            .field("speech", &self.speech)
            .field("images", &self.images)
            .field("composer", &self.composer)
            .field("gate", &self.gate)
            .finish()
    }
}
