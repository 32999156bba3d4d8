use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::language_utils::estimate_duration;
use crate::pipeline::{
    AutoApprove, ConfirmationGate, Orchestrator, PipelineProgress, ProgressCallback, RunOptions, RunOutcome, RunPlan,
    Stage, TerminalPrompt, WorkDir,
};
use crate::providers::mock::MockCollaborator;
use crate::providers::{ImageGenerator, SpeechSynthesizer, VideoComposer};
use crate::scene::{InputFormat, ReadingDictionary, SceneSplitter, SplitResult};
use crate::subtitle::{SubtitleChunker, TimingAllocator};
use crate::subtitle_processor::SubtitleCollection;
use crate::validation::TimelineValidator;

// @module: Application controller for story-to-video runs

/// Everything the `generate` command needs for one run
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    // @field: Story file (plain text or storyboard)
    pub input: PathBuf,
    // @field: Persistent working directory; a temp dir when absent
    pub work_dir: Option<PathBuf>,
    // @field: Final video path; next to the input when absent
    pub output: Option<PathBuf>,
    // @field: Forced input format; detected when absent
    pub format: Option<InputFormat>,
    pub force: Vec<Stage>,
    pub skip: Vec<Stage>,
    // @field: Approve paid stages without asking
    pub assume_yes: bool,
    // @field: Keep intermediates next to the input instead of a temp dir
    pub keep_intermediates: bool,
}

/// Renders pipeline progress events with one bar per stage
#[derive(Clone, Default)]
struct ProgressDisplay {
    current: Arc<Mutex<Option<ProgressBar>>>,
}

impl ProgressDisplay {
    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} scenes {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    fn callback(&self) -> ProgressCallback {
        let current = Arc::clone(&self.current);
        Arc::new(move |event| match event {
            PipelineProgress::StageStarted { stage, pending, .. } => {
                let bar = ProgressBar::new(pending as u64);
                bar.set_style(Self::style());
                bar.set_message(stage.to_string());
                if let Some(previous) = current.lock().replace(bar) {
                    previous.abandon();
                }
            }
            PipelineProgress::SceneCompleted { .. } | PipelineProgress::SceneFailed { .. } => {
                if let Some(bar) = current.lock().as_ref() {
                    bar.inc(1);
                }
            }
            PipelineProgress::StageFinished { stage } => {
                if let Some(bar) = current.lock().take() {
                    bar.finish_with_message(format!("{} done", stage));
                }
            }
            PipelineProgress::StageSkipped { stage, reason } => {
                debug!("Stage {} skipped ({:?})", stage, reason);
            }
        })
    }

    fn finish(&self) {
        if let Some(bar) = self.current.lock().take() {
            bar.abandon();
        }
    }
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    /// Create a controller with default configuration
    pub fn new_for_test() -> Result<Self> {
        Self::with_config(Config::default())
    }

    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read the story and detect its format from the extension
    fn read_input(input: &Path) -> Result<(String, Option<InputFormat>)> {
        if !FileManager::file_exists(input) {
            return Err(anyhow!("Input file does not exist: {}", input.display()));
        }
        let text = FileManager::read_to_string(input)?;
        Ok((text, FileManager::detect_input_format(input)))
    }

    /// Load the readings dictionary for `input`, if one can be found
    pub fn load_readings(&self, input: &Path) -> Result<ReadingDictionary> {
        let Some(path) = ReadingDictionary::discover(self.config.readings_path.as_deref(), Some(input)) else {
            debug!("No readings dictionary found");
            return Ok(ReadingDictionary::default());
        };
        let readings = ReadingDictionary::load(&path)
            .with_context(|| format!("Failed to load readings from {}", path.display()))?;
        info!("Loaded {} reading(s) from {}", readings.len(), path.display());
        Ok(readings)
    }

    /// Working directory for a run, plus the temp dir guard when one is used
    fn prepare_workdir(&self, request: &GenerateRequest) -> Result<(WorkDir, Option<TempDir>)> {
        if let Some(dir) = &request.work_dir {
            return Ok((WorkDir::open(dir)?, None));
        }
        if request.keep_intermediates {
            let dir = FileManager::generate_output_path(&request.input, None, "talecast");
            info!("Keeping intermediates in {}", dir.display());
            return Ok((WorkDir::open(dir)?, None));
        }
        let temp = TempDir::new().context("Failed to create temporary working directory")?;
        let workdir = WorkDir::open(temp.path())?;
        Ok((workdir, Some(temp)))
    }

    fn build_orchestrator(&self, workdir: WorkDir, readings: ReadingDictionary, assume_yes: bool) -> Result<Orchestrator> {
        let collaborator = MockCollaborator::working().with_estimates_from(&self.config);
        let speech: Arc<dyn SpeechSynthesizer> = Arc::new(collaborator.clone());
        let images: Arc<dyn ImageGenerator> = Arc::new(collaborator.clone());
        let composer: Arc<dyn VideoComposer> = Arc::new(collaborator);
        let gate: Arc<dyn ConfirmationGate> = if assume_yes {
            Arc::new(AutoApprove)
        } else {
            Arc::new(TerminalPrompt)
        };

        Ok(Orchestrator::new(self.config.clone(), workdir, speech, images)?
            .with_composer(composer)
            .with_gate(gate)
            .with_readings(readings))
    }

    /// Run the whole pipeline for one story
    pub async fn generate(&self, request: &GenerateRequest) -> Result<RunOutcome> {
        let start_time = Instant::now();
        let (text, detected) = Self::read_input(&request.input)?;
        let readings = self.load_readings(&request.input)?;
        let (workdir, temp_dir) = self.prepare_workdir(request)?;
        let output = request
            .output
            .clone()
            .unwrap_or_else(|| FileManager::generate_output_path(&request.input, None, "mp4"));

        let display = ProgressDisplay::default();
        let orchestrator = self
            .build_orchestrator(workdir, readings, request.assume_yes)?
            .with_progress(display.callback());
        let options = RunOptions {
            force: request.force.iter().copied().collect(),
            skip: request.skip.iter().copied().collect(),
            pre_authorized: request.assume_yes,
            output_path: Some(output),
            input_format: request.format.or(detected),
        };

        let result = orchestrator.run(&text, &options).await;
        display.finish();
        let outcome = result.context("Pipeline run failed")?;

        match &outcome {
            RunOutcome::Completed(report) => {
                info!(
                    "Generated {} scene(s), {:.1}s of narration in {}",
                    report.scenes.len(),
                    report.total_duration_secs(),
                    Self::format_duration(start_time.elapsed())
                );
                if let Some(video) = &report.video_path {
                    info!("Success: {}", video.display());
                }
            }
            RunOutcome::Cancelled { stage, .. } => {
                warn!("Cancelled before stage {}; completed artifacts were kept", stage);
            }
        }

        if temp_dir.is_some() {
            debug!("Discarding temporary working directory");
        }
        Ok(outcome)
    }

    /// Split a story into scenes without calling anything
    pub fn split_scenes(&self, input: &Path, format: Option<InputFormat>) -> Result<SplitResult> {
        let (text, detected) = Self::read_input(input)?;
        let split = SceneSplitter::from_config(&self.config)
            .split(&text, format.or(detected))
            .with_context(|| format!("Failed to split {}", input.display()))?;
        Ok(split)
    }

    /// Write subtitles timed by estimated reading speed instead of real audio
    pub fn write_estimated_subtitles(&self, input: &Path, format: Option<InputFormat>, output: &Path) -> Result<usize> {
        let split = self.split_scenes(input, format)?;
        let chunker = SubtitleChunker::from_config(&self.config.subtitle);
        let mut allocator = TimingAllocator::new(self.config.subtitle.min_display_secs);

        let mut entries = Vec::new();
        for scene in &split.scenes {
            let duration = estimate_duration(&scene.narration_text, &self.config.reading, self.config.subtitle.cjk_threshold);
            entries.extend(allocator.allocate(&chunker.chunk_scene(scene), duration));
        }

        let report = TimelineValidator::from_config(&self.config.subtitle).validate(&entries);
        for finding in &report.findings {
            warn!("Subtitle {}: {}", finding.seq_num, finding.issue);
        }

        let collection = SubtitleCollection::new(entries);
        collection.write_to_srt(output)?;
        info!("Wrote {} subtitle(s) to {}", collection.entries.len(), output.display());
        Ok(collection.entries.len())
    }

    /// Classify the stages of an existing working directory
    pub fn status(&self, input: &Path, work_dir: &Path, format: Option<InputFormat>) -> Result<RunPlan> {
        if !FileManager::dir_exists(work_dir) {
            return Err(anyhow!("Working directory does not exist: {}", work_dir.display()));
        }
        let (text, detected) = Self::read_input(input)?;
        let readings = self.load_readings(input)?;
        let orchestrator = self.build_orchestrator(WorkDir::open(work_dir)?, readings, false)?;
        let options = RunOptions {
            input_format: format.or(detected),
            ..RunOptions::default()
        };
        Ok(orchestrator.plan(&text, &options)?)
    }

    /// Format a duration as `1h 2m 3s`, `2m 3s` or `3.4s`
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{:.1}s", duration.as_secs_f64())
        }
    }
}
