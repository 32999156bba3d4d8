// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, debug, info, warn};
use std::io::Write;
use std::path::PathBuf;

use talecast::app_config::{self, Config};
use talecast::app_controller::{Controller, GenerateRequest};
use talecast::pipeline::{RunOutcome, Stage};
use talecast::profile::{GenerationOverrides, Profile};
use talecast::scene::InputFormat;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for InputFormat to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliInputFormat {
    PlainText,
    Storyboard,
}

impl From<CliInputFormat> for InputFormat {
    fn from(cli_format: CliInputFormat) -> Self {
        match cli_format {
            CliInputFormat::PlainText => InputFormat::PlainText,
            CliInputFormat::Storyboard => InputFormat::Storyboard,
        }
    }
}

/// CLI Wrapper for image quality to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliImageQuality {
    Low,
    Medium,
    High,
}

impl CliImageQuality {
    fn as_config_value(self) -> &'static str {
        match self {
            CliImageQuality::Low => "low",
            CliImageQuality::Medium => "medium",
            CliImageQuality::High => "high",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Turn a story into a narrated, illustrated and subtitled video
    Generate(GenerateArgs),

    /// Print the scenes a story splits into
    Scenes {
        /// Story file
        #[arg(value_name = "INPUT_PATH")]
        input_path: PathBuf,

        /// Input format; detected from the extension when omitted
        #[arg(long, value_enum)]
        format: Option<CliInputFormat>,

        /// Print the scenes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write subtitles timed by estimated reading speed
    Subtitles {
        /// Story file
        #[arg(value_name = "INPUT_PATH")]
        input_path: PathBuf,

        /// Output SRT file; next to the input when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Input format; detected from the extension when omitted
        #[arg(long, value_enum)]
        format: Option<CliInputFormat>,
    },

    /// Show which stages of a working directory are missing, stale or fresh
    Status {
        /// Story file
        #[arg(value_name = "INPUT_PATH")]
        input_path: PathBuf,

        /// Working directory of a previous run
        #[arg(short, long)]
        work_dir: PathBuf,

        /// Input format; detected from the extension when omitted
        #[arg(long, value_enum)]
        format: Option<CliInputFormat>,
    },

    /// Generate shell completions for talecast
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Story file (plain text or storyboard)
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Working directory for intermediates; reruns resume from it
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Output video path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Input format; detected from the extension when omitted
    #[arg(long, value_enum)]
    format: Option<CliInputFormat>,

    /// Regenerate a stage even when its artifacts are fresh (repeatable)
    #[arg(long, value_name = "STAGE")]
    force: Vec<Stage>,

    /// Skip a stage: illustrate or compose (repeatable)
    #[arg(long, value_name = "STAGE")]
    skip: Vec<Stage>,

    /// Approve paid stages without asking
    #[arg(short = 'y', long)]
    yes: bool,

    /// Keep intermediates next to the input when no --work-dir is given
    #[arg(long)]
    keep_intermediates: bool,

    /// Narration voice (overrides tts.voice)
    #[arg(long)]
    voice: Option<String>,

    /// Narration speed, 0.25 - 4.0 (overrides tts.speed)
    #[arg(long)]
    speed: Option<f64>,

    /// Maximum video duration in seconds (overrides video.max_duration_secs)
    #[arg(long, value_name = "SECS")]
    max_duration: Option<f64>,

    /// Image quality (overrides image.quality)
    #[arg(long, value_enum)]
    image_quality: Option<CliImageQuality>,

    /// Profile whose generation defaults fill settings not given as flags
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,
}

impl GenerateArgs {
    /// Flags first, then the profile's generation defaults
    fn generation_overrides(&self) -> Result<GenerationOverrides> {
        let flags = GenerationOverrides {
            voice: self.voice.clone(),
            speed: self.speed,
            max_duration_secs: self.max_duration,
            image_quality: self.image_quality.map(|q| q.as_config_value().to_string()),
            image_style_prefix: None,
        };

        match &self.profile {
            Some(name) => {
                let profile = Profile::load(name).with_context(|| format!("Failed to load profile '{}'", name))?;
                info!("Using profile: {}", profile.name);
                Ok(flags.with_profile_defaults(&profile.generation))
            }
            None => Ok(flags),
        }
    }
}

/// Talecast - narrated story videos from text
///
/// Splits a story into scenes, narrates and illustrates each scene, times
/// subtitles against the narration and composes the final video.
#[derive(Parser, Debug)]
#[command(name = "talecast")]
#[command(version)]
#[command(about = "Narrated, subtitled story videos from text")]
#[command(long_about = "Talecast turns a plain-text story or a storyboard into a narrated video with subtitles.

EXAMPLES:
    talecast generate story.md                        # Full run in a temporary directory
    talecast generate -w work/ story.md               # Resumable run in work/
    talecast generate -w work/ --force subtitle story.md
    talecast generate -y --skip illustrate story.txt  # No confirmation, no images
    talecast generate --voice alloy --speed 1.2 story.md
    talecast generate --profile bedtime-stories story.md
    talecast scenes story.md                          # Show the scene split
    talecast subtitles -o story.srt story.txt         # Subtitles from estimated timing
    talecast status -w work/ story.md                 # Show stage states
    talecast completions bash > talecast.bash         # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color and marker for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("1;31", "✗"),
            Level::Warn => ("1;33", "!"),
            Level::Info => ("1;32", " "),
            Level::Debug => ("1;36", "·"),
            Level::Trace => ("1;35", "…"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (color, marker) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, marker, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the effective level is set below
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "talecast", &mut std::io::stdout());
        return Ok(());
    }

    let overrides = match &cli.command {
        Commands::Generate(args) => args.generation_overrides()?,
        _ => GenerationOverrides::default(),
    };
    let config = load_config(&cli.config_path, cli.log_level.clone(), &overrides)?;
    log::set_max_level(config.log_level.to_level_filter());
    let controller = Controller::with_config(config)?;

    match cli.command {
        Commands::Generate(args) => run_generate(&controller, args).await,
        Commands::Scenes { input_path, format, json } => {
            let split = controller.split_scenes(&input_path, format.map(Into::into))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&split)?);
            } else {
                if let Some(title) = &split.title {
                    println!("# {}", title);
                }
                for scene in &split.scenes {
                    println!("[{}] {}", scene.index, scene.narration_text);
                    if let Some(visual) = &scene.visual_directive {
                        println!("    visual: {}", visual);
                    }
                }
            }
            Ok(())
        }
        Commands::Subtitles { input_path, output, format } => {
            let output = output.unwrap_or_else(|| talecast::file_utils::FileManager::generate_output_path(&input_path, None, "srt"));
            controller.write_estimated_subtitles(&input_path, format.map(Into::into), &output)?;
            info!("Success: {}", output.display());
            Ok(())
        }
        Commands::Status { input_path, work_dir, format } => {
            let plan = controller.status(&input_path, &work_dir, format.map(Into::into))?;
            for (stage, state) in &plan.stages {
                println!("{:<11} {}", stage, state);
            }
            for scene in &plan.scenes {
                println!(
                    "  scene {:03}  narration {:<7}  illustration {}",
                    scene.scene_index, scene.narration, scene.illustration
                );
            }
            for orphan in &plan.orphans {
                println!("orphaned   {}", orphan.display());
            }
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

/// Load conf.json, creating it with defaults when missing
fn load_config(config_path: &str, log_level: Option<CliLogLevel>, overrides: &GenerationOverrides) -> Result<Config> {
    let mut config = Config::load_or_create(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    // Update log level in config if specified via command line
    if let Some(log_level) = log_level {
        config.log_level = log_level.into();
    }

    if !overrides.is_empty() {
        debug!("Generation overrides: {:?}", overrides);
        overrides.apply(&mut config);
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn run_generate(controller: &Controller, args: GenerateArgs) -> Result<()> {
    let request = GenerateRequest {
        input: args.input_path,
        work_dir: args.work_dir,
        output: args.output,
        format: args.format.map(Into::into),
        force: args.force,
        skip: args.skip,
        assume_yes: args.yes,
        keep_intermediates: args.keep_intermediates,
    };

    match controller.generate(&request).await? {
        RunOutcome::Completed(report) => {
            info!(
                "{} stage(s) executed, {} external call(s)",
                report.stages.iter().filter(|s| s.executed).count(),
                report.external_calls()
            );
            Ok(())
        }
        RunOutcome::Cancelled { stage, .. } => {
            warn!("Nothing was spent on stage {}", stage);
            Ok(())
        }
    }
}
