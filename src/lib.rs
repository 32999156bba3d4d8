/*!
 * # Talecast - narrated story videos from text
 *
 * Turns a story, either plain prose or a storyboard document, into a
 * narrated video: one narration clip and one illustration per scene, a
 * subtitle track timed against the real narration audio, and a final
 * composition.
 *
 * ## Features
 *
 * - Scene splitting for plain text and `## シーン` / `## Scene` storyboards
 * - CJK-aware subtitle chunking that respects Japanese line-break rules
 * - Proportional subtitle timing with a minimum display time
 * - SRT writing and reading
 * - Idempotent, resumable runs with fingerprinted artifacts
 * - Retry with exponential backoff and a confirmation gate for paid calls
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `profile`: Named generation profiles and per-run overrides
 * - `scene`: Scene splitting, image prompts and pronunciation readings
 * - `subtitle`: Fragment chunking and timing allocation
 * - `subtitle_processor`: SRT entries, writing and parsing
 * - `validation`: Subtitle timeline checks
 * - `pipeline`: Stage orchestration, run manifest, retry and confirmation
 * - `providers`: Speech, image and composition collaborator traits:
 *   - `providers::mock`: Offline implementations
 * - `file_utils`: File system operations
 * - `language_utils`: Script detection and duration estimates
 * - `app_controller`: Main application controller
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod pipeline;
pub mod profile;
pub mod providers;
pub mod scene;
pub mod subtitle;
pub mod subtitle_processor;
pub mod validation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{ConfigError, FormatError, PipelineError, ProviderError, SceneFailure, SubtitleError};
pub use language_utils::{estimate_duration, is_cjk_char, is_cjk_dominant};
pub use pipeline::{Orchestrator, RunOptions, RunOutcome, RunReport, Stage, StageState, WorkDir};
pub use profile::{GenerationOverrides, Profile};
pub use scene::{InputFormat, Scene, SceneSplitter, SplitResult};
pub use subtitle::{SubtitleChunker, SubtitleFragment, TimingAllocator};
pub use subtitle_processor::{SubtitleCollection, SubtitleEntry};
