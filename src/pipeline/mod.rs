/*!
 * Pipeline orchestration.
 *
 * - `stage`: stage names, artifact states and fingerprints
 * - `manifest`: the per-directory run manifest
 * - `workspace`: working directory layout
 * - `retry`: retry policy for external calls
 * - `confirmation`: gates in front of paid stages
 * - `orchestrator`: runs the stages in order
 */

pub mod confirmation;
pub mod manifest;
pub mod orchestrator;
pub mod retry;
pub mod stage;
pub mod workspace;

pub use confirmation::{AutoApprove, AutoDecline, ConfirmationGate, CostEstimate, TerminalPrompt};
pub use manifest::{ArtifactRecord, AudioRecord, RunManifest};
pub use orchestrator::{
    Orchestrator, PipelineProgress, ProgressCallback, RunOptions, RunOutcome, RunPlan, RunReport, ScenePlan,
    SkipReason, StageReport,
};
pub use retry::RetryPolicy;
pub use stage::{Stage, StageState, fingerprint};
pub use workspace::WorkDir;
