use dialoguer::Confirm;
use log::{info, warn};
use std::fmt;

use super::Stage;

/// What a paid stage is about to spend
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    pub stage: Stage,
    /// External calls the stage will make
    pub pending_calls: usize,
    /// Scenes in the run
    pub total_scenes: usize,
    /// Price of one call, when configured
    pub unit_cost: Option<f64>,
}

impl CostEstimate {
    pub fn total_cost(&self) -> Option<f64> {
        self.unit_cost.map(|unit| unit * self.pending_calls as f64)
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} of {} scene(s) need an external call",
            self.stage, self.pending_calls, self.total_scenes
        )?;
        if let Some(total) = self.total_cost() {
            write!(f, " (estimated cost {:.2})", total)?;
        }
        Ok(())
    }
}

/// Decides whether a paid stage may proceed
pub trait ConfirmationGate: Send + Sync + fmt::Debug {
    fn confirm(&self, estimate: &CostEstimate) -> bool;
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ConfirmationGate for AutoApprove {
    fn confirm(&self, estimate: &CostEstimate) -> bool {
        info!("Auto-approved {}", estimate);
        true
    }
}

/// Declines everything; the default when no gate is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecline;

impl ConfirmationGate for AutoDecline {
    fn confirm(&self, estimate: &CostEstimate) -> bool {
        warn!("Declined {} (no confirmation gate configured)", estimate);
        false
    }
}

/// Asks on the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl ConfirmationGate for TerminalPrompt {
    fn confirm(&self, estimate: &CostEstimate) -> bool {
        let prompt = format!("{}. Continue?", estimate);
        match Confirm::new().with_prompt(prompt).default(false).interact() {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Could not read confirmation ({}), treating as declined", e);
                false
            }
        }
    }
}
