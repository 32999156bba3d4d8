/*!
 * Common test utilities for the talecast test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use talecast::app_config::Config;
use talecast::pipeline::{AutoApprove, ConfirmationGate, CostEstimate, Orchestrator, RetryPolicy, WorkDir};
use talecast::providers::mock::MockCollaborator;

/// Two Japanese sentences that split into two plain-text scenes
pub const JAPANESE_TWO_SENTENCES: &str = "これは最初の文です。これは二番目の文です。";

/// Storyboard with a title and two scenes, fields in different orders
pub const STORYBOARD: &str = "# 港の朝

## シーン1
**映像**: 朝焼けの港、漁船が並ぶ
**ナレーション**: 朝早く、漁師たちは港に集まりました。

## シーン2
**ナレーション**: 船はゆっくりと沖へ出ていきました。
**映像**: 穏やかな海を進む小さな船
";

/// Three English paragraphs, one scene each
pub const ENGLISH_THREE_PARAGRAPHS: &str = "The lighthouse keeper woke before dawn.

He climbed the long spiral stairs to the lamp.

By sunrise the fog had finally lifted.";

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Default configuration without retry delays
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.retry_backoff_ms = 0;
    config.pipeline.max_backoff_ms = 0;
    config
}

/// Gate that records every estimate it is asked about
#[derive(Debug, Default)]
pub struct RecordingGate {
    pub approve: bool,
    pub asked: parking_lot::Mutex<Vec<CostEstimate>>,
}

impl RecordingGate {
    pub fn approving() -> Self {
        Self {
            approve: true,
            ..Self::default()
        }
    }

    pub fn declining() -> Self {
        Self::default()
    }

    pub fn asked(&self) -> Vec<CostEstimate> {
        self.asked.lock().clone()
    }
}

impl ConfirmationGate for RecordingGate {
    fn confirm(&self, estimate: &CostEstimate) -> bool {
        self.asked.lock().push(estimate.clone());
        self.approve
    }
}

/// Orchestrator over `dir` with the given collaborators, approving everything
pub fn orchestrator(dir: &Path, speech: &MockCollaborator, images: &MockCollaborator) -> Orchestrator {
    Orchestrator::new(
        test_config(),
        WorkDir::open(dir).unwrap(),
        Arc::new(speech.clone()),
        Arc::new(images.clone()),
    )
    .unwrap()
    .with_gate(Arc::new(AutoApprove))
    .with_retry_policy(RetryPolicy::immediate(3))
}
