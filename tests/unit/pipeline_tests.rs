/*!
 * Tests for pipeline building blocks: stages, fingerprints, the manifest
 * and cost estimates
 */

use anyhow::Result;
use std::collections::BTreeMap;
use std::time::Duration;

use talecast::app_config::PipelineSettings;
use talecast::errors::ProviderError;
use talecast::pipeline::{
    AudioRecord, CostEstimate, RetryPolicy, RunManifest, Stage, StageState, WorkDir, fingerprint,
};

use crate::common;

#[test]
fn test_stage_fromStr_shouldAcceptNamesCaseInsensitively() {
    assert_eq!("Narrate".parse::<Stage>(), Ok(Stage::Narrate));
    assert_eq!(" compose ".parse::<Stage>(), Ok(Stage::Compose));
    assert!("render".parse::<Stage>().unwrap_err().contains("unknown stage"));
}

#[test]
fn test_stage_flags_shouldMarkPaidAndSkippableStages() {
    let paid: Vec<Stage> = Stage::ALL.into_iter().filter(Stage::is_paid).collect();
    let skippable: Vec<Stage> = Stage::ALL.into_iter().filter(Stage::is_skippable).collect();

    assert_eq!(paid, vec![Stage::Narrate, Stage::Illustrate]);
    assert_eq!(skippable, vec![Stage::Illustrate, Stage::Compose]);
}

#[test]
fn test_stageState_classify_shouldCompareFingerprintAndFile() {
    assert_eq!(StageState::classify(None, "a", true), StageState::Missing);
    assert_eq!(StageState::classify(Some("a"), "a", false), StageState::Missing);
    assert_eq!(StageState::classify(Some("a"), "a", true), StageState::Fresh);
    assert_eq!(StageState::classify(Some("b"), "a", true), StageState::Stale);
}

#[test]
fn test_stageState_aggregate_shouldReturnWorstState() {
    let states = [StageState::Fresh, StageState::Stale, StageState::Fresh];
    assert_eq!(StageState::aggregate(states), StageState::Stale);
    assert_eq!(StageState::aggregate([StageState::Fresh; 3]), StageState::Fresh);
}

#[test]
fn test_fingerprint_shouldSeparateParts() {
    let joined = fingerprint(["ab", "c"]);
    let split = fingerprint(["a", "bc"]);

    assert_ne!(joined, split);
    assert_eq!(joined, fingerprint(vec!["ab".to_string(), "c".to_string()]));
    assert_eq!(joined.len(), 64);
}

#[test]
fn test_manifest_retainScenes_shouldDropTrailingRecords() {
    let mut manifest = RunManifest::new();
    let mut narration = BTreeMap::new();
    for index in 0..4 {
        narration.insert(
            index,
            AudioRecord {
                fingerprint: format!("fp{}", index),
                file: WorkDir::scene_file_name(index, "mp3"),
                duration_secs: 1.5,
            },
        );
    }
    manifest.narration = narration;

    manifest.retain_scenes(2);

    assert_eq!(manifest.narration.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn test_manifest_saveAndLoad_shouldRoundTripDurations() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("manifest.json");
    let mut manifest = RunManifest::new();
    manifest.narration.insert(
        0,
        AudioRecord {
            fingerprint: "abc".to_string(),
            file: "scene_000.mp3".to_string(),
            duration_secs: 1.7142857142857142,
        },
    );

    manifest.save(&path)?;
    let loaded = RunManifest::load(&path)?;

    assert_eq!(loaded.run_id, manifest.run_id);
    assert_eq!(loaded.narration[&0].duration_secs, 1.7142857142857142);
    Ok(())
}

#[test]
fn test_retryPolicy_fromSettings_shouldCapBackoff() {
    let settings = PipelineSettings {
        retry_backoff_ms: 1000,
        max_backoff_ms: 3000,
        ..PipelineSettings::default()
    };

    let policy = RetryPolicy::from_settings(&settings);

    assert_eq!(policy.delay_for_retry(1), Duration::from_secs(1));
    assert_eq!(policy.delay_for_retry(2), Duration::from_secs(2));
    assert_eq!(policy.delay_for_retry(3), Duration::from_secs(3));
    assert!((policy.is_transient)(&ProviderError::ConnectionError("reset".into())));
    assert!(!(policy.is_transient)(&ProviderError::AuthenticationError("key".into())));
}

#[test]
fn test_costEstimate_withoutUnitCost_shouldOmitTotal() {
    let estimate = CostEstimate {
        stage: Stage::Narrate,
        pending_calls: 2,
        total_scenes: 4,
        unit_cost: None,
    };

    assert_eq!(estimate.total_cost(), None);
    assert_eq!(estimate.to_string(), "narrate: 2 of 4 scene(s) need an external call");
}
