/*!
 * Integration tests for pipeline runs: idempotence, resumption, the
 * confirmation gate and stage selection
 */

use anyhow::Result;
use std::fs;
use std::sync::Arc;

use talecast::errors::PipelineError;
use talecast::pipeline::{AutoApprove, Orchestrator, RetryPolicy, RunOptions, RunOutcome, Stage, StageState, WorkDir};
use talecast::providers::mock::{MockBehavior, MockCollaborator};
use talecast::scene::ReadingDictionary;

use crate::common::{self, ENGLISH_THREE_PARAGRAPHS, JAPANESE_TWO_SENTENCES, RecordingGate};

fn completed(outcome: RunOutcome) -> talecast::pipeline::RunReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::Cancelled { stage, .. } => panic!("run was cancelled at {}", stage),
    }
}

#[tokio::test]
async fn test_run_withCompleteWorkDir_shouldMakeNoCallsAndKeepSubtitlesIdentical() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working().with_audio_duration(4.0);
    let images = MockCollaborator::working();
    let composer = MockCollaborator::working();

    let first = completed(
        common::orchestrator(dir.path(), &speech, &images)
            .with_composer(Arc::new(composer.clone()))
            .run(JAPANESE_TWO_SENTENCES, &RunOptions::default())
            .await?,
    );
    let subtitles_after_first = fs::read(&first.subtitles_path)?;
    assert_eq!(speech.call_count(), 2);
    assert_eq!(images.call_count(), 2);
    assert_eq!(composer.call_count(), 1);
    assert!(first.video_path.as_ref().is_some_and(|p| p.exists()));

    let second = completed(
        common::orchestrator(dir.path(), &speech, &images)
            .with_composer(Arc::new(composer.clone()))
            .run(JAPANESE_TWO_SENTENCES, &RunOptions::default())
            .await?,
    );

    assert_eq!(second.external_calls(), 0);
    assert_eq!(speech.call_count(), 2);
    assert_eq!(images.call_count(), 2);
    assert_eq!(composer.call_count(), 1);
    assert!(second.stages.iter().all(|s| !s.executed));
    assert_eq!(fs::read(&second.subtitles_path)?, subtitles_after_first);
    Ok(())
}

#[tokio::test]
async fn test_run_afterPermanentSceneFailure_shouldRegenerateOnlyThatScene() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let mut speech = MockCollaborator::new(MockBehavior::FailOnScenes {
        scenes: vec![1],
        transient: false,
    })
    .with_audio_duration(2.0);
    let images = MockCollaborator::working();

    let error = common::orchestrator(dir.path(), &speech, &images)
        .run(ENGLISH_THREE_PARAGRAPHS, &RunOptions::default())
        .await
        .unwrap_err();

    match &error {
        PipelineError::StageFailed {
            stage,
            failures,
            completed_scenes,
            artifacts_preserved,
        } => {
            assert_eq!(*stage, Stage::Narrate);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].scene_index, 1);
            assert_eq!(failures[0].attempts, 1);
            assert_eq!(completed_scenes, &vec![0, 2]);
            assert!(artifacts_preserved);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(error.to_string().contains("scene 1"));
    assert_eq!(speech.call_count(), 3);
    assert_eq!(images.call_count(), 0);

    speech.set_behavior(MockBehavior::Working);
    let gate = Arc::new(RecordingGate::approving());
    let report = completed(
        common::orchestrator(dir.path(), &speech, &images)
            .with_gate(gate.clone())
            .run(ENGLISH_THREE_PARAGRAPHS, &RunOptions::default())
            .await?,
    );

    assert_eq!(speech.calls_for_scene(0), 1);
    assert_eq!(speech.calls_for_scene(1), 2);
    assert_eq!(speech.calls_for_scene(2), 1);
    assert_eq!(report.stage(Stage::Narrate).map(|s| s.external_calls), Some(1));
    let asked = gate.asked();
    assert_eq!(asked[0].stage, Stage::Narrate);
    assert_eq!(asked[0].pending_calls, 1);
    assert_eq!(asked[0].total_scenes, 3);
    Ok(())
}

#[tokio::test]
async fn test_run_withTransientFailures_shouldRetryUntilSuccess() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::new(MockBehavior::TransientThenOk { failures: 2 }).with_audio_duration(2.0);
    let images = MockCollaborator::working();

    let report = completed(
        common::orchestrator(dir.path(), &speech, &images)
            .run(ENGLISH_THREE_PARAGRAPHS, &RunOptions::default())
            .await?,
    );

    assert_eq!(speech.call_count(), 9);
    assert_eq!(report.stage(Stage::Narrate).map(|s| s.external_calls), Some(9));
    assert_eq!(report.audio.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_run_withPersistentOutage_shouldStopAtMaxAttempts() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::new(MockBehavior::FailOnScenes {
        scenes: vec![0],
        transient: true,
    });
    let images = MockCollaborator::working();

    let error = common::orchestrator(dir.path(), &speech, &images)
        .run(JAPANESE_TWO_SENTENCES, &RunOptions::default())
        .await
        .unwrap_err();

    match error {
        PipelineError::StageFailed { failures, .. } => {
            assert_eq!(failures[0].attempts, 3);
            assert!(failures[0].retries_exhausted());
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(speech.calls_for_scene(0), 3);
    assert_eq!(speech.calls_for_scene(1), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_withDecliningGate_shouldCancelBeforeAnyCall() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working();
    let images = MockCollaborator::working();
    let gate = Arc::new(RecordingGate::declining());

    let outcome = common::orchestrator(dir.path(), &speech, &images)
        .with_gate(gate.clone())
        .run(JAPANESE_TWO_SENTENCES, &RunOptions::default())
        .await?;

    assert!(outcome.is_cancelled());
    assert!(matches!(outcome, RunOutcome::Cancelled { stage: Stage::Narrate, .. }));
    assert_eq!(speech.call_count(), 0);
    assert_eq!(gate.asked().len(), 1);
    assert_eq!(gate.asked()[0].pending_calls, 2);
    assert!(dir.path().join("scenes.json").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_withPreAuthorization_shouldNotAskGate() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working();
    let images = MockCollaborator::working();
    let gate = Arc::new(RecordingGate::declining());

    let outcome = common::orchestrator(dir.path(), &speech, &images)
        .with_gate(gate.clone())
        .run(JAPANESE_TWO_SENTENCES, &RunOptions::pre_authorized())
        .await?;

    assert!(!outcome.is_cancelled());
    assert!(gate.asked().is_empty());
    assert_eq!(speech.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_run_withDefaultGate_shouldDecline() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working();
    let images = MockCollaborator::working();
    let orchestrator = Orchestrator::new(
        common::test_config(),
        WorkDir::open(dir.path())?,
        Arc::new(speech.clone()),
        Arc::new(images.clone()),
    )?;

    let outcome = orchestrator.run(JAPANESE_TWO_SENTENCES, &RunOptions::default()).await?;

    assert!(outcome.is_cancelled());
    assert_eq!(speech.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_withForcedSubtitles_shouldRewriteWithoutCalls() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working().with_audio_duration(3.0);
    let images = MockCollaborator::working();
    let first = completed(
        common::orchestrator(dir.path(), &speech, &images)
            .run(ENGLISH_THREE_PARAGRAPHS, &RunOptions::default())
            .await?,
    );
    let original = fs::read(&first.subtitles_path)?;

    let report = completed(
        common::orchestrator(dir.path(), &speech, &images)
            .run(ENGLISH_THREE_PARAGRAPHS, &RunOptions::default().force(Stage::Subtitle))
            .await?,
    );

    assert_eq!(report.stage(Stage::Subtitle).map(|s| s.executed), Some(true));
    assert_eq!(report.stage(Stage::Narrate).map(|s| s.executed), Some(false));
    assert_eq!(report.external_calls(), 0);
    assert_eq!(fs::read(&report.subtitles_path)?, original);
    Ok(())
}

#[tokio::test]
async fn test_run_withSkippedIllustration_shouldStillWriteSubtitles() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working();
    let images = MockCollaborator::working();
    let composer = MockCollaborator::working();

    let report = completed(
        common::orchestrator(dir.path(), &speech, &images)
            .with_composer(Arc::new(composer.clone()))
            .run(JAPANESE_TWO_SENTENCES, &RunOptions::default().skip(Stage::Illustrate))
            .await?,
    );

    assert_eq!(images.call_count(), 0);
    assert_eq!(composer.call_count(), 0);
    assert!(report.stage(Stage::Illustrate).is_none());
    assert!(report.video_path.is_none());
    assert!(report.subtitles_path.exists());
    assert!(report.subtitle_count >= 2);
    Ok(())
}

#[tokio::test]
async fn test_run_withUnskippableStage_shouldRejectOptions() {
    let dir = common::create_temp_dir().unwrap();
    let speech = MockCollaborator::working();
    let images = MockCollaborator::working();

    let result = common::orchestrator(dir.path(), &speech, &images)
        .run(JAPANESE_TWO_SENTENCES, &RunOptions::default().skip(Stage::Narrate))
        .await;

    assert!(matches!(result, Err(PipelineError::Config(_))));
    assert_eq!(speech.call_count(), 0);
}

#[tokio::test]
async fn test_run_withEnforcedMaxDuration_shouldFailBeforeNarration() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working();
    let images = MockCollaborator::working();
    let mut config = common::test_config();
    config.video.max_duration_secs = 1.0;
    config.video.enforce_max_duration = true;
    let orchestrator = Orchestrator::new(
        config,
        WorkDir::open(dir.path())?,
        Arc::new(speech.clone()),
        Arc::new(images.clone()),
    )?
    .with_gate(Arc::new(AutoApprove));

    let result = orchestrator.run(ENGLISH_THREE_PARAGRAPHS, &RunOptions::default()).await;

    assert!(matches!(result, Err(PipelineError::DurationExceeded { .. })));
    assert_eq!(speech.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_withChangedVoice_shouldRegenerateNarrationOnly() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working().with_audio_duration(2.0);
    let images = MockCollaborator::working();
    common::orchestrator(dir.path(), &speech, &images)
        .run(JAPANESE_TWO_SENTENCES, &RunOptions::default())
        .await?;

    let mut config = common::test_config();
    config.tts.voice = "alloy".to_string();
    let orchestrator = Orchestrator::new(
        config,
        WorkDir::open(dir.path())?,
        Arc::new(speech.clone()),
        Arc::new(images.clone()),
    )?
    .with_gate(Arc::new(AutoApprove))
    .with_retry_policy(RetryPolicy::immediate(1));

    let plan = orchestrator.plan(JAPANESE_TWO_SENTENCES, &RunOptions::default())?;
    assert_eq!(plan.state(Stage::Split), Some(StageState::Fresh));
    assert_eq!(plan.state(Stage::Narrate), Some(StageState::Stale));
    assert_eq!(plan.state(Stage::Illustrate), Some(StageState::Fresh));

    orchestrator.run(JAPANESE_TWO_SENTENCES, &RunOptions::default()).await?;

    assert_eq!(speech.call_count(), 4);
    assert_eq!(images.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_plan_afterSceneCountShrinks_shouldReportOrphans() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working().with_audio_duration(2.0);
    let images = MockCollaborator::working();
    let orchestrator = common::orchestrator(dir.path(), &speech, &images);
    orchestrator.run(ENGLISH_THREE_PARAGRAPHS, &RunOptions::default()).await?;

    let shorter = "The lighthouse keeper woke before dawn.\n\nHe climbed the long spiral stairs to the lamp.";
    let report = completed(orchestrator.run(shorter, &RunOptions::default()).await?);
    let plan = orchestrator.plan(shorter, &RunOptions::default())?;

    assert_eq!(report.scenes.len(), 2);
    assert_eq!(speech.call_count(), 3);
    assert_eq!(images.call_count(), 3);
    assert_eq!(
        plan.orphans,
        vec![dir.path().join("scene_002.mp3"), dir.path().join("scene_002.png")]
    );
    Ok(())
}

#[tokio::test]
async fn test_plan_onEmptyWorkDir_shouldReportEverythingMissing() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working();
    let images = MockCollaborator::working();
    let orchestrator = common::orchestrator(dir.path(), &speech, &images);

    let plan = orchestrator.plan(JAPANESE_TWO_SENTENCES, &RunOptions::default())?;

    assert!(plan.stages.iter().all(|(_, state)| *state == StageState::Missing));
    assert_eq!(plan.scenes.len(), 2);
    assert!(plan.orphans.is_empty());
    assert_eq!(speech.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_withCorruptManifest_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    common::create_test_file(dir.path(), "manifest.json", "{ not json")?;
    let speech = MockCollaborator::working();
    let images = MockCollaborator::working();

    let result = common::orchestrator(dir.path(), &speech, &images)
        .run(JAPANESE_TWO_SENTENCES, &RunOptions::default())
        .await;

    assert!(matches!(result, Err(PipelineError::Manifest(_))));
    assert_eq!(speech.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_withReadings_shouldChangeSpeechTextOnly() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working().with_audio_duration(3.0);
    let images = MockCollaborator::working();
    let readings = ReadingDictionary::from_entries(vec![("二番目".to_string(), "にばんめ".to_string())]);

    let report = completed(
        common::orchestrator(dir.path(), &speech, &images)
            .with_readings(readings)
            .run(JAPANESE_TWO_SENTENCES, &RunOptions::default())
            .await?,
    );

    let spoken = fs::read_to_string(&report.audio[1].path)?;
    let subtitles = fs::read_to_string(&report.subtitles_path)?;
    assert!(spoken.contains("これはにばんめの文です。"));
    assert!(subtitles.contains("これは二番目の文です。"));
    assert!(!subtitles.contains("にばんめ"));
    Ok(())
}

#[tokio::test]
async fn test_run_withFailingComposer_shouldReportComposition() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working();
    let images = MockCollaborator::working();

    let result = common::orchestrator(dir.path(), &speech, &images)
        .with_composer(Arc::new(MockCollaborator::failing()))
        .run(JAPANESE_TWO_SENTENCES, &RunOptions::default())
        .await;

    match result {
        Err(PipelineError::CompositionFailed { attempts, .. }) => assert_eq!(attempts, 1),
        other => panic!("unexpected result: {:?}", other.map(|o| o.is_cancelled())),
    }
    assert!(dir.path().join("subtitles.srt").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_withSlowCollaborators_shouldNeverExceedConcurrencyLimit() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::slow(20).with_audio_duration(3.0);
    let images = MockCollaborator::slow(20);
    let mut config = common::test_config();
    config.pipeline.concurrent_requests = 2;
    config.video.max_scenes = 0;
    let story = (1..=6)
        .map(|i| format!("Scene number {} begins here.", i))
        .collect::<Vec<_>>()
        .join("\n\n");

    let report = completed(
        Orchestrator::new(config, WorkDir::open(dir.path())?, Arc::new(speech.clone()), Arc::new(images.clone()))?
            .with_gate(Arc::new(AutoApprove))
            .with_retry_policy(RetryPolicy::immediate(3))
            .run(&story, &RunOptions::default())
            .await?,
    );

    assert_eq!(report.scenes.len(), 6);
    assert_eq!(speech.call_count(), 6);
    assert_eq!(speech.peak_in_flight(), 2);
    assert_eq!(images.peak_in_flight(), 2);
    Ok(())
}

#[tokio::test]
async fn test_run_withUnitCosts_shouldAskOnlyForPaidStagesWithTheirPrices() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let speech = MockCollaborator::working().with_audio_duration(2.0);
    let images = MockCollaborator::working();
    let composer = MockCollaborator::working();
    let gate = Arc::new(RecordingGate::approving());
    let mut config = common::test_config();
    config.pipeline.tts_unit_cost = Some(0.015);
    config.pipeline.image_unit_cost = Some(0.04);

    let report = completed(
        Orchestrator::new(config, WorkDir::open(dir.path())?, Arc::new(speech.clone()), Arc::new(images.clone()))?
            .with_composer(Arc::new(composer.clone()))
            .with_gate(gate.clone())
            .with_retry_policy(RetryPolicy::immediate(3))
            .run(JAPANESE_TWO_SENTENCES, &RunOptions::default())
            .await?,
    );

    let asked = gate.asked();
    let stages: Vec<Stage> = asked.iter().map(|e| e.stage).collect();
    assert_eq!(stages, vec![Stage::Narrate, Stage::Illustrate]);
    assert_eq!(asked[0].unit_cost, Some(0.015));
    assert_eq!(asked[1].unit_cost, Some(0.04));
    assert!(report.video_path.is_some());
    Ok(())
}
