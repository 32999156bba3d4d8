/*!
 * Integration tests for the application controller
 */

use anyhow::Result;

use talecast::app_controller::{Controller, GenerateRequest};
use talecast::pipeline::{RunOutcome, Stage, StageState};
use talecast::profile::{GenerationOverrides, Profile};
use talecast::scene::InputFormat;

use crate::common::{self, JAPANESE_TWO_SENTENCES, STORYBOARD};

#[tokio::test]
async fn test_generate_withWorkDir_shouldProduceVideoAndResume() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "story.md", STORYBOARD)?;
    let controller = Controller::with_config(common::test_config())?;
    let request = GenerateRequest {
        input: input.clone(),
        work_dir: Some(dir.path().join("work")),
        output: Some(dir.path().join("story.mp4")),
        assume_yes: true,
        ..GenerateRequest::default()
    };

    let first = controller.generate(&request).await?;
    let second = controller.generate(&request).await?;

    let RunOutcome::Completed(first) = first else {
        panic!("first run was cancelled");
    };
    let RunOutcome::Completed(second) = second else {
        panic!("second run was cancelled");
    };
    assert_eq!(first.title.as_deref(), Some("港の朝"));
    assert!(dir.path().join("story.mp4").exists());
    assert!(dir.path().join("work").join("manifest.json").exists());
    assert!(first.external_calls() > 0);
    assert_eq!(second.external_calls(), 0);
    Ok(())
}

#[test]
fn test_generate_withoutWorkDir_shouldDiscardIntermediates() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "story.txt", JAPANESE_TWO_SENTENCES)?;
    let controller = Controller::with_config(common::test_config())?;
    let request = GenerateRequest {
        input,
        assume_yes: true,
        skip: vec![Stage::Illustrate],
        ..GenerateRequest::default()
    };

    let outcome = tokio_test::block_on(controller.generate(&request))?;

    let report = outcome.report().expect("run should complete");
    assert_eq!(report.scenes.len(), 2);
    assert!(!report.subtitles_path.exists());
    assert!(!dir.path().join("story.talecast").exists());
    Ok(())
}

#[tokio::test]
async fn test_generate_withKeepIntermediates_shouldUseDirectoryNextToInput() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "story.txt", JAPANESE_TWO_SENTENCES)?;
    let controller = Controller::with_config(common::test_config())?;
    let request = GenerateRequest {
        input,
        assume_yes: true,
        keep_intermediates: true,
        ..GenerateRequest::default()
    };

    controller.generate(&request).await?;

    let work = dir.path().join("story.talecast");
    assert!(work.join("subtitles.srt").exists());
    assert!(work.join("scene_000.mp3").exists());
    assert!(dir.path().join("story.mp4").exists());
    Ok(())
}

#[tokio::test]
async fn test_status_afterGenerate_shouldReportFreshStages() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "story.md", STORYBOARD)?;
    let work = dir.path().join("work");
    let controller = Controller::with_config(common::test_config())?;
    let request = GenerateRequest {
        input: input.clone(),
        work_dir: Some(work.clone()),
        output: Some(work.join("output.mp4")),
        assume_yes: true,
        ..GenerateRequest::default()
    };
    controller.generate(&request).await?;

    let plan = controller.status(&input, &work, None)?;

    assert!(plan.stages.iter().all(|(_, state)| !state.needs_run()), "{:?}", plan.stages);
    Ok(())
}

#[tokio::test]
async fn test_status_afterVoiceOverride_shouldStaleNarrationOnly() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "story.md", STORYBOARD)?;
    let work = dir.path().join("work");
    let request = GenerateRequest {
        input: input.clone(),
        work_dir: Some(work.clone()),
        output: Some(work.join("output.mp4")),
        assume_yes: true,
        ..GenerateRequest::default()
    };
    Controller::with_config(common::test_config())?.generate(&request).await?;

    let mut config = common::test_config();
    GenerationOverrides {
        voice: Some("alloy".to_string()),
        ..GenerationOverrides::default()
    }
    .apply(&mut config);
    config.validate()?;
    let plan = Controller::with_config(config)?.status(&input, &work, None)?;

    assert_eq!(plan.state(Stage::Split), Some(StageState::Fresh));
    assert_eq!(plan.state(Stage::Narrate), Some(StageState::Stale));
    assert_eq!(plan.state(Stage::Illustrate), Some(StageState::Fresh));
    assert!(plan.scenes.iter().all(|s| s.narration == StageState::Stale && s.illustration == StageState::Fresh));
    Ok(())
}

#[test]
fn test_overrides_withProfileVoiceAndFlagSpeed_shouldApplyBoth() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let profiles = dir.path().join("profiles");
    std::fs::create_dir_all(&profiles)?;
    common::create_test_file(
        &profiles,
        "evening.yml",
        "name: evening\ngeneration:\n  voice: shimmer\n  speed: 0.8\n  image_quality: high\n",
    )?;
    let profile = Profile::load_from(&profiles, "evening")?;
    let flags = GenerationOverrides {
        speed: Some(1.25),
        ..GenerationOverrides::default()
    };

    let mut config = common::test_config();
    flags.with_profile_defaults(&profile.generation).apply(&mut config);
    config.validate()?;

    assert_eq!(config.tts.voice, "shimmer");
    assert_eq!(config.tts.speed, 1.25);
    assert_eq!(config.image.quality, "high");
    Ok(())
}

#[test]
fn test_splitScenes_withForcedPlainText_shouldIgnoreHeadings() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "story.md", "First part.\n\nSecond part.")?;
    let controller = Controller::with_config(common::test_config())?;

    let split = controller.split_scenes(&input, Some(InputFormat::PlainText))?;

    assert_eq!(split.scenes.len(), 2);
    assert_eq!(split.format, InputFormat::PlainText);
    Ok(())
}
