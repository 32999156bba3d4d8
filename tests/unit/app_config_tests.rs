/*!
 * Tests for configuration defaults, validation and persistence
 */

use anyhow::Result;
use talecast::app_config::{Config, LogLevel};

use crate::common;

#[test]
fn test_default_shouldMatchDocumentedValues() {
    let config = Config::default();

    assert_eq!(config.subtitle.max_cjk_chars, 22);
    assert_eq!(config.subtitle.max_words_per_fragment, 6);
    assert_eq!(config.subtitle.min_display_secs, 1.0);
    assert_eq!(config.subtitle.cjk_threshold, 0.2);
    assert_eq!(config.reading.cjk_chars_per_minute, 350.0);
    assert_eq!(config.reading.words_per_minute, 150.0);
    assert_eq!(config.video.max_scenes, 6);
    assert_eq!(config.pipeline.retry_count, 3);
    assert_eq!(config.pipeline.concurrent_requests, 4);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_withOutOfRangeSpeed_shouldNameField() {
    let mut config = Config::default();
    config.tts.speed = 5.0;

    let error = config.validate().unwrap_err();

    assert_eq!(error.field, "tts.speed");
}

#[test]
fn test_validate_withUnknownImageQuality_shouldFail() {
    let mut config = Config::default();
    config.image.quality = "ultra".to_string();

    assert_eq!(config.validate().unwrap_err().field, "image.quality");
}

#[test]
fn test_validate_withZeroConcurrency_shouldFail() {
    let mut config = Config::default();
    config.pipeline.concurrent_requests = 0;

    assert!(config.validate().is_err());
}

#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");

    let created = Config::load_or_create(&path)?;
    let loaded = Config::load_or_create(&path)?;

    assert!(path.exists());
    assert_eq!(created.tts.voice, loaded.tts.voice);
    assert_eq!(loaded.video.max_duration_secs, 90.0);
    Ok(())
}

#[test]
fn test_loadOrCreate_withPartialFile_shouldFillDefaults() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        dir.path(),
        "conf.json",
        r#"{ "subtitle": { "max_cjk_chars": 18 }, "log_level": "debug" }"#,
    )?;

    let config = Config::load_or_create(&path)?;

    assert_eq!(config.subtitle.max_cjk_chars, 18);
    assert_eq!(config.subtitle.max_words_per_fragment, 6);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.tts.speed, 1.0);
    Ok(())
}
