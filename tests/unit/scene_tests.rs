/*!
 * Tests for scene splitting, image prompts and readings
 */

use anyhow::Result;
use talecast::errors::FormatError;
use talecast::scene::plain_text::split_plain_text;
use talecast::scene::{ImagePromptBuilder, InputFormat, ReadingDictionary, Scene, SceneSplitter};

use crate::common::{self, ENGLISH_THREE_PARAGRAPHS};

#[test]
fn test_split_withParagraphs_shouldUseOneScenePerParagraph() {
    let result = SceneSplitter::new(6).split(ENGLISH_THREE_PARAGRAPHS, None).unwrap();

    assert_eq!(result.format, InputFormat::PlainText);
    assert_eq!(result.scenes.len(), 3);
    assert_eq!(result.scenes[2].narration_text, "By sunrise the fog had finally lifted.");
    assert!(result.scenes.iter().all(|s| s.visual_directive.is_none()));
}

#[test]
fn test_splitPlainText_withMoreSentencesThanCap_shouldGroupContiguously() {
    let text = "一。二。三。四。五。六。七。八。";

    let scenes = split_plain_text(text, 3);

    assert_eq!(scenes.len(), 3);
    assert_eq!(scenes.concat(), text);
}

#[test]
fn test_splitPlainText_withZeroCap_shouldNotGroup() {
    let scenes = split_plain_text("一。二。三。四。", 0);
    assert_eq!(scenes.len(), 4);
}

#[test]
fn test_split_withStoryboardMissingNarration_shouldNameScene() {
    let text = "## シーン1\n**ナレーション**: 一つ目。\n\n## シーン2\n**映像**: 空だけ\n";

    let error = SceneSplitter::new(6).split(text, None).unwrap_err();

    assert_eq!(error, FormatError::MissingNarration { scene_number: 2 });
    assert!(error.to_string().contains("scene 2"));
}

#[test]
fn test_split_withEnglishStoryboardLabels_shouldParse() {
    let text = "## Scene 1\n**Narration:** The harbor was quiet.\n**Visual:** Empty docks at dawn\n";

    let result = SceneSplitter::new(6).split(text, None).unwrap();

    assert_eq!(result.scenes.len(), 1);
    assert_eq!(result.scenes[0].narration_text, "The harbor was quiet.");
    assert_eq!(result.scenes[0].visual_directive.as_deref(), Some("Empty docks at dawn"));
}

#[test]
fn test_promptBuilder_withoutDirective_shouldUseNarration() {
    let builder = ImagePromptBuilder::new("Watercolor. ");
    let scene = Scene {
        index: 0,
        narration_text: "猫が屋根の上で眠っていました。".to_string(),
        visual_directive: None,
    };

    let prompt = builder.build(&scene);

    assert!(prompt.starts_with("Watercolor. "));
    assert!(prompt.contains("猫が屋根の上で眠っていました。"));
}

#[test]
fn test_readings_fromYaml_shouldFlattenCategoriesAndPreferLongest() -> Result<()> {
    let readings = ReadingDictionary::from_yaml_str(
        "places:\n  東京: とうきょう\n  東京湾: とうきょうわん\npeople:\n  太郎: たろう\n",
    )?;

    assert_eq!(readings.len(), 3);
    assert_eq!(readings.apply("太郎は東京湾を見た"), "たろうはとうきょうわんを見た");
    Ok(())
}

#[test]
fn test_readings_load_withMissingFile_shouldBeEmpty() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let readings = ReadingDictionary::load(dir.path().join("readings.yml"))?;
    assert!(readings.is_empty());
    Ok(())
}
