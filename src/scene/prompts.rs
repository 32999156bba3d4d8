use super::Scene;
use crate::app_config::ImageConfig;

// @module: Image prompt construction

// @const: Suffix appended to every prompt
pub const NO_TEXT_SUFFIX: &str = "Do not include any text, words, or letters in the image.";

// @const: Narration characters used when no visual directive exists
const NARRATION_EXCERPT_CHARS: usize = 300;

// @struct: Builds image-generation prompts from scenes
#[derive(Debug, Clone)]
pub struct ImagePromptBuilder {
    style_prefix: String,
}

impl ImagePromptBuilder {
    pub fn new(style_prefix: impl Into<String>) -> Self {
        Self {
            style_prefix: style_prefix.into(),
        }
    }

    pub fn from_config(config: &ImageConfig) -> Self {
        Self::new(config.style_prefix.clone())
    }

    /// Prompt for one scene.
    ///
    /// Uses the visual directive when present, otherwise describes the
    /// scene from the start of its narration.
    pub fn build(&self, scene: &Scene) -> String {
        match scene.visual_directive.as_deref() {
            Some(visual) => format!("{}{} {}", self.style_prefix, visual, NO_TEXT_SUFFIX),
            None => {
                let excerpt: String = scene.narration_text.chars().take(NARRATION_EXCERPT_CHARS).collect();
                format!(
                    "{}{} Visual scene inspired by: {}",
                    self.style_prefix, NO_TEXT_SUFFIX, excerpt
                )
            }
        }
    }
}
