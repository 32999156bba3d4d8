/*!
 * Scene splitting.
 *
 * Turns raw input into an ordered list of [`Scene`]s. Two input shapes are
 * supported: plain prose, split on blank lines or sentence terminals, and
 * storyboard documents with scene headings and labeled fields.
 */

use log::debug;
use serde::{Deserialize, Serialize};

use crate::app_config::Config;
use crate::errors::FormatError;
use crate::language_utils::is_cjk_char;

pub mod plain_text;
pub mod prompts;
pub mod readings;
pub mod storyboard;

pub use prompts::ImagePromptBuilder;
pub use readings::ReadingDictionary;

/// One narrative unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// 0-based position, fixed at split time
    pub index: usize,
    /// Narration text, never empty
    pub narration_text: String,
    /// Explicit visual directive; `None` means derive one from the narration
    #[serde(default)]
    pub visual_directive: Option<String>,
}

/// Shape of the input document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    PlainText,
    Storyboard,
}

/// Result of splitting one input document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitResult {
    /// Document title (storyboard `# ` heading)
    pub title: Option<String>,
    /// Format that was actually used
    pub format: InputFormat,
    /// Scenes in document order
    pub scenes: Vec<Scene>,
}

/// Splits input text into scenes
#[derive(Debug, Clone)]
pub struct SceneSplitter {
    max_scenes: usize,
}

impl SceneSplitter {
    /// `max_scenes` caps plain-text scene count; 0 disables grouping
    pub fn new(max_scenes: usize) -> Self {
        Self { max_scenes }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.video.max_scenes)
    }

    /// Split `text` into scenes.
    ///
    /// `requested` forces a format (usually derived from the file
    /// extension); otherwise the storyboard detector decides.
    pub fn split(&self, text: &str, requested: Option<InputFormat>) -> Result<SplitResult, FormatError> {
        if text.trim().is_empty() {
            return Err(FormatError::EmptyInput);
        }

        let format = requested.unwrap_or_else(|| {
            if storyboard::is_storyboard_format(text) {
                InputFormat::Storyboard
            } else {
                InputFormat::PlainText
            }
        });

        let result = match format {
            InputFormat::Storyboard => {
                let document = storyboard::parse_storyboard(text)?;
                SplitResult {
                    title: document.title,
                    format,
                    scenes: document.scenes,
                }
            }
            InputFormat::PlainText => {
                let scenes = plain_text::split_plain_text(text, self.max_scenes)
                    .into_iter()
                    .enumerate()
                    .map(|(index, narration_text)| Scene {
                        index,
                        narration_text,
                        visual_directive: None,
                    })
                    .collect::<Vec<_>>();
                if scenes.is_empty() {
                    return Err(FormatError::EmptyInput);
                }
                SplitResult {
                    title: None,
                    format,
                    scenes,
                }
            }
        };

        debug!("Split input into {} scene(s) as {:?}", result.scenes.len(), result.format);
        Ok(result)
    }
}

/// Collapse whitespace runs to one space and drop whitespace that touches
/// a CJK character.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            let joins_cjk = out.chars().next_back().map(is_cjk_char).unwrap_or(true) || is_cjk_char(c);
            if !out.is_empty() && !joins_cjk {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(c);
    }

    out
}
