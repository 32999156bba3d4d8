/*!
 * Storyboard parser.
 *
 * A storyboard is a Markdown-like document:
 *
 * ```text
 * # Title
 *
 * ## シーン1
 * **映像**: a harbour at dawn
 * **ナレーション**: 夜明けの港。
 *
 * ## Scene 2
 * **Narration**: ...
 * ```
 *
 * Fields may appear in any order and continue over several lines until the
 * next bold label or heading. Narration is mandatory, the visual directive
 * is optional.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Scene, normalize_whitespace};
use crate::errors::FormatError;

static SCENE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^##\s*(?:シーン|[Ss]cene)(?:[\s\d:：#.]|$)").unwrap());

static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#\s+(.+)$").unwrap());

static FIELD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\*\*\s*(映像|ビジュアル|[Vv]isual|ナレーション|[Nn]arration)\s*[:：]?\s*\*\*\s*[:：]?\s*(.*)$")
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Visual,
    Narration,
}

impl Field {
    fn from_label(label: &str) -> Self {
        match label {
            "ナレーション" | "Narration" | "narration" => Field::Narration,
            _ => Field::Visual,
        }
    }
}

/// Parsed storyboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryboardDocument {
    pub title: Option<String>,
    pub scenes: Vec<Scene>,
}

fn is_scene_heading(line: &str) -> bool {
    SCENE_HEADING.is_match(line.trim_end())
}

/// True when the text has a scene heading and a bold narration label
pub fn is_storyboard_format(text: &str) -> bool {
    let mut has_heading = false;
    let mut has_narration = false;
    for line in text.lines() {
        if is_scene_heading(line) {
            has_heading = true;
        } else if let Some(caps) = FIELD_LABEL.captures(line.trim()) {
            if Field::from_label(&caps[1]) == Field::Narration {
                has_narration = true;
            }
        }
        if has_heading && has_narration {
            return true;
        }
    }
    false
}

/// First `# ` heading of the document
pub fn parse_title(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| TITLE.captures(line.trim_end()))
        .map(|caps| caps[1].trim().to_string())
        .find(|title| !title.is_empty())
}

/// Parse a storyboard into scenes in heading order.
///
/// Fails with [`FormatError::NoScenes`] when no scene heading exists and
/// with [`FormatError::MissingNarration`] (1-based) for the first scene
/// without narration.
pub fn parse_storyboard(text: &str) -> Result<StoryboardDocument, FormatError> {
    let mut sections: Vec<Vec<&str>> = Vec::new();
    for line in text.lines() {
        if is_scene_heading(line) {
            sections.push(Vec::new());
        } else if let Some(section) = sections.last_mut() {
            section.push(line);
        }
    }

    if sections.is_empty() {
        return Err(FormatError::NoScenes);
    }

    let scenes = sections
        .iter()
        .enumerate()
        .map(|(index, lines)| parse_section(index, lines))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StoryboardDocument {
        title: parse_title(text),
        scenes,
    })
}

fn parse_section(index: usize, lines: &[&str]) -> Result<Scene, FormatError> {
    let mut visual: Option<String> = None;
    let mut narration: Option<String> = None;
    let mut current: Option<(Field, String)> = None;

    let mut commit = |field: Option<(Field, String)>| {
        if let Some((field, value)) = field {
            let slot = match field {
                Field::Visual => &mut visual,
                Field::Narration => &mut narration,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value);
            }
        }
    };

    for line in lines {
        let trimmed = line.trim();
        if trimmed.starts_with("**") || trimmed.starts_with('#') {
            commit(current.take());
            if let Some(caps) = FIELD_LABEL.captures(trimmed) {
                current = Some((Field::from_label(&caps[1]), caps[2].trim().to_string()));
            }
            continue;
        }
        if let Some((_, value)) = current.as_mut() {
            if !trimmed.is_empty() {
                if !value.is_empty() {
                    value.push('\n');
                }
                value.push_str(trimmed);
            }
        }
    }
    commit(current.take());

    let narration_text = narration
        .map(|n| normalize_whitespace(&n))
        .filter(|n| !n.is_empty())
        .ok_or(FormatError::MissingNarration {
            scene_number: index + 1,
        })?;
    let visual_directive = visual.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    Ok(Scene {
        index,
        narration_text,
        visual_directive,
    })
}
