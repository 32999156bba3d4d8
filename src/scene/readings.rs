use anyhow::{Context, Result};
use log::{debug, warn};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

use crate::file_utils::FileManager;

/// Pronunciation dictionary applied to narration before speech synthesis.
///
/// The YAML file groups entries by category:
///
/// ```yaml
/// 人名:
///   東雲: しののめ
/// 地名:
///   御徒町: おかちまち
/// ```
///
/// Categories only organise the file; lookups use the flattened map.
/// Subtitles always show the original surface text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingDictionary {
    // Longest surface first so overlapping entries resolve predictably
    entries: Vec<(String, String)>,
}

pub const READINGS_FILE_NAME: &str = "readings.yml";

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl ReadingDictionary {
    /// Parse the categorized YAML form
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(content).context("Failed to parse readings YAML")?;
        let mut entries = Vec::new();

        if let Value::Mapping(categories) = root {
            for (category, table) in categories {
                let Value::Mapping(table) = table else {
                    warn!("Ignoring readings category {:?}: not a mapping", category);
                    continue;
                };
                for (surface, reading) in table {
                    match (scalar_to_string(&surface), scalar_to_string(&reading)) {
                        (Some(surface), Some(reading)) if !surface.is_empty() => {
                            entries.push((surface, reading));
                        }
                        _ => warn!("Ignoring malformed reading entry in {:?}", category),
                    }
                }
            }
        }

        Ok(Self::from_entries(entries))
    }

    /// Build from flat `(surface, reading)` pairs. Later duplicates win.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut map = std::collections::BTreeMap::new();
        for (surface, reading) in entries {
            map.insert(surface, reading);
        }
        let mut entries: Vec<(String, String)> = map.into_iter().collect();
        entries.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()).then_with(|| a.0.cmp(&b.0)));
        Self { entries }
    }

    /// Load from a file; a missing file yields an empty dictionary
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !FileManager::file_exists(path) {
            debug!("No readings file at {}", path.display());
            return Ok(Self::default());
        }
        let content = FileManager::read_to_string(path)?;
        let dictionary = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid readings file: {}", path.display()))?;
        debug!("Loaded {} reading(s) from {}", dictionary.len(), path.display());
        Ok(dictionary)
    }

    /// Locate a readings file.
    ///
    /// Order: the configured path, `readings.yml` next to the input,
    /// `readings.yml` in the current directory, then the user config
    /// directory (`<config>/talecast/readings.yml`).
    pub fn discover(configured: Option<&Path>, input: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = configured {
            return Some(path.to_path_buf());
        }

        let mut candidates = Vec::new();
        if let Some(dir) = input.and_then(Path::parent) {
            candidates.push(dir.join(READINGS_FILE_NAME));
        }
        candidates.push(PathBuf::from(READINGS_FILE_NAME));
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("talecast").join(READINGS_FILE_NAME));
        }

        candidates.into_iter().find(|p| FileManager::file_exists(p))
    }

    /// Replace every surface form with its reading
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (surface, reading) in &self.entries {
            if out.contains(surface.as_str()) {
                out = out.replace(surface.as_str(), reading);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
