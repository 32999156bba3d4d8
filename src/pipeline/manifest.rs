/*!
 * Run manifest.
 *
 * `manifest.json` records, for every committed artifact, the fingerprint of
 * the inputs it was produced from. It is the source of truth for stage
 * states; file names alone never make an artifact fresh.
 */

use chrono::Local;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::PipelineError;
use crate::file_utils::FileManager;

pub const MANIFEST_VERSION: u32 = 1;

/// A single-file artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub fingerprint: String,
    /// Path relative to the working directory
    pub file: String,
}

/// A narration audio artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRecord {
    pub fingerprint: String,
    pub file: String,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: u32,
    /// Identifies the run that created the working directory
    pub run_id: String,
    /// Local time of the last write
    pub updated_at: String,
    #[serde(default)]
    pub split: Option<ArtifactRecord>,
    #[serde(default)]
    pub narration: BTreeMap<usize, AudioRecord>,
    #[serde(default)]
    pub illustration: BTreeMap<usize, ArtifactRecord>,
    #[serde(default)]
    pub subtitles: Option<ArtifactRecord>,
    #[serde(default)]
    pub composition: Option<ArtifactRecord>,
}

impl Default for RunManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl RunManifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            run_id: uuid::Uuid::new_v4().to_string(),
            updated_at: Local::now().to_rfc3339(),
            split: None,
            narration: BTreeMap::new(),
            illustration: BTreeMap::new(),
            subtitles: None,
            composition: None,
        }
    }

    /// Load the manifest, or start a new one when none exists.
    ///
    /// An unreadable manifest is an error rather than a silent reset, since
    /// a reset would regenerate every paid artifact.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if !FileManager::file_exists(path) {
            debug!("No manifest at {}, starting a new run", path.display());
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Manifest(format!("cannot read {}: {}", path.display(), e)))?;
        let manifest: RunManifest = serde_json::from_str(&content).map_err(|e| {
            PipelineError::Manifest(format!(
                "cannot parse {}: {} (delete it to regenerate all artifacts)",
                path.display(),
                e
            ))
        })?;

        if manifest.version != MANIFEST_VERSION {
            return Err(PipelineError::Manifest(format!(
                "unsupported manifest version {} in {}",
                manifest.version,
                path.display()
            )));
        }
        Ok(manifest)
    }

    /// Write the manifest in one step
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<(), PipelineError> {
        let path = path.as_ref();
        self.updated_at = Local::now().to_rfc3339();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Manifest(format!("cannot serialize manifest: {}", e)))?;
        FileManager::write_atomic(path, json.as_bytes())
            .map_err(|e| PipelineError::Manifest(format!("{:#}", e)))
    }

    /// Drop per-scene records beyond the current scene count
    pub fn retain_scenes(&mut self, scene_count: usize) {
        self.narration.retain(|&index, _| index < scene_count);
        self.illustration.retain(|&index, _| index < scene_count);
    }
}
