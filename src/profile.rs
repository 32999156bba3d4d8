/*!
 * Per-run generation settings: command-line overrides and named profiles.
 *
 * A profile is a YAML file `<name>.yml` that carries account-wide
 * generation defaults:
 *
 * ```yaml
 * name: bedtime-stories
 * description: Calm narration for the evening channel
 * generation:
 *   voice: shimmer
 *   speed: 0.9
 *   image_quality: medium
 *   image_style_prefix: "Soft watercolor, "
 *   max_duration: 60
 * ```
 *
 * Precedence, highest first: command-line flags, profile defaults, then
 * the values already in `conf.json`.
 */

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::app_config::Config;
use crate::file_utils::FileManager;

static PROFILE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap());

pub const PROFILES_DIR_NAME: &str = "profiles";

/// Generation defaults of a profile. `None` leaves the setting alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub voice: Option<String>,
    pub speed: Option<f64>,
    pub image_quality: Option<String>,
    pub image_style_prefix: Option<String>,
    /// Seconds
    pub max_duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub generation: GenerationDefaults,
}

impl Profile {
    /// Profile names are lowercase slugs such as `bedtime-stories`
    pub fn validate_name(name: &str) -> Result<()> {
        if !PROFILE_NAME.is_match(name) {
            bail!(
                "Invalid profile name '{}': use lowercase letters, digits and single hyphens (e.g. 'bedtime-stories')",
                name
            );
        }
        Ok(())
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse profile YAML")
    }

    /// Load `<dir>/<name>.yml`; the `name` inside the file must match
    pub fn load_from(dir: &Path, name: &str) -> Result<Self> {
        Self::validate_name(name)?;
        let path = dir.join(format!("{}.yml", name));
        if !FileManager::file_exists(&path) {
            bail!("Profile not found: {}", path.display());
        }

        let content = FileManager::read_to_string(&path)?;
        let profile = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid profile file: {}", path.display()))?;
        if profile.name != name {
            bail!(
                "Profile name mismatch: file is '{}' but it declares '{}'",
                path.display(),
                profile.name
            );
        }

        debug!("Loaded profile '{}' from {}", name, path.display());
        Ok(profile)
    }

    /// Load a profile by name from the first directory that has it.
    ///
    /// Order: `profiles/` in the current directory, then
    /// `<config>/talecast/profiles/`.
    pub fn load(name: &str) -> Result<Self> {
        Self::validate_name(name)?;
        let file_name = format!("{}.yml", name);
        let dir = Self::search_dirs()
            .into_iter()
            .find(|dir| FileManager::file_exists(dir.join(&file_name)))
            .ok_or_else(|| anyhow!("Profile '{}' not found in ./{} or the user config directory", name, PROFILES_DIR_NAME))?;
        Self::load_from(&dir, name)
    }

    fn search_dirs() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(PROFILES_DIR_NAME)];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("talecast").join(PROFILES_DIR_NAME));
        }
        candidates
    }
}

/// Generation settings chosen for one run.
///
/// Applied to a loaded [`Config`] before it is validated, so an out of
/// range `--speed` is reported like a bad `conf.json` value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOverrides {
    pub voice: Option<String>,
    pub speed: Option<f64>,
    pub max_duration_secs: Option<f64>,
    pub image_quality: Option<String>,
    pub image_style_prefix: Option<String>,
}

impl GenerationOverrides {
    /// Fill every field still unset from the profile defaults
    pub fn with_profile_defaults(self, defaults: &GenerationDefaults) -> Self {
        Self {
            voice: self.voice.or_else(|| defaults.voice.clone()),
            speed: self.speed.or(defaults.speed),
            max_duration_secs: self.max_duration_secs.or(defaults.max_duration),
            image_quality: self.image_quality.or_else(|| defaults.image_quality.clone()),
            image_style_prefix: self.image_style_prefix.or_else(|| defaults.image_style_prefix.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(voice) = &self.voice {
            config.tts.voice = voice.clone();
        }
        if let Some(speed) = self.speed {
            config.tts.speed = speed;
        }
        if let Some(max_duration) = self.max_duration_secs {
            config.video.max_duration_secs = max_duration;
        }
        if let Some(quality) = &self.image_quality {
            config.image.quality = quality.clone();
        }
        if let Some(prefix) = &self.image_style_prefix {
            config.image.style_prefix = prefix.clone();
        }
    }
}
