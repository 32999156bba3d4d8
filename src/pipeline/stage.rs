use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Split,
    Narrate,
    Illustrate,
    Subtitle,
    Compose,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Split,
        Stage::Narrate,
        Stage::Illustrate,
        Stage::Subtitle,
        Stage::Compose,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Split => "split",
            Stage::Narrate => "narrate",
            Stage::Illustrate => "illustrate",
            Stage::Subtitle => "subtitle",
            Stage::Compose => "compose",
        }
    }

    /// Stages that call a paid external service
    pub fn is_paid(&self) -> bool {
        matches!(self, Stage::Narrate | Stage::Illustrate)
    }

    /// Stages a caller may leave out of a run
    pub fn is_skippable(&self) -> bool {
        matches!(self, Stage::Illustrate | Stage::Compose)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown stage '{}' (expected one of: {})",
                    s,
                    Stage::ALL.map(|st| st.name()).join(", ")
                )
            })
    }
}

/// Whether a cached artifact satisfies the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    /// Matches the current fingerprint; reused as-is
    Fresh,
    /// Exists but was produced from different inputs
    Stale,
    /// Not produced yet
    Missing,
}

impl StageState {
    /// State of one artifact given its recorded fingerprint
    pub fn classify(recorded: Option<&str>, expected: &str, file_exists: bool) -> Self {
        match recorded {
            None => StageState::Missing,
            Some(_) if !file_exists => StageState::Missing,
            Some(fp) if fp == expected => StageState::Fresh,
            Some(_) => StageState::Stale,
        }
    }

    /// Combined state of several artifacts: the worst one wins
    pub fn aggregate(states: impl IntoIterator<Item = StageState>) -> Self {
        states.into_iter().max().unwrap_or(StageState::Fresh)
    }

    pub fn needs_run(&self) -> bool {
        *self != StageState::Fresh
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageState::Fresh => "fresh",
            StageState::Stale => "stale",
            StageState::Missing => "missing",
        };
        f.pad(name)
    }
}

// Separator that cannot appear in the hashed parts by accident
const FIELD_SEPARATOR: char = '\u{1f}';

/// Hex SHA-256 over the parts, each terminated by a unit separator
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
