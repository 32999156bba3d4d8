use anyhow::{Context, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;

use crate::errors::SubtitleError;
use crate::file_utils::FileManager;

// @module: SRT writing and parsing

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2,}):(\d{2}):(\d{2}),(\d{3}) --> (\d{2,}):(\d{2}):(\d{2}),(\d{3})$").unwrap()
});

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    // @field: Sequence number, 1-based
    pub seq_num: usize,

    // @field: Start time in ms on the global timeline
    pub start_time_ms: u64,

    // @field: End time in ms on the global timeline
    pub end_time_ms: u64,

    // @field: Subtitle text
    pub text: String,

    // @field: Originating scene; not stored in SRT
    pub scene_index: Option<usize>,
}

impl SubtitleEntry {
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: String) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            text,
            scene_index: None,
        }
    }

    /// Parse an SRT timestamp (`HH:MM:SS,mmm`) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Option<u64> {
        let (clock, millis) = timestamp.trim().split_once(',')?;
        let mut parts = clock.split(':');
        let hours: u64 = parts.next()?.parse().ok()?;
        let minutes: u64 = parts.next()?.parse().ok()?;
        let seconds: u64 = parts.next()?.parse().ok()?;
        let millis: u64 = millis.parse().ok()?;
        if parts.next().is_some() || minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return None;
        }
        Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_time_ms.saturating_sub(self.start_time_ms)
    }

    /// The `(start, end, text)` triple preserved by an SRT round trip
    pub fn timing_key(&self) -> (u64, u64, &str) {
        (self.start_time_ms, self.end_time_ms, self.text.as_str())
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(
            f,
            "{} --> {}",
            Self::format_timestamp(self.start_time_ms),
            Self::format_timestamp(self.end_time_ms)
        )?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// Ordered subtitle track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleCollection {
    pub entries: Vec<SubtitleEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Sequence,
    Timestamp,
    Text,
}

impl SubtitleCollection {
    pub fn new(entries: Vec<SubtitleEntry>) -> Self {
        Self { entries }
    }

    /// Serialize all entries as SRT
    pub fn to_srt_string(&self) -> String {
        self.entries.iter().map(|entry| entry.to_string()).collect()
    }

    /// Write subtitles to an SRT file, replacing any previous file whole
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        FileManager::write_to_file(path, &self.to_srt_string())
            .with_context(|| format!("Failed to write subtitle file: {}", path.display()))?;
        debug!("Wrote {} subtitle(s) to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Read an SRT file
    pub fn read_from_srt<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = FileManager::read_to_string(path)?;
        let entries = Self::parse_srt_string(&content)
            .with_context(|| format!("Failed to parse subtitle file: {}", path.display()))?;
        Ok(Self { entries })
    }

    /// Parse SRT content.
    ///
    /// Text lines are kept verbatim so that written tracks read back to the
    /// same `(start, end, text)` tuples. Entries keep file order.
    pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleEntry>, SubtitleError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut entries = Vec::new();
        let mut state = ParseState::Sequence;
        let mut current = SubtitleEntry::new(0, 0, 0, String::new());
        let mut text_lines: Vec<&str> = Vec::new();

        for (i, line) in content.lines().enumerate() {
            let line_number = i + 1;
            let blank = line.trim().is_empty();

            match state {
                ParseState::Sequence => {
                    if blank {
                        continue;
                    }
                    current.seq_num = line.trim().parse().map_err(|_| SubtitleError::InvalidSequence {
                        line: line_number,
                        value: line.to_string(),
                    })?;
                    state = ParseState::Timestamp;
                }
                ParseState::Timestamp => {
                    let caps = TIMESTAMP_REGEX.captures(line.trim()).ok_or_else(|| {
                        SubtitleError::InvalidTimestamp {
                            line: line_number,
                            value: line.to_string(),
                        }
                    })?;
                    let invalid = || SubtitleError::InvalidTimestamp {
                        line: line_number,
                        value: line.to_string(),
                    };
                    let start = format!("{}:{}:{},{}", &caps[1], &caps[2], &caps[3], &caps[4]);
                    let end = format!("{}:{}:{},{}", &caps[5], &caps[6], &caps[7], &caps[8]);
                    current.start_time_ms = SubtitleEntry::parse_timestamp(&start).ok_or_else(invalid)?;
                    current.end_time_ms = SubtitleEntry::parse_timestamp(&end).ok_or_else(invalid)?;
                    state = ParseState::Text;
                }
                ParseState::Text => {
                    if blank {
                        current.text = text_lines.join("\n");
                        text_lines.clear();
                        entries.push(std::mem::replace(&mut current, SubtitleEntry::new(0, 0, 0, String::new())));
                        state = ParseState::Sequence;
                    } else {
                        text_lines.push(line);
                    }
                }
            }
        }

        match state {
            ParseState::Text => {
                current.text = text_lines.join("\n");
                entries.push(current);
            }
            ParseState::Timestamp => warn!("Subtitle file ends after a sequence number"),
            ParseState::Sequence => {}
        }

        if entries.is_empty() {
            return Err(SubtitleError::NoEntries);
        }
        Ok(entries)
    }
}
