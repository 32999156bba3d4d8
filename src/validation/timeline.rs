/*!
 * Timeline validation for generated subtitle tracks.
 *
 * Checks that every cue:
 * - has a start strictly before its end
 * - stays on screen for the minimum display time
 * - can be read at a reasonable speed
 * - neither overlaps nor leaves a gap after its predecessor
 *
 * Findings are advisory; the pipeline logs them as warnings.
 */

use log::debug;

use crate::app_config::SubtitleConfig;
use crate::subtitle_processor::SubtitleEntry;

/// Types of timeline issues
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineIssue {
    /// End is not after start
    InvalidTimeRange { start_ms: u64, end_ms: u64 },
    /// Shorter than the minimum display time
    DurationTooShort { duration_ms: u64, min_duration_ms: u64 },
    /// More characters per second than a viewer can follow
    ReadingSpeedTooHigh { cps: f64, max_cps: f64 },
    /// Starts before the previous cue ended
    Overlap { prev_seq_num: usize, overlap_ms: u64 },
    /// Starts after the previous cue ended
    Gap { prev_seq_num: usize, gap_ms: u64 },
}

impl std::fmt::Display for TimelineIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimelineIssue::InvalidTimeRange { start_ms, end_ms } => {
                write!(f, "Invalid time range: start {}ms >= end {}ms", start_ms, end_ms)
            }
            TimelineIssue::DurationTooShort { duration_ms, min_duration_ms } => {
                write!(f, "Duration too short: {}ms (min: {}ms)", duration_ms, min_duration_ms)
            }
            TimelineIssue::ReadingSpeedTooHigh { cps, max_cps } => {
                write!(f, "Reading speed too high: {:.1} CPS (max: {:.1})", cps, max_cps)
            }
            TimelineIssue::Overlap { prev_seq_num, overlap_ms } => {
                write!(f, "Overlaps entry {} by {}ms", prev_seq_num, overlap_ms)
            }
            TimelineIssue::Gap { prev_seq_num, gap_ms } => {
                write!(f, "Gap of {}ms after entry {}", gap_ms, prev_seq_num)
            }
        }
    }
}

/// One issue attached to the cue it was found on
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineFinding {
    pub seq_num: usize,
    pub issue: TimelineIssue,
}

/// Result of validating a whole track
#[derive(Debug, Clone, Default)]
pub struct TimelineReport {
    pub findings: Vec<TimelineFinding>,
    pub entries_checked: usize,
}

impl TimelineReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn overlap_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| matches!(f.issue, TimelineIssue::Overlap { .. }))
            .count()
    }
}

/// Validates subtitle timelines
#[derive(Debug, Clone)]
pub struct TimelineValidator {
    min_duration_ms: u64,
    max_cps: f64,
    require_contiguous: bool,
}

impl TimelineValidator {
    pub fn new(min_duration_ms: u64, max_cps: f64) -> Self {
        Self {
            min_duration_ms,
            max_cps,
            require_contiguous: true,
        }
    }

    pub fn from_config(config: &SubtitleConfig) -> Self {
        Self::new((config.min_display_secs * 1000.0).round() as u64, config.max_cps)
    }

    /// Report gaps between cues
    pub fn with_contiguity(mut self, require_contiguous: bool) -> Self {
        self.require_contiguous = require_contiguous;
        self
    }

    /// Reading speed of an entry in characters per second
    pub fn calculate_cps(entry: &SubtitleEntry) -> f64 {
        let duration_secs = entry.duration_ms() as f64 / 1000.0;
        let chars = entry.text.chars().filter(|c| !c.is_whitespace()).count() as f64;
        if duration_secs > 0.0 { chars / duration_secs } else { f64::INFINITY }
    }

    fn validate_entry(&self, entry: &SubtitleEntry) -> Vec<TimelineIssue> {
        if entry.end_time_ms <= entry.start_time_ms {
            return vec![TimelineIssue::InvalidTimeRange {
                start_ms: entry.start_time_ms,
                end_ms: entry.end_time_ms,
            }];
        }

        let mut issues = Vec::new();
        let duration_ms = entry.duration_ms();
        // Boundaries are rounded independently, allow one millisecond
        if duration_ms + 1 < self.min_duration_ms {
            issues.push(TimelineIssue::DurationTooShort {
                duration_ms,
                min_duration_ms: self.min_duration_ms,
            });
        }

        let cps = Self::calculate_cps(entry);
        if cps > self.max_cps {
            issues.push(TimelineIssue::ReadingSpeedTooHigh {
                cps,
                max_cps: self.max_cps,
            });
        }
        issues
    }

    /// Validate entries in timeline order
    pub fn validate(&self, entries: &[SubtitleEntry]) -> TimelineReport {
        let mut findings = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            for issue in self.validate_entry(entry) {
                findings.push(TimelineFinding {
                    seq_num: entry.seq_num,
                    issue,
                });
            }

            let Some(prev) = i.checked_sub(1).map(|p| &entries[p]) else {
                continue;
            };
            if prev.end_time_ms > entry.start_time_ms {
                findings.push(TimelineFinding {
                    seq_num: entry.seq_num,
                    issue: TimelineIssue::Overlap {
                        prev_seq_num: prev.seq_num,
                        overlap_ms: prev.end_time_ms - entry.start_time_ms,
                    },
                });
            } else if self.require_contiguous && entry.start_time_ms > prev.end_time_ms {
                findings.push(TimelineFinding {
                    seq_num: entry.seq_num,
                    issue: TimelineIssue::Gap {
                        prev_seq_num: prev.seq_num,
                        gap_ms: entry.start_time_ms - prev.end_time_ms,
                    },
                });
            }
        }

        debug!("Timeline validation: {} entries, {} finding(s)", entries.len(), findings.len());

        TimelineReport {
            findings,
            entries_checked: entries.len(),
        }
    }
}

impl Default for TimelineValidator {
    fn default() -> Self {
        Self::from_config(&SubtitleConfig::default())
    }
}
