use crate::app_config::ReadingSpeedConfig;

/// Script utilities for narration text
///
/// This module decides whether text is CJK-dominant, which selects the
/// character-based chunking strategy and the characters-per-minute reading
/// speed, and estimates how long a narration takes to read aloud.
/// Summary of a text's script composition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptProfile {
    /// Non-whitespace characters in a CJK block
    pub cjk_chars: usize,
    /// All non-whitespace characters
    pub total_chars: usize,
    /// Whether the CJK share reached the threshold
    pub cjk_dominant: bool,
}

impl ScriptProfile {
    /// Share of CJK characters among non-whitespace characters
    pub fn cjk_ratio(&self) -> f64 {
        if self.total_chars == 0 {
            0.0
        } else {
            self.cjk_chars as f64 / self.total_chars as f64
        }
    }
}

/// Check whether a character is Japanese/Chinese script or CJK punctuation.
///
/// Covers CJK punctuation, hiragana, katakana (with phonetic extensions),
/// unified and compatibility ideographs, full-width punctuation and
/// half-width katakana. Full-width Latin letters and digits and Hangul do
/// not count.
pub fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x303F     // CJK symbols and punctuation
        | 0x3040..=0x309F   // Hiragana
        | 0x30A0..=0x30FF   // Katakana
        | 0x31F0..=0x31FF   // Katakana phonetic extensions
        | 0x3400..=0x4DBF   // CJK unified ideographs extension A
        | 0x4E00..=0x9FFF   // CJK unified ideographs
        | 0xF900..=0xFAFF   // CJK compatibility ideographs
        | 0xFF01..=0xFF0F   // Full-width punctuation
        | 0xFF1A..=0xFF20
        | 0xFF3B..=0xFF40
        | 0xFF5B..=0xFF65   // incl. half-width CJK punctuation
        | 0xFF66..=0xFF9F   // Half-width katakana
    )
}

/// Profile the script composition of `text` against `threshold`.
///
/// Empty or whitespace-only text is never CJK-dominant.
pub fn classify(text: &str, threshold: f64) -> ScriptProfile {
    let mut cjk_chars = 0;
    let mut total_chars = 0;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total_chars += 1;
        if is_cjk_char(c) {
            cjk_chars += 1;
        }
    }

    let mut profile = ScriptProfile {
        cjk_chars,
        total_chars,
        cjk_dominant: false,
    };
    profile.cjk_dominant = total_chars > 0 && profile.cjk_ratio() >= threshold;
    profile
}

/// Shorthand for `classify(text, threshold).cjk_dominant`
pub fn is_cjk_dominant(text: &str, threshold: f64) -> bool {
    classify(text, threshold).cjk_dominant
}

/// Number of whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated narration time of `text`, in seconds.
///
/// CJK-dominant text is measured in non-whitespace characters, anything
/// else in words.
pub fn estimate_duration(text: &str, speeds: &ReadingSpeedConfig, threshold: f64) -> f64 {
    let profile = classify(text, threshold);
    if profile.cjk_dominant {
        profile.total_chars as f64 / speeds.cjk_chars_per_minute * 60.0
    } else {
        word_count(text) as f64 / speeds.words_per_minute * 60.0
    }
}
