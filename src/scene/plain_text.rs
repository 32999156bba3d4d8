use once_cell::sync::Lazy;
use regex::Regex;

use super::normalize_whitespace;

// @module: Plain-text scene splitting

// @const: Blank-line paragraph separator
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

const FULL_WIDTH_TERMINALS: [char; 4] = ['。', '．', '！', '？'];
const HALF_WIDTH_TERMINALS: [char; 3] = ['.', '!', '?'];
// Closing marks that stay with the sentence they end
const CLOSERS: [char; 10] = ['」', '』', '）', '】', '〉', '》', ')', '"', '\'', '”'];

fn is_terminal(c: char) -> bool {
    FULL_WIDTH_TERMINALS.contains(&c) || HALF_WIDTH_TERMINALS.contains(&c)
}

fn is_punctuation_only(segment: &str) -> bool {
    segment
        .chars()
        .all(|c| c.is_whitespace() || is_terminal(c) || CLOSERS.contains(&c))
}

/// Split on blank lines
pub fn split_paragraphs(text: &str) -> Vec<String> {
    PARAGRAPH_BREAK
        .split(text.trim())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a block into sentences at terminal punctuation.
///
/// Terminals keep any directly following terminals and closing brackets.
/// A half-width terminal only ends a sentence when it is not followed by an
/// ASCII letter or digit, so "3.14" stays intact. Pieces made of
/// punctuation alone are merged into the next sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    let mut sentences: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        current.push(c);
        i += 1;

        if !is_terminal(c) {
            continue;
        }
        if HALF_WIDTH_TERMINALS.contains(&c) {
            if let Some(next) = chars.get(i) {
                if next.is_ascii_alphanumeric() {
                    continue;
                }
            }
        }
        while i < chars.len() && (is_terminal(chars[i]) || CLOSERS.contains(&chars[i])) {
            current.push(chars[i]);
            i += 1;
        }

        let sentence = current.trim().to_string();
        current.clear();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    merge_punctuation_forward(sentences)
}

fn merge_punctuation_forward(segments: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(segments.len());
    let mut carry = String::new();

    for segment in segments {
        if is_punctuation_only(&segment) {
            carry.push_str(&segment);
            continue;
        }
        if carry.is_empty() {
            merged.push(segment);
        } else {
            merged.push(format!("{}{}", std::mem::take(&mut carry), segment));
        }
    }

    // Trailing punctuation has nothing to merge into
    if !carry.is_empty() {
        match merged.last_mut() {
            Some(last) => last.push_str(&carry),
            None => merged.push(carry),
        }
    }

    merged
}

/// Group consecutive segments into at most `max_groups` contiguous groups
/// of roughly equal segment counts. `max_groups == 0` keeps every segment.
pub fn group_segments(segments: Vec<String>, max_groups: usize) -> Vec<String> {
    let n = segments.len();
    if max_groups == 0 || n <= max_groups {
        return segments;
    }

    (0..max_groups)
        .map(|g| {
            let start = g * n / max_groups;
            let end = (g + 1) * n / max_groups;
            segments[start..end].join(" ")
        })
        .collect()
}

/// Split prose into normalized scene narrations.
///
/// Multiple paragraphs become scenes directly. A single block falls back to
/// sentence splitting. Any non-empty input yields at least one scene.
pub fn split_plain_text(text: &str, max_scenes: usize) -> Vec<String> {
    let mut segments = split_paragraphs(text);
    if segments.len() == 1 {
        segments = split_sentences(&segments[0]);
    }

    group_segments(segments, max_scenes)
        .iter()
        .map(|s| normalize_whitespace(s))
        .filter(|s| !s.is_empty())
        .collect()
}
