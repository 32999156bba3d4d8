/*!
 * Subtitle chunking.
 *
 * CJK-dominant narration is cut into display-sized fragments without
 * relying on whitespace:
 *
 * 1. split after clause punctuation (。、！？， and half-width forms)
 * 2. cut pieces over budget after the rightmost particle or inflectional
 *    ending inside the search window, or at the hard limit when no such
 *    break exists there
 * 3. never cut before a long-vowel mark, small kana or closing bracket
 * 4. fold fragments of three characters or less into their predecessor
 *
 * Concatenating the fragments always yields the input text. Other text is
 * packed into groups of whole words.
 */

use log::debug;

use super::SubtitleFragment;
use crate::app_config::SubtitleConfig;
use crate::language_utils::is_cjk_dominant;
use crate::scene::Scene;

// Particles and common verb/adjective endings a cut may follow
const BREAK_AFTER: &[char] = &[
    'は', 'が', 'を', 'に', 'で', 'と', 'も', 'へ', 'の', 'て', 'た', 'だ', 'る', 'い', 'す', 'ね', 'よ',
];

// A fragment may never start with one of these
const NO_BREAK_BEFORE: &[char] = &[
    'ー', 'ッ', 'ャ', 'ュ', 'ョ', 'ァ', 'ィ', 'ゥ', 'ェ', 'ォ', 'ヮ', 'ヵ', 'ヶ', 'っ', 'ゃ', 'ゅ', 'ょ', 'ぁ',
    'ぃ', 'ぅ', 'ぇ', 'ぉ', 'ゎ', 'ゝ', 'ゞ', 'ヽ', 'ヾ', '々', '」', '』', '）', '】', '〉', '》', '〕',
    '］', '｝', '。', '、', '！', '？', '，', '．', '・', ')', ']', '}', ',', '.', '!', '?',
];

// A fragment may never end with an opening bracket
const NO_BREAK_AFTER: &[char] = &['「', '『', '（', '【', '〈', '《', '〔', '［', '｛', '(', '[', '{'];

// Tightly bound pairs
const NO_BREAK_PAIRS: &[(char, char)] = &[('す', 'る'), ('い', 'う'), ('で', 'し')];

const FULL_WIDTH_CLAUSE_PUNCTUATION: &[char] = &['。', '、', '！', '？', '，', '．'];
const HALF_WIDTH_CLAUSE_PUNCTUATION: &[char] = &[',', '.', '!', '?'];
const CLOSERS: &[char] = &['」', '』', '）', '】', '〉', '》', '〕', '］', '｝', ')', ']', '}'];

/// Fragments this short are folded into the previous one
pub const SHORT_FRAGMENT_CHARS: usize = 3;

fn is_clause_punctuation(c: char) -> bool {
    FULL_WIDTH_CLAUSE_PUNCTUATION.contains(&c) || HALF_WIDTH_CLAUSE_PUNCTUATION.contains(&c)
}

/// Whether a fragment boundary may sit between `chars[i - 1]` and `chars[i]`
fn is_legal_break(chars: &[char], i: usize) -> bool {
    if i == 0 || i >= chars.len() {
        return false;
    }
    let (prev, next) = (chars[i - 1], chars[i]);
    !NO_BREAK_BEFORE.contains(&next)
        && !NO_BREAK_AFTER.contains(&prev)
        && !NO_BREAK_PAIRS.contains(&(prev, next))
        && !next.is_whitespace()
        && !(prev.is_ascii_alphanumeric() && next.is_ascii_alphanumeric())
}

fn is_break_candidate(chars: &[char], i: usize) -> bool {
    i > 0 && BREAK_AFTER.contains(&chars[i - 1]) && is_legal_break(chars, i)
}

/// Step 1: cut after clause punctuation, keeping trailing punctuation and
/// closing brackets with the clause they end.
fn split_at_punctuation(chars: &[char]) -> Vec<&[char]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;

        let ends_clause = FULL_WIDTH_CLAUSE_PUNCTUATION.contains(&c)
            || (HALF_WIDTH_CLAUSE_PUNCTUATION.contains(&c)
                && !chars.get(i).is_some_and(|n| n.is_ascii_alphanumeric()));
        if !ends_clause {
            continue;
        }
        while i < chars.len() && (is_clause_punctuation(chars[i]) || CLOSERS.contains(&chars[i])) {
            i += 1;
        }
        if i < chars.len() && !is_legal_break(chars, i) {
            continue;
        }
        pieces.push(&chars[start..i]);
        start = i;
    }

    if start < chars.len() {
        pieces.push(&chars[start..]);
    }
    pieces
}

/// Hard cut at `max`, moved earlier (or else later) onto a legal position
fn hard_cut(chars: &[char], max: usize) -> Option<usize> {
    (1..=max)
        .rev()
        .find(|&i| is_legal_break(chars, i))
        .or_else(|| (max + 1..chars.len()).find(|&i| is_legal_break(chars, i)))
}

/// Step 2: where to cut a piece longer than `max`.
///
/// `None` means the piece is an indivisible unit and is emitted whole.
fn find_break(chars: &[char], max: usize) -> Option<usize> {
    let has_candidate = (1..chars.len()).any(|i| is_break_candidate(chars, i));
    if !has_candidate {
        debug!("No break point in {}-char piece, emitting it whole", chars.len());
        return None;
    }

    let min_search = (max * 2 / 5).max(4);
    let natural = (min_search + 1..=max).rev().find(|&i| is_break_candidate(chars, i));
    if natural.is_some() {
        return natural;
    }

    let cut = hard_cut(chars, max);
    debug!("No particle in break window, hard cut at {:?}", cut);
    cut
}

fn split_long_piece(piece: &[char], max: usize, out: &mut Vec<Vec<char>>) {
    let mut rest = piece;
    while rest.len() > max {
        match find_break(rest, max) {
            Some(pos) => {
                out.push(rest[..pos].to_vec());
                rest = &rest[pos..];
            }
            None => break,
        }
    }
    if !rest.is_empty() {
        out.push(rest.to_vec());
    }
}

/// Where to re-split a merged fragment that overflowed, so that both parts
/// fit the budget and neither is short.
///
/// Only particle breaks qualify; a merge that offers none is undone.
fn resplit_point(joined: &[char], max: usize) -> Option<usize> {
    let min_part = SHORT_FRAGMENT_CHARS + 1;
    let lower = min_part.max(joined.len().saturating_sub(max));
    let upper = max.min(joined.len().saturating_sub(min_part));
    if lower > upper {
        return None;
    }

    (lower..=upper).rev().find(|&p| is_break_candidate(joined, p))
}

/// Step 4: fold short fragments into the previous one
fn merge_short(pieces: Vec<Vec<char>>, max: usize) -> Vec<Vec<char>> {
    let mut merged: Vec<Vec<char>> = Vec::with_capacity(pieces.len());

    for piece in pieces {
        let Some(prev) = merged.last_mut() else {
            merged.push(piece);
            continue;
        };
        if piece.len() > SHORT_FRAGMENT_CHARS {
            merged.push(piece);
            continue;
        }
        if prev.len() + piece.len() <= max {
            prev.extend_from_slice(&piece);
            continue;
        }
        // An indivisible unit is never re-split
        if prev.len() > max {
            merged.push(piece);
            continue;
        }

        let mut joined = prev.clone();
        joined.extend_from_slice(&piece);
        match resplit_point(&joined, max) {
            Some(pos) => {
                let tail = joined.split_off(pos);
                *prev = joined;
                merged.push(tail);
            }
            None => merged.push(piece),
        }
    }

    merged
}

/// Cut CJK-dominant text into fragments of at most `max_chars` characters
pub fn chunk_cjk(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    for piece in split_at_punctuation(&chars) {
        split_long_piece(piece, max_chars, &mut pieces);
    }

    merge_short(pieces, max_chars)
        .into_iter()
        .map(|fragment| fragment.into_iter().collect())
        .collect()
}

/// Pack whitespace-separated words into groups of at most `max_words`
pub fn chunk_words(text: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words.max(1))
        .map(|group| group.join(" "))
        .collect()
}

/// Splits scene narration into subtitle fragments
#[derive(Debug, Clone)]
pub struct SubtitleChunker {
    max_cjk_chars: usize,
    max_words: usize,
    cjk_threshold: f64,
}

impl SubtitleChunker {
    pub fn new(max_cjk_chars: usize, max_words: usize, cjk_threshold: f64) -> Self {
        Self {
            max_cjk_chars,
            max_words,
            cjk_threshold,
        }
    }

    pub fn from_config(config: &SubtitleConfig) -> Self {
        Self::new(config.max_cjk_chars, config.max_words_per_fragment, config.cjk_threshold)
    }

    /// Classify the scene's narration and chunk it
    pub fn chunk_scene(&self, scene: &Scene) -> Vec<SubtitleFragment> {
        let cjk = is_cjk_dominant(&scene.narration_text, self.cjk_threshold);
        self.chunk(scene.index, &scene.narration_text, cjk)
    }

    /// Chunk text whose script class is already known.
    ///
    /// Fragment weight is the character count for CJK text and the word
    /// count otherwise.
    pub fn chunk(&self, scene_index: usize, text: &str, cjk: bool) -> Vec<SubtitleFragment> {
        if cjk {
            chunk_cjk(text, self.max_cjk_chars)
                .into_iter()
                .map(|text| SubtitleFragment {
                    scene_index,
                    char_weight: text.chars().count(),
                    text,
                })
                .collect()
        } else {
            chunk_words(text, self.max_words)
                .into_iter()
                .map(|text| SubtitleFragment {
                    scene_index,
                    char_weight: text.split_whitespace().count(),
                    text,
                })
                .collect()
        }
    }
}
