/*!
 * Property-style tests for subtitle chunking and timing allocation
 */

use talecast::language_utils::{classify, is_cjk_dominant};
use talecast::subtitle::chunker::chunk_cjk;
use talecast::subtitle::{SubtitleChunker, SubtitleFragment, allocate_durations};

const MAX_CHARS: usize = 22;

// Characters no fragment may start with
const MUST_NOT_LEAD: [char; 8] = ['ー', 'ッ', 'ャ', 'ュ', 'ョ', 'ぁ', '、', '。'];

const SAMPLE_NARRATIONS: [&str; 5] = [
    "むかしむかし、ある山のふもとに、とても働き者のおじいさんとおばあさんが住んでいました。",
    "おじいさんは毎朝早くから山へ柴刈りに出かけ、おばあさんは川へ洗濯に行きました。",
    "「ちょっと待ってください！」と少女は叫びましたが、列車はもう動き出していました。",
    "コーヒーショップのカウンターでチョコレートケーキを注文したら、ショートケーキが出てきた。",
    "この話はここで終わりです。",
];

#[test]
fn test_chunkCjk_forSampleNarrations_shouldConcatenateToInput() {
    for text in SAMPLE_NARRATIONS {
        let fragments = chunk_cjk(text, MAX_CHARS);
        assert_eq!(fragments.concat(), text);
    }
}

#[test]
fn test_chunkCjk_forSampleNarrations_shouldRespectBudget() {
    for text in SAMPLE_NARRATIONS {
        for fragment in chunk_cjk(text, MAX_CHARS) {
            assert!(fragment.chars().count() <= MAX_CHARS, "{:?} is too long", fragment);
        }
    }
}

#[test]
fn test_chunkCjk_forSampleNarrations_shouldNotLeadWithForbiddenCharacters() {
    for text in SAMPLE_NARRATIONS {
        for fragment in chunk_cjk(text, MAX_CHARS).iter().skip(1) {
            let first = fragment.chars().next().unwrap();
            assert!(!MUST_NOT_LEAD.contains(&first), "{:?} starts with {}", fragment, first);
        }
    }
}

#[test]
fn test_chunkCjk_withSmallTsuNearLimit_shouldNeverLeadFragment() {
    for position in 14..30 {
        let mut chars = vec!['字'; 36];
        chars[30] = 'を';
        chars[position] = 'ッ';
        let text: String = chars.iter().collect();

        let fragments = chunk_cjk(&text, MAX_CHARS);

        assert_eq!(fragments.concat(), text);
        for fragment in fragments.iter().skip(1) {
            assert!(!fragment.starts_with('ッ'), "position {}: {:?}", position, fragments);
        }
    }
}

#[test]
fn test_chunkCjk_withThirtyCharsWithoutBreaks_shouldEmitWhole() {
    let text: String = std::iter::repeat('漢').take(30).collect();
    assert_eq!(chunk_cjk(&text, MAX_CHARS), vec![text.clone()]);
}

#[test]
fn test_chunk_withMixedScriptBelowThreshold_shouldUseWords() {
    let text = "Meet me at 東京 station tomorrow around noon please";
    assert!(!is_cjk_dominant(text, 0.2));

    let chunker = SubtitleChunker::new(MAX_CHARS, 6, 0.2);
    let fragments = chunker.chunk(0, text, false);

    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0].char_weight, 6);
    assert_eq!(fragments[1].char_weight, 3);
}

#[test]
fn test_classify_withThresholdJustAboveRatio_shouldNotBeCjkDominant() {
    let profile = classify("猫abcd", 0.20001);
    assert!((profile.cjk_ratio() - 0.2).abs() < 1e-12);
    assert!(!profile.cjk_dominant);
}

#[test]
fn test_allocateDurations_shouldSumToTotalAndRespectMinimum() {
    let weights = [20, 3, 15, 8];

    let allocation = allocate_durations(&weights, 9.0, 1.0);

    let sum: f64 = allocation.durations.iter().sum();
    assert!((sum - 9.0).abs() < 1e-9);
    assert!(allocation.durations.iter().all(|&d| d >= 1.0 - 1e-9));
    assert!(!allocation.degraded);
    assert!(allocation.durations[0] > allocation.durations[3]);
}

#[test]
fn test_allocateDurations_withTooShortAudio_shouldSplitEqually() {
    let allocation = allocate_durations(&[10, 2, 7], 1.5, 1.0);

    assert!(allocation.degraded);
    for duration in &allocation.durations {
        assert!((duration - 0.5).abs() < 1e-9);
    }
}

#[test]
fn test_fragment_shouldSerializeAsJson() {
    let fragment = SubtitleFragment {
        scene_index: 1,
        text: "はい".to_string(),
        char_weight: 2,
    };

    let json = serde_json::to_string(&fragment).unwrap();

    assert!(json.contains("\"char_weight\":2"));
}
