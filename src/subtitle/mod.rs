/*!
 * Subtitle generation: chunking narration into fragments and placing the
 * fragments on the narration timeline.
 */

use serde::{Deserialize, Serialize};

pub mod chunker;
pub mod timing;

pub use chunker::SubtitleChunker;
pub use timing::{Allocation, TimingAllocator, allocate_durations};

/// A display-sized slice of one scene's narration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleFragment {
    /// Scene the fragment belongs to
    pub scene_index: usize,
    /// Fragment text
    pub text: String,
    /// Timing weight: characters for CJK text, words otherwise
    pub char_weight: usize,
}
