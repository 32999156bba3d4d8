use log::{debug, warn};

use super::SubtitleFragment;
use crate::subtitle_processor::SubtitleEntry;

// @module: Proportional subtitle timing

// Slack for float comparisons against the minimum display time
const EPSILON: f64 = 1e-9;

/// Durations for the fragments of one scene
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Seconds per fragment, in fragment order
    pub durations: Vec<f64>,
    /// True when the audio was too short and durations were split equally
    pub degraded: bool,
}

/// Split `total_secs` across fragments in proportion to their weights.
///
/// Fragments whose share falls below `min_secs` are raised to it and the
/// rest of the time is shared by weight among the others, repeatedly,
/// until every fragment fits. The durations always sum to `total_secs`.
/// When `total_secs` cannot cover `min_secs` for every fragment, all
/// fragments get the same duration and the result is marked degraded.
pub fn allocate_durations(weights: &[usize], total_secs: f64, min_secs: f64) -> Allocation {
    let n = weights.len();
    if n == 0 {
        return Allocation {
            durations: Vec::new(),
            degraded: false,
        };
    }

    let total_secs = total_secs.max(0.0);
    let equal = || vec![total_secs / n as f64; n];

    if total_secs + EPSILON < min_secs * n as f64 {
        return Allocation {
            durations: equal(),
            degraded: true,
        };
    }

    let mut clamped = vec![false; n];
    loop {
        let clamped_count = clamped.iter().filter(|&&c| c).count();
        let remaining = total_secs - min_secs * clamped_count as f64;
        let free_weight: usize = weights
            .iter()
            .zip(&clamped)
            .filter(|(_, c)| !**c)
            .map(|(w, _)| *w)
            .sum();
        let free_count = n - clamped_count;

        let share = |w: usize| {
            if free_weight == 0 {
                remaining / free_count as f64
            } else {
                remaining * w as f64 / free_weight as f64
            }
        };

        let mut newly_clamped = false;
        for i in 0..n {
            if !clamped[i] && share(weights[i]) + EPSILON < min_secs {
                clamped[i] = true;
                newly_clamped = true;
            }
        }

        if !newly_clamped {
            let durations = (0..n)
                .map(|i| if clamped[i] { min_secs } else { share(weights[i]) })
                .collect();
            return Allocation {
                durations,
                degraded: false,
            };
        }
    }
}

// Slack when flooring millisecond targets that float error put a hair low
const MS_SLACK: f64 = 1e-6;

fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

/// Turn second durations into whole milliseconds summing to `total_ms`.
///
/// Every duration is floored and raised to `min_ms`; the milliseconds left
/// over go to the largest remainders first. Overshoot from the minimum is
/// taken back from the longest durations that are above it.
fn distribute_millis(durations: &[f64], total_ms: u64, min_ms: u64) -> Vec<u64> {
    let n = durations.len();
    if n == 0 {
        return Vec::new();
    }

    let targets: Vec<f64> = durations.iter().map(|d| (d * 1000.0).max(0.0)).collect();
    let mut millis: Vec<u64> = targets
        .iter()
        .map(|t| ((t + MS_SLACK).floor() as u64).max(min_ms))
        .collect();
    let mut assigned: u64 = millis.iter().sum();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let rest_a = targets[a] - millis[a] as f64;
        let rest_b = targets[b] - millis[b] as f64;
        rest_b.total_cmp(&rest_a)
    });
    while assigned < total_ms {
        for &i in &order {
            if assigned == total_ms {
                break;
            }
            millis[i] += 1;
            assigned += 1;
        }
    }

    while assigned > total_ms {
        let longest = (0..n)
            .filter(|&i| millis[i] > min_ms)
            .max_by_key(|&i| millis[i])
            .or_else(|| (0..n).filter(|&i| millis[i] > 0).max_by_key(|&i| millis[i]));
        let Some(i) = longest else {
            break;
        };
        millis[i] -= 1;
        assigned -= 1;
    }

    millis
}

/// Places fragments on one global timeline, scene after scene.
///
/// Each scene starts where the previous one ended, so the timeline's
/// length is the sum of all scene audio durations, each rounded once to
/// whole milliseconds.
#[derive(Debug, Clone)]
pub struct TimingAllocator {
    min_display_secs: f64,
    cursor_ms: u64,
    next_seq: usize,
}

impl TimingAllocator {
    pub fn new(min_display_secs: f64) -> Self {
        Self {
            min_display_secs,
            cursor_ms: 0,
            next_seq: 1,
        }
    }

    /// Start of the next scene, in seconds
    pub fn cursor_secs(&self) -> f64 {
        self.cursor_ms as f64 / 1000.0
    }

    /// Timed entries for one scene's fragments.
    ///
    /// Timing is computed in whole milliseconds: entries keep the minimum
    /// display time whenever the scene is long enough for it, and the last
    /// entry of the scene ends exactly at the scene's end.
    pub fn allocate(&mut self, fragments: &[SubtitleFragment], scene_duration_secs: f64) -> Vec<SubtitleEntry> {
        let scene_start_ms = self.cursor_ms;
        let total_ms = secs_to_ms(scene_duration_secs);
        let scene_end_ms = scene_start_ms + total_ms;
        self.cursor_ms = scene_end_ms;

        if fragments.is_empty() {
            return Vec::new();
        }

        let weights: Vec<usize> = fragments.iter().map(|f| f.char_weight).collect();
        let allocation = allocate_durations(&weights, total_ms as f64 / 1000.0, self.min_display_secs);
        let min_ms = if allocation.degraded {
            warn!(
                "Scene {} audio ({:.2}s) is too short for {} subtitle(s) of {:.1}s; using equal durations",
                fragments[0].scene_index,
                scene_duration_secs,
                fragments.len(),
                self.min_display_secs
            );
            0
        } else {
            (self.min_display_secs * 1000.0 - MS_SLACK).ceil().max(0.0) as u64
        };
        let millis = distribute_millis(&allocation.durations, total_ms, min_ms);

        let mut entries = Vec::with_capacity(fragments.len());
        let mut start = scene_start_ms;
        for (fragment, duration) in fragments.iter().zip(millis) {
            let end = start + duration;
            entries.push(SubtitleEntry {
                seq_num: self.next_seq,
                start_time_ms: start,
                end_time_ms: end,
                text: fragment.text.clone(),
                scene_index: Some(fragment.scene_index),
            });
            self.next_seq += 1;
            start = end;
        }

        debug!(
            "Timed {} subtitle(s) for scene {} between {}ms and {}ms",
            entries.len(),
            fragments[0].scene_index,
            scene_start_ms,
            scene_end_ms
        );
        entries
    }
}
