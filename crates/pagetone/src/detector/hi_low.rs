//! Hi-low warble classifier
//!
//! A warble alternates strictly between two *anchor* frequencies.
//! The first two member tones set the anchors; every later member
//! must match the anchor of its parity.
//!
//! ```txt
//! anchors   lo    hi    lo    hi    lo    hi
//! groups  |473| |810| |473| |810| |473| |810|
//!                                          alternations = 5
//! ```

use arrayvec::ArrayVec;

#[cfg(not(test))]
use log::{debug, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as warn;

use super::{at_most, next_on};
use crate::event::{round_hz, round_secs, HiLowEvent, ToneKind};
use crate::grouper::Group;
use crate::mask::Masker;
use crate::stats;

/// Finds two tones alternating repeatedly
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HiLowDetector {
    pub(crate) max_interval: f64,
    pub(crate) min_alternations: usize,
    pub(crate) bw_hz: f32,
    pub(crate) min_separation_hz: f32,
}

// Member tones of one candidate warble
#[derive(Clone, Debug)]
struct Run {
    anchors: ArrayVec<f32, 2>,
    members: Vec<usize>,
}

impl Run {
    fn alternations(&self) -> usize {
        self.members.len().saturating_sub(1)
    }
}

impl HiLowDetector {
    pub(crate) fn detect(&self, groups: &[Group], masker: &mut Masker) -> Vec<HiLowEvent> {
        let mut out = Vec::new();

        let mut i = 0;
        while i < groups.len() {
            let run = match self.run_from(groups, masker, i) {
                Some(run) if run.alternations() >= self.min_alternations => run,
                _ => {
                    i += 1;
                    continue;
                }
            };

            let first = &groups[run.members[0]];
            let last_idx = run.members[run.members.len() - 1];
            let last = &groups[last_idx];
            if let Err(err) = masker.claim(first.start, last.end, ToneKind::HiLow) {
                warn!("hi-low: {}", err);
                i = last_idx + 1;
                continue;
            }

            let (low, high) = self.anchor_medians(groups, &run);
            let evt = HiLowEvent {
                tone_id: ToneKind::HiLow.tone_id(out.len() + 1),
                freq_pair: [round_hz(low), round_hz(high)],
                alternations: run.alternations(),
                length: round_secs(last.end - first.start),
                start: round_secs(first.start),
                end: round_secs(last.end),
            };
            debug!(
                "hi-low: {} {:.1}/{:.1} Hz, {} alternations at {:.3} s",
                evt.tone_id,
                low,
                high,
                evt.alternations,
                first.start
            );
            out.push(evt);
            i = last_idx + 1;
        }

        out
    }

    // Longest strictly-alternating run which begins at group `i`
    fn run_from(&self, groups: &[Group], masker: &Masker, i: usize) -> Option<Run> {
        let first = &groups[i];
        let f0 = self.member_frequency(first)?;
        if masker.claimed(first.start, first.end) {
            return None;
        }

        let mut run = Run {
            anchors: ArrayVec::new(),
            members: vec![i],
        };
        run.anchors.push(f0);

        let mut prev = i;
        while let Some(j) = next_on(groups, prev + 1) {
            let grp = &groups[j];
            if !at_most(grp.start - groups[prev].end, self.max_interval)
                || masker.claimed(groups[prev].end, grp.end)
            {
                break;
            }

            let freq = match self.member_frequency(grp) {
                Some(f) => f,
                None => break,
            };

            if run.anchors.len() < 2 {
                if (freq - f0).abs() < self.min_separation_hz {
                    break;
                }
                run.anchors.push(freq);
            } else {
                let anchor = run.anchors[run.members.len() % 2];
                if (freq - anchor).abs() > self.bw_hz {
                    break;
                }
            }

            run.members.push(j);
            prev = j;
        }

        Some(run)
    }

    // Representative frequency of a stable member tone
    fn member_frequency(&self, grp: &Group) -> Option<f32> {
        match grp.frequency() {
            Some(f) if grp.spread() <= self.bw_hz => Some(f),
            _ => None,
        }
    }

    // Median frequency of the members at each anchor, as (low, high)
    fn anchor_medians(&self, groups: &[Group], run: &Run) -> (f32, f32) {
        let mut by_anchor: [Vec<f32>; 2] = [Vec::new(), Vec::new()];
        for (n, idx) in run.members.iter().enumerate() {
            if let Some(f) = groups[*idx].frequency() {
                by_anchor[n % 2].push(f);
            }
        }

        let a = stats::median(&by_anchor[0]).unwrap_or(run.anchors[0]);
        let b = stats::median(&by_anchor[1]).unwrap_or(a);
        (f32::min(a, b), f32::max(a, b))
    }
}
