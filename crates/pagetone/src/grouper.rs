//! Frequency grouper
//!
//! Merges the [`Frame`] sequence into runs of one continuous tone.
//!
//! ```txt
//! frames   1000 1001  999  OFF  OFF 1500 1502 1499 1500
//! groups  |---- ON 1000 ---|-OFF---|------ ON 1500 -----|
//! ```
//!
//! ON frames join the open group while they stay within a percentage
//! tolerance, and optionally an absolute cap, of the group's running
//! mean. Short OFF runs may be bridged. A large single-frame step can
//! be required to persist for a few frames before it splits the group;
//! steps which revert are folded back into the group as transients.
//!
//! The resulting [`Group`]s tile the timeline exactly: each group
//! ends where the next one begins.

use serde::Serialize;

#[cfg(not(test))]
use log::{debug, trace};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as trace;

use crate::spectrum::Frame;
use crate::stats;

/// Tolerance on times derived from sample indices (seconds)
pub(crate) const TIME_EPSILON: f64 = 1.0e-6;

/// A run of consecutive frames
///
/// An ON group has at least one frequency sample. An OFF group
/// has none.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Group {
    /// Start of the first frame (seconds)
    pub start: f64,

    /// End of the last frame (seconds)
    pub end: f64,

    /// Index of the first frame
    pub first_frame: usize,

    /// Number of frames, including any bridged OFF frames
    pub frame_count: usize,

    /// Frequencies of the member ON frames, in time order (Hz)
    pub frequencies: Vec<f32>,
}

impl Group {
    /// True if the group is a tone
    #[inline]
    pub fn is_on(&self) -> bool {
        !self.frequencies.is_empty()
    }

    /// Duration (seconds)
    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Representative frequency: the median frequency sample
    ///
    /// `None` for an OFF group.
    pub fn frequency(&self) -> Option<f32> {
        stats::median(&self.frequencies)
    }

    /// Internal frequency spread (Hz)
    ///
    /// The distance between the 10th and 90th percentiles of the
    /// frequency samples. Zero for an OFF group.
    pub fn spread(&self) -> f32 {
        match (
            stats::percentile(&self.frequencies, 10.0),
            stats::percentile(&self.frequencies, 90.0),
        ) {
            (Some(lo), Some(hi)) => hi - lo,
            _ => 0.0f32,
        }
    }
}

/// Builds [`Group`]s from [`Frame`]s
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyGrouper {
    tolerance: f32,
    merge_gap: f64,
    abs_cap_hz: Option<f32>,
    force_split_step_hz: Option<f32>,
    lookahead: usize,
}

impl FrequencyGrouper {
    /// New grouper
    ///
    /// * `matching_threshold`: tolerance, in percent of the group's
    ///   running mean frequency
    /// * `merge_short_gaps_ms`: OFF runs no longer than this are
    ///   bridged. Zero disables bridging.
    /// * `abs_cap_hz`: if set, also caps the tolerance in Hz
    /// * `force_split_step_hz`: if set, single-frame steps larger than
    ///   this must be confirmed by `lookahead` following frames
    pub fn new(
        matching_threshold: f32,
        merge_short_gaps_ms: f64,
        abs_cap_hz: Option<f32>,
        force_split_step_hz: Option<f32>,
        lookahead: usize,
    ) -> Self {
        Self {
            tolerance: matching_threshold / 100.0f32,
            merge_gap: merge_short_gaps_ms / 1000.0f64,
            abs_cap_hz,
            force_split_step_hz,
            lookahead,
        }
    }

    /// Group the frame sequence
    pub fn group(&self, frames: &[Frame]) -> Vec<Group> {
        let mut acc = Accumulator::default();

        let mut i = 0;
        while i < frames.len() {
            i = match frames[i].frequency {
                None => self.off_run(&mut acc, frames, i),
                Some(freq) => self.on_frame(&mut acc, frames, i, freq),
            };
        }

        let out = acc.finish();
        debug!(
            "grouper: {} frames → {} groups ({} ON)",
            frames.len(),
            out.len(),
            out.iter().filter(|g| g.is_on()).count()
        );
        out
    }

    // Handle the OFF run which begins at `i`
    //
    // Returns the index of the next ON frame.
    fn off_run(&self, acc: &mut Accumulator, frames: &[Frame], i: usize) -> usize {
        let next_on = frames[i..]
            .iter()
            .position(|fr| fr.is_on())
            .map(|p| i + p)
            .unwrap_or(frames.len());
        let off = &frames[i..next_on];
        let gap = off[off.len() - 1].end - off[0].start;

        let bridge = match (&acc.open, frames.get(next_on).and_then(|fr| fr.frequency)) {
            (Some(open), Some(next_freq)) => {
                self.merge_gap > 0.0
                    && gap <= self.merge_gap + TIME_EPSILON
                    && self.consistent(open.mean(), next_freq)
            }
            _ => false,
        };

        if bridge {
            acc.extend_time(off);
        } else {
            acc.push_off(off);
        }
        next_on
    }

    // Handle the ON frame at `i`, with frequency `freq`
    //
    // Returns the index of the next frame to process.
    fn on_frame(&self, acc: &mut Accumulator, frames: &[Frame], i: usize, freq: f32) -> usize {
        let open = match &acc.open {
            Some(open) => open,
            None => {
                acc.open_with(&frames[i], freq);
                return i + 1;
            }
        };

        if let Some(step) = self.force_split_step_hz {
            if (freq - open.last_accepted).abs() > step {
                return self.confirm_step(acc, frames, i, freq, step);
            }
        }

        if self.consistent(open.mean(), freq) {
            acc.append(&frames[i], freq, true);
        } else {
            acc.open_with(&frames[i], freq);
        }
        i + 1
    }

    // Check that the step to `candidate` at frame `i` persists
    fn confirm_step(
        &self,
        acc: &mut Accumulator,
        frames: &[Frame],
        i: usize,
        candidate: f32,
        step: f32,
    ) -> usize {
        let mut j = i + 1;
        while j <= i + self.lookahead {
            let confirms = frames
                .get(j)
                .and_then(|fr| fr.frequency)
                .map(|f| (f - candidate).abs() <= step && self.consistent(candidate, f))
                .unwrap_or(false);
            if !confirms {
                break;
            }
            j += 1;
        }

        if j > i + self.lookahead {
            trace!(
                "grouper: confirmed step to {:.1} Hz at {:.3} s",
                candidate,
                frames[i].start
            );
            acc.open_with(&frames[i], candidate);
            i + 1
        } else {
            trace!(
                "grouper: folded {} transient frame(s) at {:.3} s",
                j - i,
                frames[i].start
            );
            for fr in &frames[i..j] {
                if let Some(f) = fr.frequency {
                    acc.append(fr, f, false);
                }
            }
            j
        }
    }

    // True if `freq` may join a group with the given reference frequency
    fn consistent(&self, reference: f32, freq: f32) -> bool {
        if !(reference > 0.0) {
            return false;
        }

        let dev = (freq - reference).abs();
        if dev > self.tolerance * reference {
            return false;
        }
        match self.abs_cap_hz {
            Some(cap) => dev <= cap,
            None => true,
        }
    }
}

impl Default for FrequencyGrouper {
    fn default() -> Self {
        Self::new(2.5, 0.0, None, None, 2)
    }
}

// Scan state: closed groups plus the ON group being built
#[derive(Clone, Debug, Default)]
struct Accumulator {
    out: Vec<Group>,
    open: Option<OpenGroup>,
}

#[derive(Clone, Debug)]
struct OpenGroup {
    group: Group,

    // running sum and count of the accepted frequencies; folded
    // transients are members but never move the reference
    sum: f64,
    accepted: usize,

    // last frequency accepted without folding
    last_accepted: f32,
}

impl OpenGroup {
    fn mean(&self) -> f32 {
        (self.sum / usize::max(self.accepted, 1) as f64) as f32
    }
}

impl Accumulator {
    // close any open group and start a new one with `frame`
    fn open_with(&mut self, frame: &Frame, freq: f32) {
        self.close();
        self.open = Some(OpenGroup {
            group: Group {
                start: frame.start,
                end: frame.end,
                first_frame: frame.index,
                frame_count: 1,
                frequencies: vec![freq],
            },
            sum: freq as f64,
            accepted: 1,
            last_accepted: freq,
        });
    }

    // add `frame` to the open group
    //
    // Only `accepted` frames count toward the running mean.
    fn append(&mut self, frame: &Frame, freq: f32, accepted: bool) {
        if let Some(open) = &mut self.open {
            open.group.end = frame.end;
            open.group.frame_count += 1;
            open.group.frequencies.push(freq);
            if accepted {
                open.sum += freq as f64;
                open.accepted += 1;
                open.last_accepted = freq;
            }
        }
    }

    // stretch the open group over bridged OFF frames
    fn extend_time(&mut self, off: &[Frame]) {
        if let (Some(open), Some(last)) = (&mut self.open, off.last()) {
            open.group.end = last.end;
            open.group.frame_count += off.len();
        }
    }

    // close any open group and emit an OFF group
    fn push_off(&mut self, off: &[Frame]) {
        self.close();
        if let (Some(first), Some(last)) = (off.first(), off.last()) {
            self.out.push(Group {
                start: first.start,
                end: last.end,
                first_frame: first.index,
                frame_count: off.len(),
                frequencies: Vec::new(),
            });
        }
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            self.out.push(open.group);
        }
    }

    fn finish(mut self) -> Vec<Group> {
        self.close();
        self.out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    pub(crate) const HOP: f64 = 0.05;

    /// Synthetic frames of `HOP` seconds each
    pub(crate) fn make_frames(freqs: &[Option<f32>]) -> Vec<Frame> {
        freqs
            .iter()
            .enumerate()
            .map(|(index, frequency)| Frame {
                index,
                start: index as f64 * HOP,
                end: (index + 1) as f64 * HOP,
                frequency: *frequency,
                magnitude: if frequency.is_some() { 1.0 } else { 0.0 },
            })
            .collect()
    }

    fn on(freqs: &[f32]) -> Vec<Option<f32>> {
        freqs.iter().map(|f| Some(*f)).collect()
    }

    fn assert_tiles(groups: &[Group], frames: &[Frame]) {
        assert_eq!(groups[0].start, frames[0].start);
        assert_eq!(groups[groups.len() - 1].end, frames[frames.len() - 1].end);
        for pair in groups.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        let count: usize = groups.iter().map(|g| g.frame_count).sum();
        assert_eq!(count, frames.len());
    }

    #[test]
    fn test_group_stats() {
        let grp = Group {
            start: 0.0,
            end: 0.5,
            first_frame: 0,
            frame_count: 10,
            frequencies: vec![
                1000.0, 1001.0, 999.0, 1030.0, 1000.0, 1000.5, 999.5, 1000.0, 1001.0, 999.0,
            ],
        };
        assert!(grp.is_on());
        assert_approx_eq!(grp.duration(), 0.5);
        assert_eq!(grp.frequency(), Some(1000.0));
        assert_eq!(grp.spread(), 2.0);

        let off = Group {
            frequencies: Vec::new(),
            ..grp
        };
        assert!(!off.is_on());
        assert_eq!(off.frequency(), None);
        assert_eq!(off.spread(), 0.0);
    }

    #[test]
    fn test_tolerance() {
        let grouper = FrequencyGrouper::new(2.5, 0.0, None, None, 2);

        let frames = make_frames(&on(&[1000.0, 1000.0 * (1.0 + 0.025 - 0.001)]));
        assert_eq!(grouper.group(&frames).len(), 1);

        let frames = make_frames(&on(&[1000.0, 1000.0 * (1.0 + 0.025 + 0.001)]));
        let groups = grouper.group(&frames);
        assert_eq!(groups.len(), 2);
        assert_tiles(&groups, &frames);
    }

    #[test]
    fn test_abs_cap() {
        let grouper = FrequencyGrouper::new(5.0, 0.0, Some(20.0), None, 2);

        let frames = make_frames(&on(&[1000.0, 1000.0, 1015.0]));
        assert_eq!(grouper.group(&frames).len(), 1);

        let frames = make_frames(&on(&[1000.0, 1000.0, 1025.0]));
        let groups = grouper.group(&frames);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].frequencies, vec![1025.0]);

        // without the cap, 2.5% is inside 5%
        let uncapped = FrequencyGrouper::new(5.0, 0.0, None, None, 2);
        assert_eq!(uncapped.group(&frames).len(), 1);
    }

    #[test]
    fn test_forced_split_folds_transient() {
        let grouper = FrequencyGrouper::new(2.5, 0.0, None, Some(18.0), 2);

        let frames = make_frames(&on(&[1000.0, 1000.0, 1030.0, 1000.0, 1000.0]));
        let groups = grouper.group(&frames);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].frame_count, 5);
        assert_eq!(groups[0].frequency(), Some(1000.0));

        // transient at end of input also folds
        let frames = make_frames(&on(&[1000.0, 1000.0, 1000.0, 1030.0]));
        assert_eq!(grouper.group(&frames).len(), 1);
    }

    #[test]
    fn test_large_transient_keeps_reference() {
        let grouper = FrequencyGrouper::new(2.5, 0.0, None, Some(18.0), 2);

        // after a short group
        let frames = make_frames(&on(&[1000.0, 1000.0, 1100.0, 1000.0, 1000.0]));
        let groups = grouper.group(&frames);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].frame_count, 5);
        assert_eq!(groups[0].frequency(), Some(1000.0));
        assert_tiles(&groups, &frames);

        // after a long group
        let mut freqs = vec![1000.0f32; 20];
        freqs.push(1600.0);
        freqs.extend_from_slice(&[1000.0; 5]);
        let frames = make_frames(&on(&freqs));
        let groups = grouper.group(&frames);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].frame_count, 26);
        assert_eq!(groups[0].frequency(), Some(1000.0));

        // two separate transients
        let frames = make_frames(&on(&[
            1000.0, 1000.0, 1100.0, 1000.0, 1000.0, 900.0, 1000.0, 1000.0,
        ]));
        assert_eq!(grouper.group(&frames).len(), 1);
    }

    #[test]
    fn test_forced_split_confirmed() {
        let grouper = FrequencyGrouper::new(2.5, 0.0, None, Some(18.0), 2);

        let frames = make_frames(&on(&[1000.0, 1000.0, 1030.0, 1030.0, 1030.0, 1030.0]));
        let groups = grouper.group(&frames);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].frequencies, vec![1000.0, 1000.0]);
        assert_eq!(groups[1].frequencies, vec![1030.0; 4]);
        assert_tiles(&groups, &frames);

        // a 20 Hz step is within 2.5% tolerance but still splits
        let frames = make_frames(&on(&[1000.0, 1000.0, 1020.0, 1020.0, 1020.0]));
        assert_eq!(grouper.group(&frames).len(), 2);
    }

    #[test]
    fn test_off_runs() {
        let grouper = FrequencyGrouper::new(2.5, 0.0, None, None, 2);
        let frames = make_frames(&[
            None,
            Some(1000.0),
            Some(1000.0),
            None,
            None,
            Some(1000.0),
            None,
        ]);
        let groups = grouper.group(&frames);
        let pattern: Vec<bool> = groups.iter().map(|g| g.is_on()).collect();
        assert_eq!(pattern, vec![false, true, false, true, false]);
        assert_eq!(groups[2].frame_count, 2);
        assert_tiles(&groups, &frames);
    }

    #[test]
    fn test_bridge_short_gaps() {
        let grouper = FrequencyGrouper::new(2.5, 100.0, None, None, 2);

        // two-frame gap is bridged
        let frames = make_frames(&[Some(1000.0), None, None, Some(1001.0)]);
        let groups = grouper.group(&frames);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].frequencies, vec![1000.0, 1001.0]);
        assert_eq!(groups[0].frame_count, 4);
        assert_approx_eq!(groups[0].duration(), 4.0 * HOP);

        // three-frame gap is not
        let frames = make_frames(&[Some(1000.0), None, None, None, Some(1000.0)]);
        assert_eq!(grouper.group(&frames).len(), 3);

        // different tone after the gap is not
        let frames = make_frames(&[Some(1000.0), None, Some(1500.0)]);
        assert_eq!(grouper.group(&frames).len(), 3);

        // trailing OFF run is never bridged
        let frames = make_frames(&[Some(1000.0), None]);
        assert_eq!(grouper.group(&frames).len(), 2);
    }

    #[test]
    fn test_empty() {
        assert!(FrequencyGrouper::default().group(&[]).is_empty());
    }
}
