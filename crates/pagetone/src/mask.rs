//! Claimed time spans
//!
//! Classifiers run one after another over the same groups. When a
//! classifier accepts a match, it *claims* the span of time which
//! the match covers. Lower-priority classifiers must skip any group
//! which touches a claimed span, so that one physical tone is never
//! reported twice.
//!
//! Spans are half-open, `[start, end)`. Two spans which merely touch
//! at an endpoint do not overlap.

use serde::Serialize;
use thiserror::Error;

#[cfg(not(test))]
use log::trace;

#[cfg(test)]
use std::println as trace;

use crate::event::ToneKind;

/// A span of time owned by one accepted match
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MaskedInterval {
    /// Start (seconds, inclusive)
    pub start: f64,

    /// End (seconds, exclusive)
    pub end: f64,

    /// Classifier which claimed the span
    pub owner: ToneKind,
}

impl MaskedInterval {
    /// True if this interval shares any instant with `[start, end)`
    #[inline]
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start < end && start < self.end
    }
}

/// A claim overlapped an existing interval
#[derive(Error, Clone, Debug, PartialEq)]
#[error("span [{start:.3}, {end:.3}) overlaps span already claimed by {}", .existing.owner)]
pub struct MaskError {
    /// Start of the rejected claim
    pub start: f64,

    /// End of the rejected claim
    pub end: f64,

    /// The interval it collided with
    pub existing: MaskedInterval,
}

/// Set of pairwise-disjoint claimed spans
///
/// The masker only ever grows. Intervals are kept sorted by
/// start time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Masker {
    intervals: Vec<MaskedInterval>,
}

impl Masker {
    /// New masker with nothing claimed
    pub fn new() -> Self {
        Self::default()
    }

    /// True if any part of `[start, end)` is already claimed
    ///
    /// An empty or inverted span is never claimed.
    pub fn claimed(&self, start: f64, end: f64) -> bool {
        if !(start < end) {
            return false;
        }
        self.find_overlap(start, end).is_some()
    }

    /// Claim `[start, end)` for `owner`
    ///
    /// Fails if the span overlaps an existing interval. Callers
    /// should have checked [`claimed()`](Masker::claimed) for every
    /// group they consume, so an error here indicates a bug in the
    /// calling classifier.
    pub fn claim(&mut self, start: f64, end: f64, owner: ToneKind) -> Result<(), MaskError> {
        if let Some(existing) = self.find_overlap(start, end) {
            return Err(MaskError {
                start,
                end,
                existing: *existing,
            });
        }

        trace!("mask: {} claims [{:.3}, {:.3})", owner, start, end);
        let pos = self.intervals.partition_point(|iv| iv.start < start);
        self.intervals.insert(pos, MaskedInterval { start, end, owner });
        Ok(())
    }

    /// All intervals, in time order
    pub fn intervals(&self) -> &[MaskedInterval] {
        &self.intervals
    }

    /// Intervals claimed by `owner`, in time order
    pub fn intervals_by_owner(
        &self,
        owner: ToneKind,
    ) -> impl Iterator<Item = &MaskedInterval> + '_ {
        self.intervals.iter().filter(move |iv| iv.owner == owner)
    }

    /// Number of claimed intervals
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// True if nothing is claimed
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    // first interval which overlaps [start, end)
    fn find_overlap(&self, start: f64, end: f64) -> Option<&MaskedInterval> {
        // intervals are disjoint and sorted, so their ends are sorted too
        let first = self.intervals.partition_point(|iv| iv.end <= start);
        self.intervals[first..]
            .iter()
            .take_while(|iv| iv.start < end)
            .find(|iv| iv.overlaps(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_query() {
        let mut mask = Masker::new();
        assert!(!mask.claimed(0.0, 100.0));

        mask.claim(2.0, 4.0, ToneKind::TwoTone).expect("claim");
        mask.claim(10.0, 12.0, ToneKind::LongTone).expect("claim");
        mask.claim(5.0, 6.0, ToneKind::Pulsed).expect("claim");
        assert_eq!(mask.len(), 3);

        // sorted by start
        let starts: Vec<f64> = mask.intervals().iter().map(|iv| iv.start).collect();
        assert_eq!(starts, vec![2.0, 5.0, 10.0]);

        assert!(mask.claimed(3.0, 3.5));
        assert!(mask.claimed(0.0, 2.5));
        assert!(mask.claimed(11.9, 20.0));
        assert!(!mask.claimed(4.0, 5.0));
        assert!(!mask.claimed(6.0, 10.0));
        assert!(!mask.claimed(12.0, 13.0));
        assert!(!mask.claimed(3.0, 3.0));
    }

    #[test]
    fn test_touching_is_not_overlap() {
        let mut mask = Masker::new();
        mask.claim(1.0, 2.0, ToneKind::HiLow).expect("claim");
        mask.claim(2.0, 3.0, ToneKind::HiLow).expect("claim");
        mask.claim(0.5, 1.0, ToneKind::Pulsed).expect("claim");
        assert_eq!(mask.len(), 3);
    }

    #[test]
    fn test_overlapping_claim_fails() {
        let mut mask = Masker::new();
        mask.claim(1.0, 2.0, ToneKind::TwoTone).expect("claim");
        let err = mask
            .claim(1.5, 2.5, ToneKind::LongTone)
            .expect_err("overlap accepted");
        assert_eq!(err.existing.owner, ToneKind::TwoTone);
        assert_eq!(mask.len(), 1);

        // enclosing span also collides
        assert!(mask.claim(0.0, 5.0, ToneKind::LongTone).is_err());
    }

    #[test]
    fn test_by_owner() {
        let mut mask = Masker::new();
        mask.claim(0.0, 1.0, ToneKind::Pulsed).expect("claim");
        mask.claim(1.0, 2.0, ToneKind::LongTone).expect("claim");
        mask.claim(3.0, 4.0, ToneKind::Pulsed).expect("claim");

        let pulsed: Vec<f64> = mask
            .intervals_by_owner(ToneKind::Pulsed)
            .map(|iv| iv.start)
            .collect();
        assert_eq!(pulsed, vec![0.0, 3.0]);
        assert_eq!(mask.intervals_by_owner(ToneKind::HiLow).count(), 0);
    }
}
