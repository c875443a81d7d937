//! Two-tone (Quick Call) classifier

#[cfg(not(test))]
use log::{debug, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as warn;

use super::{at_least, at_most, next_on};
use crate::event::{round_hz, round_secs, ToneKind, TwoToneEvent};
use crate::grouper::Group;
use crate::mask::Masker;

/// Finds tone A followed by tone B
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TwoToneDetector {
    pub(crate) tone_a_min_length: f64,
    pub(crate) tone_b_min_length: f64,
    pub(crate) max_gap: f64,
    pub(crate) bw_hz: f32,
    pub(crate) min_separation_hz: f32,
}

impl TwoToneDetector {
    /// Scan `groups` for A/B pairs
    ///
    /// A and B are consecutive ON groups, separated only by OFF
    /// groups. The first qualifying pair wins, and the scan resumes
    /// after B.
    pub(crate) fn detect(&self, groups: &[Group], masker: &mut Masker) -> Vec<TwoToneEvent> {
        let mut out = Vec::new();

        let mut i = 0;
        while i < groups.len() {
            let a = &groups[i];
            if !a.is_on() {
                i += 1;
                continue;
            }

            let j = match next_on(groups, i + 1) {
                Some(j) => j,
                None => break,
            };
            let b = &groups[j];

            let (fa, fb) = match self.pair(a, b) {
                Some(pair) if !masker.claimed(a.start, b.end) => pair,
                _ => {
                    i = j;
                    continue;
                }
            };

            if let Err(err) = masker.claim(a.start, b.end, ToneKind::TwoTone) {
                warn!("two-tone: {}", err);
                i = j;
                continue;
            }

            let evt = TwoToneEvent {
                tone_id: ToneKind::TwoTone.tone_id(out.len() + 1),
                freq_pair: [round_hz(fa), round_hz(fb)],
                tone_a_length: round_secs(a.duration()),
                tone_b_length: round_secs(b.duration()),
                start: round_secs(a.start),
                end: round_secs(b.end),
            };
            debug!(
                "two-tone: {} {:.1} Hz → {:.1} Hz at {:.3} s",
                evt.tone_id, fa, fb, a.start
            );
            out.push(evt);
            i = j + 1;
        }

        out
    }

    // Frequencies of A and B, if they qualify as a pair
    fn pair(&self, a: &Group, b: &Group) -> Option<(f32, f32)> {
        let fa = a.frequency()?;
        let fb = b.frequency()?;

        let ok = at_least(a.duration(), self.tone_a_min_length)
            && at_least(b.duration(), self.tone_b_min_length)
            && at_most(b.start - a.end, self.max_gap)
            && a.spread() <= self.bw_hz
            && b.spread() <= self.bw_hz
            && (fa - fb).abs() >= self.min_separation_hz;

        if ok {
            Some((fa, fb))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::detector::tests::{off, tone, Timeline};

    fn detector() -> TwoToneDetector {
        TwoToneDetector {
            tone_a_min_length: 0.85,
            tone_b_min_length: 2.6,
            max_gap: 0.35,
            bw_hz: 25.0,
            min_separation_hz: 40.0,
        }
    }

    #[test]
    fn test_quick_call() {
        let groups = Timeline::new()
            .push(off(0.5))
            .push(tone(1000.0, 1.0))
            .push(tone(1500.0, 3.0))
            .push(off(1.0))
            .build();

        let mut masker = Masker::new();
        let events = detector().detect(&groups, &mut masker);
        assert_eq!(events.len(), 1);

        let evt = &events[0];
        assert_eq!(evt.tone_id, "qc_1");
        assert_eq!(evt.freq_pair, [1000.0, 1500.0]);
        assert_eq!(evt.tone_a_length, 1.0);
        assert_eq!(evt.tone_b_length, 3.0);
        assert_eq!(evt.start, 0.5);
        assert_eq!(evt.end, 4.5);
        assert_eq!(masker.intervals_by_owner(ToneKind::TwoTone).count(), 1);
    }

    #[test]
    fn test_tone_a_boundary() {
        // exactly at the minimum: accepted
        let groups = Timeline::new()
            .push(tone(1000.0, 0.85))
            .push(off(0.2))
            .push(tone(1500.0, 3.0))
            .build();
        assert_eq!(detector().detect(&groups, &mut Masker::new()).len(), 1);

        // 1 ms short: rejected
        let groups = Timeline::new()
            .push(tone(1000.0, 0.849))
            .push(off(0.2))
            .push(tone(1500.0, 3.0))
            .build();
        assert!(detector().detect(&groups, &mut Masker::new()).is_empty());
    }

    #[test]
    fn test_rejects() {
        // gap too long
        let groups = Timeline::new()
            .push(tone(1000.0, 1.0))
            .push(off(0.5))
            .push(tone(1500.0, 3.0))
            .build();
        assert!(detector().detect(&groups, &mut Masker::new()).is_empty());

        // too close in frequency
        let groups = Timeline::new()
            .push(tone(1000.0, 1.0))
            .push(tone(1030.0, 3.0))
            .build();
        assert!(detector().detect(&groups, &mut Masker::new()).is_empty());

        // already claimed
        let groups = Timeline::new()
            .push(tone(1000.0, 1.0))
            .push(tone(1500.0, 3.0))
            .build();
        let mut masker = Masker::new();
        masker
            .claim(3.0, 3.5, ToneKind::Pulsed)
            .expect("claim");
        assert!(detector().detect(&groups, &mut masker).is_empty());
    }

    #[test]
    fn test_resumes_after_b() {
        // A B | A B, and B never becomes the next A
        let groups = Timeline::new()
            .push(tone(700.0, 1.0))
            .push(tone(900.0, 3.0))
            .push(tone(1200.0, 1.0))
            .push(off(0.1))
            .push(tone(600.0, 3.0))
            .build();
        let events = detector().detect(&groups, &mut Masker::new());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].freq_pair, [700.0, 900.0]);
        assert_eq!(events[1].freq_pair, [1200.0, 600.0]);
        assert_eq!(events[1].tone_id, "qc_2");
    }
}
