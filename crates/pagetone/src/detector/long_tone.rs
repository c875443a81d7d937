//! Long-tone classifier

#[cfg(not(test))]
use log::{debug, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as warn;

use super::at_least;
use crate::event::{round_hz, round_secs, LongToneEvent, ToneKind};
use crate::grouper::Group;
use crate::mask::Masker;

/// Finds single steady tones held for a long time
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LongToneDetector {
    pub(crate) min_length: f64,
    pub(crate) bw_hz: f32,
}

impl LongToneDetector {
    pub(crate) fn detect(&self, groups: &[Group], masker: &mut Masker) -> Vec<LongToneEvent> {
        let mut out = Vec::new();

        for grp in groups {
            let freq = match grp.frequency() {
                Some(f) => f,
                None => continue,
            };
            if !at_least(grp.duration(), self.min_length)
                || grp.spread() > self.bw_hz
                || masker.claimed(grp.start, grp.end)
            {
                continue;
            }

            if let Err(err) = masker.claim(grp.start, grp.end, ToneKind::LongTone) {
                warn!("long tone: {}", err);
                continue;
            }

            let evt = LongToneEvent {
                tone_id: ToneKind::LongTone.tone_id(out.len() + 1),
                detected_freq: round_hz(freq),
                length: round_secs(grp.duration()),
                start: round_secs(grp.start),
                end: round_secs(grp.end),
            };
            debug!(
                "long tone: {} {:.1} Hz for {:.3} s",
                evt.tone_id,
                freq,
                grp.duration()
            );
            out.push(evt);
        }

        out
    }
}
