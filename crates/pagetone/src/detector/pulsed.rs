//! Pulsed single-tone classifier
//!
//! A pulsed tone is one steady frequency keyed ON and OFF
//! repeatedly. The frequency is not configured: the classifier
//! *auto-centers* by taking a histogram of every unclaimed tone
//! in its band and trying the most popular bins, in order.
//!
//! For each candidate frequency, pulses are chained into runs:
//!
//! ```txt
//!  ON    OFF    ON    OFF    ON    OFF    ON
//! |---|       |---|       |---|       |---|
//!  one pulse per cycle; the final pulse counts
//!                                      cycles = 4
//! ```
//!
//! Every pulse must be near the candidate with an ON duration in
//! range. Every gap between pulses must be OFF, with a duration in
//! range. A run with enough cycles becomes a [`PulsedEvent`].

#[cfg(not(test))]
use log::{debug, trace, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as trace;
#[cfg(test)]
use std::println as warn;

use super::{at_least, at_most, next_on};
use crate::event::{round_hz, round_ms, round_secs, PulsedEvent, ToneKind};
use crate::grouper::Group;
use crate::mask::Masker;
use crate::stats;

/// Maximum number of histogram bins tried as candidates
const MAX_CANDIDATES: usize = 8;

/// Maximum size of the auto-center histogram
pub(crate) const MAX_HISTOGRAM_BINS: usize = 65536;

/// Finds pulsed single tones
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PulsedDetector {
    pub(crate) band: (f32, f32),
    pub(crate) bin_hz: f32,
    pub(crate) bw_hz: f32,
    pub(crate) min_cycles: usize,

    // durations in seconds
    pub(crate) on: (f64, f64),
    pub(crate) off: (f64, f64),
}

impl PulsedDetector {
    pub(crate) fn detect(&self, groups: &[Group], masker: &mut Masker) -> Vec<PulsedEvent> {
        let mut out = Vec::new();

        for candidate in self.candidates(groups, masker) {
            trace!("pulsed: trying candidate {:.1} Hz", candidate);
            self.extract(groups, masker, candidate, &mut out);
        }

        // candidates are tried by popularity, not time
        out.sort_by(|a, b| a.start.total_cmp(&b.start));
        for (n, evt) in out.iter_mut().enumerate() {
            evt.tone_id = ToneKind::Pulsed.tone_id(n + 1);
        }
        out
    }

    /// Candidate pulse frequencies, most popular first
    ///
    /// Each unclaimed ON group inside the band casts one vote for
    /// the bin which contains its frequency. Ties go to the lower
    /// frequency. Returns the bin centers.
    pub(crate) fn candidates(&self, groups: &[Group], masker: &Masker) -> Vec<f32> {
        let (low, high) = self.band;
        let nbins = usize::min(((high - low) / self.bin_hz).ceil() as usize, MAX_HISTOGRAM_BINS);
        if nbins == 0 {
            return Vec::new();
        }

        let mut votes = vec![0u32; nbins];
        for grp in groups {
            let freq = match grp.frequency() {
                Some(f) if f >= low && f < high => f,
                _ => continue,
            };
            if masker.claimed(grp.start, grp.end) {
                continue;
            }

            let bin = usize::min(((freq - low) / self.bin_hz).floor() as usize, nbins - 1);
            votes[bin] += 1;
        }

        let mut ranked: Vec<(usize, u32)> = votes
            .into_iter()
            .enumerate()
            .filter(|(_, count)| *count > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        ranked
            .into_iter()
            .take(MAX_CANDIDATES)
            .map(|(bin, _)| low + (bin as f32 + 0.5f32) * self.bin_hz)
            .collect()
    }

    // Emit every qualifying run of pulses near `candidate`
    fn extract(&self, groups: &[Group], masker: &mut Masker, candidate: f32, out: &mut Vec<PulsedEvent>) {
        let mut i = 0;
        while i < groups.len() {
            if !self.is_pulse(&groups[i], candidate) || masker.claimed(groups[i].start, groups[i].end) {
                i += 1;
                continue;
            }

            let pulses = self.chain(groups, masker, candidate, i);
            let last = pulses[pulses.len() - 1];
            if pulses.len() < self.min_cycles {
                i += 1;
                continue;
            }

            let (start, end) = (groups[i].start, groups[last].end);
            if let Err(err) = masker.claim(start, end, ToneKind::Pulsed) {
                warn!("pulsed: {}", err);
                i = last + 1;
                continue;
            }

            let evt = self.event(groups, &pulses);
            debug!(
                "pulsed: {:.1} Hz, {} cycles at {:.3} s",
                evt.detected_freq, evt.cycles, start
            );
            out.push(evt);
            i = last + 1;
        }
    }

    // Indices of the pulses chained from group `first`
    fn chain(&self, groups: &[Group], masker: &Masker, candidate: f32, first: usize) -> Vec<usize> {
        let mut pulses = vec![first];
        let mut prev = first;
        while let Some(j) = next_on(groups, prev + 1) {
            let gap = groups[j].start - groups[prev].end;
            let ok = at_least(gap, self.off.0)
                && at_most(gap, self.off.1)
                && self.is_pulse(&groups[j], candidate)
                && !masker.claimed(groups[prev].end, groups[j].end);
            if !ok {
                break;
            }

            pulses.push(j);
            prev = j;
        }
        pulses
    }

    // True if `grp` is an ON pulse near `candidate` with a good length
    fn is_pulse(&self, grp: &Group, candidate: f32) -> bool {
        match grp.frequency() {
            Some(f) => {
                (f - candidate).abs() <= self.bw_hz
                    && at_least(grp.duration(), self.on.0)
                    && at_most(grp.duration(), self.on.1)
            }
            None => false,
        }
    }

    fn event(&self, groups: &[Group], pulses: &[usize]) -> PulsedEvent {
        let freqs: Vec<f32> = pulses
            .iter()
            .filter_map(|idx| groups[*idx].frequency())
            .collect();
        let on: Vec<f64> = pulses.iter().map(|idx| groups[*idx].duration()).collect();
        let off: Vec<f64> = pulses
            .windows(2)
            .map(|pair| groups[pair[1]].start - groups[pair[0]].end)
            .collect();

        let start = groups[pulses[0]].start;
        let end = groups[pulses[pulses.len() - 1]].end;
        PulsedEvent {
            tone_id: String::new(),
            detected_freq: round_hz(stats::median(&freqs).unwrap_or(0.0)),
            start: round_secs(start),
            end: round_secs(end),
            length: round_secs(end - start),
            cycles: pulses.len(),
            on_ms_median: round_ms(stats::median(&on).unwrap_or(0.0)),
            off_ms_median: round_ms(stats::median(&off).unwrap_or(0.0)),
        }
    }
}
