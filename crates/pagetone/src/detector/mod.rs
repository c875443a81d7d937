//! Tone detection pipeline

use serde::Serialize;
use strum::IntoEnumIterator;

#[cfg(not(test))]
use log::{debug, info, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use crate::buffer::SampleBuffer;
use crate::builder::ToneDetectorBuilder;
use crate::event::{HiLowEvent, LongToneEvent, PulsedEvent, ToneKind, TwoToneEvent};
use crate::grouper::{FrequencyGrouper, Group, TIME_EPSILON};
use crate::mask::Masker;
use crate::result::{DetectionResult, ExternalDecoder, FamilyOutcome, SignalFamily};
use crate::spectrum::{Frame, SpectralFrontend};

mod hi_low;
mod long_tone;
mod pulsed;
mod two_tone;

use hi_low::HiLowDetector;
use long_tone::LongToneDetector;
use pulsed::PulsedDetector;
pub(crate) use pulsed::MAX_HISTOGRAM_BINS;
use two_tone::TwoToneDetector;

/// Paging tone detector
///
/// The detector analyzes one complete recording at a time:
///
/// 1. The spectral frontend reduces each short hop of audio
///    to its dominant frequency, or OFF.
/// 2. The grouper merges hops into continuous tones.
/// 3. Four classifiers search the tones, in priority order:
///    pulsed, two-tone, hi-low, and long tone. Each claims the
///    time it matches so that lower-priority classifiers cannot
///    report the same tone again.
///
/// To create the detector, first create its builder:
///
/// ```
/// use pagetone::{SampleBuffer, ToneDetectorBuilder};
///
/// let detector = ToneDetectorBuilder::default().build().unwrap();
/// let silence = SampleBuffer::new(16000, vec![0.0f32; 16000]).unwrap();
///
/// let result = detector.detect(&silence);
/// assert!(result.events().is_empty());
/// ```
///
/// The detector holds no state between recordings. It may be shared
/// between threads, and each call is independent and deterministic.
#[derive(Clone, Debug)]
pub struct ToneDetector {
    config: ToneDetectorBuilder,
    frontend: SpectralFrontend,
    grouper: FrequencyGrouper,
    pulsed: Option<PulsedDetector>,
    two_tone: Option<TwoToneDetector>,
    hi_low: Option<HiLowDetector>,
    long_tone: Option<LongToneDetector>,
}

/// Intermediate products of one detection run
///
/// Returned by [`ToneDetector::analyze()`] for debugging and
/// visualization.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Analysis {
    /// One frame per hop
    pub frames: Vec<Frame>,

    /// Continuous tones and silences
    pub groups: Vec<Group>,

    /// Time claimed by each classifier
    #[serde(skip)]
    pub masker: Masker,

    /// Pulsed single tones
    pub pulsed: Vec<PulsedEvent>,

    /// Two-tone (Quick Call) pairs
    pub two_tone: Vec<TwoToneEvent>,

    /// Long tones
    pub long_tone: Vec<LongToneEvent>,

    /// Hi-low warbles
    pub hi_low: Vec<HiLowEvent>,

    /// MDC1200 records, if an external decoder ran
    pub mdc: FamilyOutcome,

    /// DTMF records, if an external decoder ran
    pub dtmf: FamilyOutcome,
}

impl Analysis {
    /// Discard the diagnostics and keep the events
    pub fn into_result(self) -> DetectionResult {
        DetectionResult {
            pulsed: self.pulsed,
            two_tone: self.two_tone,
            long_tone: self.long_tone,
            hi_low: self.hi_low,
            mdc: self.mdc,
            dtmf: self.dtmf,
        }
    }

    fn set_family(&mut self, family: SignalFamily, outcome: FamilyOutcome) {
        match family {
            SignalFamily::Mdc => self.mdc = outcome,
            SignalFamily::Dtmf => self.dtmf = outcome,
        }
    }
}

impl ToneDetector {
    /// Detect tones in `buffer`
    ///
    /// The external signal families are reported empty. To decode
    /// them, use [`detect_with()`](ToneDetector::detect_with).
    pub fn detect(&self, buffer: &SampleBuffer) -> DetectionResult {
        self.analyze(buffer).into_result()
    }

    /// Detect tones in `buffer` and decode the external families
    ///
    /// Every family enabled in the configuration is passed to the
    /// `decoder`, on a separate thread, while tone detection runs.
    /// A decoder failure is reported in that family's slot only.
    pub fn detect_with<D>(&self, buffer: &SampleBuffer, decoder: &D) -> DetectionResult
    where
        D: ExternalDecoder + ?Sized,
    {
        self.analyze_with(buffer, decoder).into_result()
    }

    /// Like [`detect_with()`](ToneDetector::detect_with), keeping
    /// intermediate products
    pub fn analyze_with<D>(&self, buffer: &SampleBuffer, decoder: &D) -> Analysis
    where
        D: ExternalDecoder + ?Sized,
    {
        let families: Vec<SignalFamily> = SignalFamily::iter()
            .filter(|fam| self.config.family_enabled(*fam))
            .collect();
        if families.is_empty() {
            return self.analyze(buffer);
        }

        std::thread::scope(|scope| {
            let worker = scope.spawn(|| {
                families
                    .iter()
                    .map(|fam| (*fam, FamilyOutcome::from(decoder.decode(buffer, *fam))))
                    .collect::<Vec<_>>()
            });

            let mut analysis = self.analyze(buffer);
            match worker.join() {
                Ok(outcomes) => {
                    for (fam, outcome) in outcomes {
                        if let FamilyOutcome::Failed { error } = &outcome {
                            warn!("detector: {} decoder failed: {}", fam, error);
                        }
                        analysis.set_family(fam, outcome);
                    }
                }
                Err(_) => {
                    warn!("detector: external decoder panicked");
                    for fam in families.iter() {
                        analysis.set_family(
                            *fam,
                            FamilyOutcome::Failed {
                                error: "external decoder panicked".to_owned(),
                            },
                        );
                    }
                }
            }
            analysis
        })
    }

    /// Detect tones in `buffer`, keeping intermediate products
    pub fn analyze(&self, buffer: &SampleBuffer) -> Analysis {
        let frames = self.frontend.frames(buffer);
        let groups = self.grouper.group(&frames);

        let mut masker = Masker::new();
        let pulsed = match &self.pulsed {
            Some(det) => det.detect(&groups, &mut masker),
            None => Vec::new(),
        };
        let two_tone = match &self.two_tone {
            Some(det) => det.detect(&groups, &mut masker),
            None => Vec::new(),
        };
        let hi_low = match &self.hi_low {
            Some(det) => det.detect(&groups, &mut masker),
            None => Vec::new(),
        };
        let long_tone = match &self.long_tone {
            Some(det) => det.detect(&groups, &mut masker),
            None => Vec::new(),
        };

        info!(
            "detector: {:.3} s analyzed: {} pulsed, {} two-tone, {} hi-low, {} long tone",
            buffer.duration(),
            pulsed.len(),
            two_tone.len(),
            hi_low.len(),
            long_tone.len()
        );

        Analysis {
            frames,
            groups,
            masker,
            pulsed,
            two_tone,
            long_tone,
            hi_low,
            mdc: FamilyOutcome::default(),
            dtmf: FamilyOutcome::default(),
        }
    }

    /// Configuration used to build this detector
    pub fn config(&self) -> &ToneDetectorBuilder {
        &self.config
    }

    // The builder has been validated
    pub(crate) fn from_valid(cfg: &ToneDetectorBuilder) -> Self {
        let frontend = SpectralFrontend::new(
            cfg.time_resolution_ms(),
            cfg.frequency_band(),
            cfg.silence_below_global_db(),
            cfg.snr_above_noise_db(),
        );
        let grouper = FrequencyGrouper::new(
            cfg.matching_threshold(),
            cfg.merge_short_gaps_ms(),
            cfg.abs_cap_hz(),
            cfg.force_split_step_hz(),
            cfg.split_lookahead_frames(),
        );

        let (min_on, max_on) = cfg.pulsed_on_ms();
        let (min_off, max_off) = cfg.pulsed_off_ms();
        let pulsed = PulsedDetector {
            band: cfg.pulsed_auto_center_band(),
            bin_hz: cfg.pulsed_mode_bin_hz(),
            bw_hz: cfg.pulsed_bw_hz(),
            min_cycles: cfg.pulsed_min_cycles(),
            on: (min_on / 1000.0, max_on / 1000.0),
            off: (min_off / 1000.0, max_off / 1000.0),
        };

        let (tone_a, tone_b) = cfg.two_tone_lengths();
        let two_tone = TwoToneDetector {
            tone_a_min_length: tone_a,
            tone_b_min_length: tone_b,
            max_gap: cfg.two_tone_max_gap(),
            bw_hz: cfg.two_tone_bw_hz(),
            min_separation_hz: cfg.two_tone_min_separation_hz(),
        };

        let hi_low = HiLowDetector {
            max_interval: cfg.hi_low_interval(),
            min_alternations: cfg.hi_low_min_alternations(),
            bw_hz: cfg.hi_low_bw_hz(),
            min_separation_hz: cfg.hi_low_min_separation_hz(),
        };

        let long_tone = LongToneDetector {
            min_length: cfg.long_tone_min_length(),
            bw_hz: cfg.long_tone_bw_hz(),
        };

        debug!("detector: built with {:?}", cfg);

        Self {
            config: cfg.clone(),
            frontend,
            grouper,
            pulsed: cfg.detector_enabled(ToneKind::Pulsed).then_some(pulsed),
            two_tone: cfg.detector_enabled(ToneKind::TwoTone).then_some(two_tone),
            hi_low: cfg.detector_enabled(ToneKind::HiLow).then_some(hi_low),
            long_tone: cfg.detector_enabled(ToneKind::LongTone).then_some(long_tone),
        }
    }
}

// Index of the first ON group at or after `from`
fn next_on(groups: &[Group], from: usize) -> Option<usize> {
    groups
        .get(from..)?
        .iter()
        .position(|g| g.is_on())
        .map(|p| from + p)
}

// `value ≥ min`, tolerating rounding of sample times
#[inline]
fn at_least(value: f64, min: f64) -> bool {
    value >= min - TIME_EPSILON
}

// `value ≤ max`, tolerating rounding of sample times
#[inline]
fn at_most(value: f64, max: f64) -> bool {
    value <= max + TIME_EPSILON
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use serde_json::{json, Value};

    use crate::result::DecoderError;
    use crate::spectrum::tests::{push_tone, RATE};

    /// One segment of a synthetic group sequence
    pub(crate) struct Segment {
        freqs: Vec<f32>,
        secs: f64,
    }

    /// A steady tone of `secs` seconds
    pub(crate) fn tone(freq: f32, secs: f64) -> Segment {
        Segment {
            freqs: vec![freq; frame_count(secs)],
            secs,
        }
    }

    /// A tone which alternates between `f0` and `f1` every frame
    pub(crate) fn warble(f0: f32, f1: f32, secs: f64) -> Segment {
        Segment {
            freqs: (0..frame_count(secs))
                .map(|n| if n % 2 == 0 { f0 } else { f1 })
                .collect(),
            secs,
        }
    }

    /// `secs` of silence
    pub(crate) fn off(secs: f64) -> Segment {
        Segment {
            freqs: Vec::new(),
            secs,
        }
    }

    fn frame_count(secs: f64) -> usize {
        usize::max((secs / 0.05).round() as usize, 1)
    }

    /// Builds a gapless group sequence, one group per segment
    pub(crate) struct Timeline {
        groups: Vec<Group>,
        now: f64,
        frame: usize,
    }

    impl Timeline {
        pub(crate) fn new() -> Self {
            Self {
                groups: Vec::new(),
                now: 0.0,
                frame: 0,
            }
        }

        pub(crate) fn push(mut self, seg: Segment) -> Self {
            let count = usize::max(seg.freqs.len(), frame_count(seg.secs));
            self.groups.push(Group {
                start: self.now,
                end: self.now + seg.secs,
                first_frame: self.frame,
                frame_count: count,
                frequencies: seg.freqs,
            });
            self.now += seg.secs;
            self.frame += count;
            self
        }

        pub(crate) fn build(self) -> Vec<Group> {
            self.groups
        }
    }

    struct FakeDecoder;

    impl ExternalDecoder for FakeDecoder {
        fn decode(
            &self,
            _buffer: &SampleBuffer,
            family: SignalFamily,
        ) -> Result<Vec<Value>, DecoderError> {
            match family {
                SignalFamily::Mdc => Ok(vec![json!({"unit_id": "1234", "op": "01"})]),
                SignalFamily::Dtmf => Err(DecoderError::Unsupported(family)),
            }
        }
    }

    struct PanickingDecoder;

    impl ExternalDecoder for PanickingDecoder {
        fn decode(
            &self,
            _buffer: &SampleBuffer,
            _family: SignalFamily,
        ) -> Result<Vec<Value>, DecoderError> {
            panic!("decoder crashed");
        }
    }

    // 1000 Hz for 1 s, then 1500 Hz for 3 s, then silence
    fn quick_call_audio() -> SampleBuffer {
        let mut samples = Vec::new();
        push_tone(&mut samples, 0.0, 0.5);
        push_tone(&mut samples, 1000.0, 1.0);
        push_tone(&mut samples, 1500.0, 3.0);
        push_tone(&mut samples, 0.0, 0.5);
        SampleBuffer::new(RATE, samples).expect("rate")
    }

    // hop-aligned 1010 Hz pulses: 200 ms ON, 100 ms OFF, ×8
    fn pulsed_audio() -> SampleBuffer {
        let mut samples = Vec::new();
        push_tone(&mut samples, 0.0, 0.5);
        for _ in 0..8 {
            push_tone(&mut samples, 1010.0, 0.2);
            push_tone(&mut samples, 0.0, 0.1);
        }
        push_tone(&mut samples, 0.0, 0.4);
        SampleBuffer::new(RATE, samples).expect("rate")
    }

    #[test]
    fn test_next_on() {
        let groups = Timeline::new()
            .push(off(0.1))
            .push(tone(1000.0, 0.1))
            .push(off(0.1))
            .build();
        assert_eq!(next_on(&groups, 0), Some(1));
        assert_eq!(next_on(&groups, 1), Some(1));
        assert_eq!(next_on(&groups, 2), None);
        assert_eq!(next_on(&groups, 7), None);
    }

    #[test]
    fn test_end_to_end_quick_call() {
        let detector = ToneDetectorBuilder::default().build().expect("config");
        let res = detector.detect(&quick_call_audio());

        assert!(res.pulsed.is_empty());
        assert!(res.hi_low.is_empty());
        assert!(res.long_tone.is_empty());
        assert_eq!(res.two_tone.len(), 1);

        let evt = &res.two_tone[0];
        assert_eq!(evt.tone_id, "qc_1");
        assert!((evt.freq_pair[0] - 1000.0).abs() < 3.0);
        assert!((evt.freq_pair[1] - 1500.0).abs() < 3.0);
        assert_eq!(evt.start, 0.5);
        assert_eq!(evt.tone_a_length, 1.0);
        assert_eq!(evt.tone_b_length, 3.0);
        assert_eq!(evt.end, 4.5);
    }

    #[test]
    fn test_end_to_end_pulsed() {
        let detector = ToneDetectorBuilder::default().build().expect("config");
        let analysis = detector.analyze(&pulsed_audio());

        assert_eq!(analysis.pulsed.len(), 1);
        let evt = &analysis.pulsed[0];
        assert_eq!(evt.tone_id, "pl_1");
        assert_eq!(evt.cycles, 8);
        assert!((evt.detected_freq - 1010.0).abs() < 3.0);
        assert_eq!(evt.on_ms_median, 200.0);
        assert_eq!(evt.off_ms_median, 100.0);
        assert_eq!(evt.start, 0.5);
        assert_eq!(evt.end, 2.8);

        // no other classifier reports the same pulses
        assert!(analysis.two_tone.is_empty());
        assert!(analysis.long_tone.is_empty());
        assert!(analysis.hi_low.is_empty());
        assert_eq!(analysis.masker.intervals_by_owner(ToneKind::Pulsed).count(), 1);
    }

    #[test]
    fn test_pulsed_unaligned() {
        // 180 ms ON, 90 ms OFF: pulse edges fall inside hops
        let mut samples = Vec::new();
        push_tone(&mut samples, 0.0, 0.5);
        for _ in 0..8 {
            push_tone(&mut samples, 1010.0, 0.18);
            push_tone(&mut samples, 0.0, 0.09);
        }
        push_tone(&mut samples, 0.0, 0.4);
        let buf = SampleBuffer::new(RATE, samples).expect("rate");

        let detector = ToneDetectorBuilder::default().build().expect("config");
        let res = detector.detect(&buf);

        // durations are quantized to one 50 ms hop
        assert_eq!(res.pulsed.len(), 1);
        let evt = &res.pulsed[0];
        assert_eq!(evt.cycles, 8);
        assert!((evt.detected_freq - 1010.0).abs() < 5.0);
        assert!((evt.on_ms_median - 180.0).abs() <= 50.0);
        assert!((evt.off_ms_median - 90.0).abs() <= 50.0);
        assert!((evt.start - 0.5).abs() <= 0.05);
        assert!((evt.end - 2.57).abs() <= 0.05 + 1.0e-9);
    }

    #[test]
    fn test_groups_tile_recording() {
        let detector = ToneDetectorBuilder::default().build().expect("config");
        let buf = pulsed_audio();
        let analysis = detector.analyze(&buf);

        let groups = &analysis.groups;
        assert_eq!(groups[0].start, 0.0);
        assert_eq!(groups[groups.len() - 1].end, buf.duration());
        for pair in groups.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_masking_exclusive() {
        // a long 1500 Hz B tone is also a long tone, but is reported once
        let mut builder = ToneDetectorBuilder::default();
        builder.with_long_tone_min_length(2.0);
        let detector = builder.build().expect("config");

        let analysis = detector.analyze(&quick_call_audio());
        assert_eq!(analysis.two_tone.len(), 1);
        assert!(analysis.long_tone.is_empty());

        let intervals = analysis.masker.intervals();
        for pair in intervals.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }

        // with two-tone disabled, the long tone surfaces
        builder.with_detector(ToneKind::TwoTone, false);
        let res = builder.build().expect("config").detect(&quick_call_audio());
        assert!(res.two_tone.is_empty());
        assert_eq!(res.long_tone.len(), 1);
        assert_eq!(res.long_tone[0].start, 1.5);
    }

    #[test]
    fn test_deterministic() {
        let detector = ToneDetectorBuilder::default().build().expect("config");
        let buf = pulsed_audio();
        assert_eq!(detector.analyze(&buf), detector.analyze(&buf));
    }

    #[test]
    fn test_degenerate_buffers() {
        let detector = ToneDetectorBuilder::default().build().expect("config");

        let empty = SampleBuffer::new(RATE, Vec::new()).expect("rate");
        let analysis = detector.analyze(&empty);
        assert!(analysis.frames.is_empty());
        assert!(analysis.groups.is_empty());
        assert_eq!(analysis.into_result(), DetectionResult::default());

        let silent = SampleBuffer::new(RATE, vec![0.0f32; 32000]).expect("rate");
        let analysis = detector.analyze(&silent);
        assert_eq!(analysis.groups.len(), 1);
        assert!(!analysis.groups[0].is_on());
        assert_eq!(analysis.into_result().tone_count(), 0);
    }

    #[test]
    fn test_external_families() {
        let detector = ToneDetectorBuilder::default().build().expect("config");
        let res = detector.detect_with(&quick_call_audio(), &FakeDecoder);

        assert_eq!(res.two_tone.len(), 1);
        assert_eq!(res.mdc.records().len(), 1);
        assert!(res.dtmf.is_err());

        let js = serde_json::to_value(&res).expect("ser");
        assert_eq!(js["mdc"][0]["unit_id"], json!("1234"));
        assert!(js["dtmf"]["error"].is_string());

        // disabled families are never decoded
        let detector = ToneDetectorBuilder::default()
            .with_family(SignalFamily::Dtmf, false)
            .build()
            .expect("config");
        let res = detector.detect_with(&quick_call_audio(), &FakeDecoder);
        assert_eq!(res.dtmf, FamilyOutcome::default());
    }

    #[test]
    fn test_decoder_panic() {
        let detector = ToneDetectorBuilder::default().build().expect("config");
        let res = detector.detect_with(&quick_call_audio(), &PanickingDecoder);

        // tone detection is unaffected
        assert_eq!(res.two_tone.len(), 1);
        assert_eq!(res.two_tone[0].tone_id, "qc_1");

        assert!(res.mdc.is_err());
        assert!(res.dtmf.is_err());
        let js = serde_json::to_value(&res).expect("ser");
        assert!(js["mdc"]["error"].is_string());
        assert!(js["dtmf"]["error"].is_string());
    }

    #[test]
    fn test_analyze_with() {
        let detector = ToneDetectorBuilder::default().build().expect("config");
        let buffer = quick_call_audio();

        let analysis = detector.analyze_with(&buffer, &FakeDecoder);
        assert!(!analysis.frames.is_empty());
        assert_eq!(analysis.masker.len(), 1);
        assert_eq!(analysis.mdc.records().len(), 1);
        assert_eq!(
            analysis.into_result(),
            detector.detect_with(&buffer, &FakeDecoder)
        );
    }
}
