use serde::Serialize;
use thiserror::Error;

use crate::detector::{ToneDetector, MAX_HISTOGRAM_BINS};
use crate::event::ToneKind;
use crate::result::SignalFamily;

/// Builds a tone detector
///
/// The builder comes with a sensible set of default options,
/// suitable for typical fire and EMS dispatch channels. Every
/// option may be changed with a `with_*()` setter and read back
/// with a getter of the same name.
///
/// ```
/// use pagetone::ToneDetectorBuilder;
///
/// let detector = ToneDetectorBuilder::new()
///     .with_matching_threshold(3.0)
///     .with_two_tone_lengths(0.8, 2.0)
///     .build()
///     .expect("invalid configuration");
/// ```
///
/// Options are checked when you [`build()`](Self::build), before
/// any audio is analyzed. The API specified by the builder is part
/// of this crate's API. The actual default values are *not*,
/// however, and are subject to revision in any minor release.
///
/// The builder implements `Serialize` so that the effective
/// configuration can be logged or echoed alongside results.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToneDetectorBuilder {
    matching_threshold: f32,
    time_resolution_ms: u32,
    fe_freq_band: (f32, f32),
    fe_merge_short_gaps_ms: f64,
    fe_silence_below_global_db: f32,
    fe_snr_above_noise_db: f32,
    fe_abs_cap_hz: Option<f32>,
    fe_force_split_step_hz: Option<f32>,
    fe_split_lookahead_frames: usize,
    tone_a_min_length: f64,
    tone_b_min_length: f64,
    two_tone_max_gap_between_a_b: f64,
    two_tone_bw_hz: f32,
    two_tone_min_pair_separation_hz: f32,
    hi_low_interval: f64,
    hi_low_min_alternations: usize,
    hi_low_tone_bw_hz: f32,
    hi_low_min_pair_separation_hz: f32,
    long_tone_min_length: f64,
    long_tone_bw_hz: f32,
    pulsed_auto_center_band: (f32, f32),
    pulsed_mode_bin_hz: f32,
    pulsed_bw_hz: f32,
    pulsed_min_cycles: usize,
    pulsed_min_on_ms: f64,
    pulsed_max_on_ms: f64,
    pulsed_min_off_ms: f64,
    pulsed_max_off_ms: f64,
    detect_pulsed: bool,
    detect_two_tone: bool,
    detect_long: bool,
    detect_hi_low: bool,
    detect_mdc: bool,
    detect_dtmf: bool,
}

/// An invalid detector option
///
/// Every variant names the offending option.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Option must be strictly positive
    #[error("{name} must be greater than zero (got {value})")]
    NotPositive { name: &'static str, value: f64 },

    /// Option must not be negative
    #[error("{name} must not be negative (got {value})")]
    Negative { name: &'static str, value: f64 },

    /// Lower bound of a range or band exceeds its upper bound
    #[error("{name}: lower bound {low} must not exceed upper bound {high}")]
    InvertedRange {
        name: &'static str,
        low: f64,
        high: f64,
    },

    /// Option is NaN or infinite
    #[error("{name} must be a finite number")]
    NotFinite { name: &'static str },

    /// Option is outside its permitted range
    #[error("{name} must be {expected} (got {value})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },
}

impl ToneDetectorBuilder {
    /// New detector configuration with "sensible" defaults
    pub fn new() -> Self {
        Self {
            matching_threshold: 2.5,
            time_resolution_ms: 50,
            fe_freq_band: (200.0, 3000.0),
            fe_merge_short_gaps_ms: 0.0,
            fe_silence_below_global_db: -28.0,
            fe_snr_above_noise_db: 6.0,
            fe_abs_cap_hz: None,
            fe_force_split_step_hz: None,
            fe_split_lookahead_frames: 2,
            tone_a_min_length: 0.85,
            tone_b_min_length: 2.6,
            two_tone_max_gap_between_a_b: 0.35,
            two_tone_bw_hz: 25.0,
            two_tone_min_pair_separation_hz: 40.0,
            hi_low_interval: 0.2,
            hi_low_min_alternations: 6,
            hi_low_tone_bw_hz: 25.0,
            hi_low_min_pair_separation_hz: 40.0,
            long_tone_min_length: 3.8,
            long_tone_bw_hz: 25.0,
            pulsed_auto_center_band: (200.0, 3000.0),
            pulsed_mode_bin_hz: 5.0,
            pulsed_bw_hz: 25.0,
            pulsed_min_cycles: 6,
            pulsed_min_on_ms: 120.0,
            pulsed_max_on_ms: 900.0,
            pulsed_min_off_ms: 25.0,
            pulsed_max_off_ms: 350.0,
            detect_pulsed: true,
            detect_two_tone: true,
            detect_long: true,
            detect_hi_low: true,
            detect_mdc: true,
            detect_dtmf: true,
        }
    }

    /// Build a detector
    ///
    /// Fails if any option is invalid. The detector is immutable
    /// and may be shared between threads; each call to
    /// [`detect()`](ToneDetector::detect) is independent.
    pub fn build(&self) -> Result<ToneDetector, ConfigError> {
        self.validate()?;
        Ok(ToneDetector::from_valid(self))
    }

    /// Check every option
    ///
    /// Reports the first invalid option found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("matching_threshold", self.matching_threshold as f64)?;
        positive("time_resolution_ms", self.time_resolution_ms as f64)?;
        band("fe_freq_band", self.fe_freq_band)?;
        non_negative("fe_merge_short_gaps_ms", self.fe_merge_short_gaps_ms)?;

        finite("fe_silence_below_global_db", self.fe_silence_below_global_db as f64)?;
        if self.fe_silence_below_global_db > 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "fe_silence_below_global_db",
                value: self.fe_silence_below_global_db as f64,
                expected: "at most 0 dB",
            });
        }
        non_negative("fe_snr_above_noise_db", self.fe_snr_above_noise_db as f64)?;
        if let Some(cap) = self.fe_abs_cap_hz {
            positive("fe_abs_cap_hz", cap as f64)?;
        }
        if let Some(step) = self.fe_force_split_step_hz {
            positive("fe_force_split_step_hz", step as f64)?;
        }

        positive("tone_a_min_length", self.tone_a_min_length)?;
        positive("tone_b_min_length", self.tone_b_min_length)?;
        positive(
            "two_tone_max_gap_between_a_b",
            self.two_tone_max_gap_between_a_b,
        )?;
        positive("two_tone_bw_hz", self.two_tone_bw_hz as f64)?;
        positive(
            "two_tone_min_pair_separation_hz",
            self.two_tone_min_pair_separation_hz as f64,
        )?;

        positive("hi_low_interval", self.hi_low_interval)?;
        positive("hi_low_min_alternations", self.hi_low_min_alternations as f64)?;
        positive("hi_low_tone_bw_hz", self.hi_low_tone_bw_hz as f64)?;
        positive(
            "hi_low_min_pair_separation_hz",
            self.hi_low_min_pair_separation_hz as f64,
        )?;

        positive("long_tone_min_length", self.long_tone_min_length)?;
        positive("long_tone_bw_hz", self.long_tone_bw_hz as f64)?;

        band("pulsed_auto_center_band", self.pulsed_auto_center_band)?;
        positive("pulsed_mode_bin_hz", self.pulsed_mode_bin_hz as f64)?;
        let (low, high) = self.pulsed_auto_center_band;
        if ((high - low) / self.pulsed_mode_bin_hz).ceil() > MAX_HISTOGRAM_BINS as f32 {
            return Err(ConfigError::OutOfRange {
                name: "pulsed_mode_bin_hz",
                value: self.pulsed_mode_bin_hz as f64,
                expected: "wide enough to cut pulsed_auto_center_band into at most 65536 bins",
            });
        }
        positive("pulsed_bw_hz", self.pulsed_bw_hz as f64)?;
        positive("pulsed_min_cycles", self.pulsed_min_cycles as f64)?;
        positive("pulsed_min_on_ms", self.pulsed_min_on_ms)?;
        positive("pulsed_max_on_ms", self.pulsed_max_on_ms)?;
        positive("pulsed_min_off_ms", self.pulsed_min_off_ms)?;
        positive("pulsed_max_off_ms", self.pulsed_max_off_ms)?;
        range(
            "pulsed_on_ms",
            self.pulsed_min_on_ms,
            self.pulsed_max_on_ms,
        )?;
        range(
            "pulsed_off_ms",
            self.pulsed_min_off_ms,
            self.pulsed_max_off_ms,
        )?;

        Ok(())
    }

    /// Frequency matching tolerance (percent)
    ///
    /// Consecutive frames belong to the same tone if their
    /// frequency is within `pct` percent of the tone's running
    /// mean frequency.
    pub fn with_matching_threshold(&mut self, pct: f32) -> &mut Self {
        self.matching_threshold = pct;
        self
    }

    /// Analysis hop length (milliseconds)
    ///
    /// The recording is analyzed in non-overlapping hops of this
    /// length. Shorter hops resolve shorter pulses but estimate
    /// frequency less precisely.
    pub fn with_time_resolution_ms(&mut self, ms: u32) -> &mut Self {
        self.time_resolution_ms = ms;
        self
    }

    /// Frequency search band (Hz)
    ///
    /// Only spectral peaks between `low` and `high` are considered.
    /// `high` is clipped to the Nyquist rate of the recording.
    pub fn with_frequency_band(&mut self, low: f32, high: f32) -> &mut Self {
        self.fe_freq_band = (low, high);
        self
    }

    /// Bridge short gaps (milliseconds)
    ///
    /// An OFF run no longer than `ms`, between two frames of the same
    /// tone, is absorbed into the tone. Zero disables bridging.
    pub fn with_merge_short_gaps_ms(&mut self, ms: f64) -> &mut Self {
        self.fe_merge_short_gaps_ms = ms;
        self
    }

    /// Silence gate (dB, relative to the loudest bin)
    ///
    /// Hops whose in-band peak is more than `db` below the loudest
    /// spectral bin of the whole recording are OFF. Give a
    /// non-positive value, like `-28.0`.
    pub fn with_silence_below_global_db(&mut self, db: f32) -> &mut Self {
        self.fe_silence_below_global_db = db;
        self
    }

    /// SNR gate (dB)
    ///
    /// A hop's in-band peak must exceed its median in-band bin
    /// by at least `db`, or the hop is OFF.
    pub fn with_snr_above_noise_db(&mut self, db: f32) -> &mut Self {
        self.fe_snr_above_noise_db = db;
        self
    }

    /// Absolute frequency tolerance cap (Hz)
    ///
    /// If set, consecutive frames must *also* be within `hz` of the
    /// tone's running mean. At high frequencies, this is tighter than
    /// the percentage tolerance.
    pub fn with_abs_cap_hz(&mut self, hz: Option<f32>) -> &mut Self {
        self.fe_abs_cap_hz = hz;
        self
    }

    /// Forced split step (Hz)
    ///
    /// If set, a single-frame frequency step larger than `hz` ends
    /// the tone, even if it lies within tolerance, provided that
    /// the new frequency persists for the
    /// [lookahead](Self::with_split_lookahead_frames).
    /// Steps which revert sooner are treated as transients.
    pub fn with_force_split_step_hz(&mut self, hz: Option<f32>) -> &mut Self {
        self.fe_force_split_step_hz = hz;
        self
    }

    /// Forced split confirmation (frames)
    pub fn with_split_lookahead_frames(&mut self, frames: usize) -> &mut Self {
        self.fe_split_lookahead_frames = frames;
        self
    }

    /// Two-tone minimum lengths (seconds)
    ///
    /// Tone A must last at least `tone_a` seconds, and tone B
    /// must last at least `tone_b` seconds.
    pub fn with_two_tone_lengths(&mut self, tone_a: f64, tone_b: f64) -> &mut Self {
        self.tone_a_min_length = tone_a;
        self.tone_b_min_length = tone_b;
        self
    }

    /// Two-tone maximum gap between A and B (seconds)
    pub fn with_two_tone_max_gap(&mut self, secs: f64) -> &mut Self {
        self.two_tone_max_gap_between_a_b = secs;
        self
    }

    /// Two-tone maximum frequency spread within each tone (Hz)
    pub fn with_two_tone_bw_hz(&mut self, hz: f32) -> &mut Self {
        self.two_tone_bw_hz = hz;
        self
    }

    /// Two-tone minimum separation between A and B (Hz)
    pub fn with_two_tone_min_separation_hz(&mut self, hz: f32) -> &mut Self {
        self.two_tone_min_pair_separation_hz = hz;
        self
    }

    /// Hi-low maximum gap between tones (seconds)
    pub fn with_hi_low_interval(&mut self, secs: f64) -> &mut Self {
        self.hi_low_interval = secs;
        self
    }

    /// Hi-low minimum number of alternations
    ///
    /// An alternation is one change between the two frequencies,
    /// so a warble of `n` tones has `n - 1` alternations.
    pub fn with_hi_low_min_alternations(&mut self, count: usize) -> &mut Self {
        self.hi_low_min_alternations = count;
        self
    }

    /// Hi-low frequency tolerance of each tone (Hz)
    pub fn with_hi_low_bw_hz(&mut self, hz: f32) -> &mut Self {
        self.hi_low_tone_bw_hz = hz;
        self
    }

    /// Hi-low minimum separation between the two tones (Hz)
    pub fn with_hi_low_min_separation_hz(&mut self, hz: f32) -> &mut Self {
        self.hi_low_min_pair_separation_hz = hz;
        self
    }

    /// Long tone minimum length (seconds)
    pub fn with_long_tone_min_length(&mut self, secs: f64) -> &mut Self {
        self.long_tone_min_length = secs;
        self
    }

    /// Long tone maximum frequency spread (Hz)
    pub fn with_long_tone_bw_hz(&mut self, hz: f32) -> &mut Self {
        self.long_tone_bw_hz = hz;
        self
    }

    /// Pulsed tone auto-centering band (Hz)
    ///
    /// The pulsed detector estimates its own target frequency
    /// from a histogram of tones between `low` and `high`.
    pub fn with_pulsed_auto_center_band(&mut self, low: f32, high: f32) -> &mut Self {
        self.pulsed_auto_center_band = (low, high);
        self
    }

    /// Pulsed tone histogram bin width (Hz)
    pub fn with_pulsed_mode_bin_hz(&mut self, hz: f32) -> &mut Self {
        self.pulsed_mode_bin_hz = hz;
        self
    }

    /// Pulsed tone frequency tolerance (Hz)
    ///
    /// Pulses must lie within `hz` of the auto-centered frequency.
    pub fn with_pulsed_bw_hz(&mut self, hz: f32) -> &mut Self {
        self.pulsed_bw_hz = hz;
        self
    }

    /// Pulsed tone minimum number of pulses
    pub fn with_pulsed_min_cycles(&mut self, cycles: usize) -> &mut Self {
        self.pulsed_min_cycles = cycles;
        self
    }

    /// Pulsed tone ON duration range (milliseconds)
    pub fn with_pulsed_on_ms(&mut self, min: f64, max: f64) -> &mut Self {
        self.pulsed_min_on_ms = min;
        self.pulsed_max_on_ms = max;
        self
    }

    /// Pulsed tone OFF duration range (milliseconds)
    pub fn with_pulsed_off_ms(&mut self, min: f64, max: f64) -> &mut Self {
        self.pulsed_min_off_ms = min;
        self.pulsed_max_off_ms = max;
        self
    }

    /// Enable or disable one tone classifier
    pub fn with_detector(&mut self, kind: ToneKind, enabled: bool) -> &mut Self {
        match kind {
            ToneKind::Pulsed => self.detect_pulsed = enabled,
            ToneKind::TwoTone => self.detect_two_tone = enabled,
            ToneKind::LongTone => self.detect_long = enabled,
            ToneKind::HiLow => self.detect_hi_low = enabled,
        }
        self
    }

    /// Enable or disable one externally-decoded signal family
    ///
    /// Disabled families are never sent to the
    /// [`ExternalDecoder`](crate::ExternalDecoder).
    pub fn with_family(&mut self, family: SignalFamily, enabled: bool) -> &mut Self {
        match family {
            SignalFamily::Mdc => self.detect_mdc = enabled,
            SignalFamily::Dtmf => self.detect_dtmf = enabled,
        }
        self
    }

    /// Frequency matching tolerance (percent)
    pub fn matching_threshold(&self) -> f32 {
        self.matching_threshold
    }

    /// Analysis hop length (milliseconds)
    pub fn time_resolution_ms(&self) -> u32 {
        self.time_resolution_ms
    }

    /// Frequency search band `(low, high)` (Hz)
    pub fn frequency_band(&self) -> (f32, f32) {
        self.fe_freq_band
    }

    /// Bridged gap length (milliseconds)
    pub fn merge_short_gaps_ms(&self) -> f64 {
        self.fe_merge_short_gaps_ms
    }

    /// Silence gate (dB)
    pub fn silence_below_global_db(&self) -> f32 {
        self.fe_silence_below_global_db
    }

    /// SNR gate (dB)
    pub fn snr_above_noise_db(&self) -> f32 {
        self.fe_snr_above_noise_db
    }

    /// Absolute frequency tolerance cap (Hz)
    pub fn abs_cap_hz(&self) -> Option<f32> {
        self.fe_abs_cap_hz
    }

    /// Forced split step (Hz)
    pub fn force_split_step_hz(&self) -> Option<f32> {
        self.fe_force_split_step_hz
    }

    /// Forced split confirmation (frames)
    pub fn split_lookahead_frames(&self) -> usize {
        self.fe_split_lookahead_frames
    }

    /// Two-tone minimum lengths `(tone_a, tone_b)` (seconds)
    pub fn two_tone_lengths(&self) -> (f64, f64) {
        (self.tone_a_min_length, self.tone_b_min_length)
    }

    /// Two-tone maximum gap between A and B (seconds)
    pub fn two_tone_max_gap(&self) -> f64 {
        self.two_tone_max_gap_between_a_b
    }

    /// Two-tone maximum spread (Hz)
    pub fn two_tone_bw_hz(&self) -> f32 {
        self.two_tone_bw_hz
    }

    /// Two-tone minimum separation (Hz)
    pub fn two_tone_min_separation_hz(&self) -> f32 {
        self.two_tone_min_pair_separation_hz
    }

    /// Hi-low maximum gap (seconds)
    pub fn hi_low_interval(&self) -> f64 {
        self.hi_low_interval
    }

    /// Hi-low minimum alternations
    pub fn hi_low_min_alternations(&self) -> usize {
        self.hi_low_min_alternations
    }

    /// Hi-low tone tolerance (Hz)
    pub fn hi_low_bw_hz(&self) -> f32 {
        self.hi_low_tone_bw_hz
    }

    /// Hi-low minimum separation (Hz)
    pub fn hi_low_min_separation_hz(&self) -> f32 {
        self.hi_low_min_pair_separation_hz
    }

    /// Long tone minimum length (seconds)
    pub fn long_tone_min_length(&self) -> f64 {
        self.long_tone_min_length
    }

    /// Long tone maximum spread (Hz)
    pub fn long_tone_bw_hz(&self) -> f32 {
        self.long_tone_bw_hz
    }

    /// Pulsed tone auto-centering band `(low, high)` (Hz)
    pub fn pulsed_auto_center_band(&self) -> (f32, f32) {
        self.pulsed_auto_center_band
    }

    /// Pulsed tone histogram bin width (Hz)
    pub fn pulsed_mode_bin_hz(&self) -> f32 {
        self.pulsed_mode_bin_hz
    }

    /// Pulsed tone frequency tolerance (Hz)
    pub fn pulsed_bw_hz(&self) -> f32 {
        self.pulsed_bw_hz
    }

    /// Pulsed tone minimum pulses
    pub fn pulsed_min_cycles(&self) -> usize {
        self.pulsed_min_cycles
    }

    /// Pulsed tone ON range `(min, max)` (milliseconds)
    pub fn pulsed_on_ms(&self) -> (f64, f64) {
        (self.pulsed_min_on_ms, self.pulsed_max_on_ms)
    }

    /// Pulsed tone OFF range `(min, max)` (milliseconds)
    pub fn pulsed_off_ms(&self) -> (f64, f64) {
        (self.pulsed_min_off_ms, self.pulsed_max_off_ms)
    }

    /// True if the given classifier is enabled
    pub fn detector_enabled(&self, kind: ToneKind) -> bool {
        match kind {
            ToneKind::Pulsed => self.detect_pulsed,
            ToneKind::TwoTone => self.detect_two_tone,
            ToneKind::LongTone => self.detect_long,
            ToneKind::HiLow => self.detect_hi_low,
        }
    }

    /// True if the given external family is enabled
    pub fn family_enabled(&self, family: SignalFamily) -> bool {
        match family {
            SignalFamily::Mdc => self.detect_mdc,
            SignalFamily::Dtmf => self.detect_dtmf,
        }
    }
}

impl std::default::Default for ToneDetectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { name })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

fn range(name: &'static str, low: f64, high: f64) -> Result<(), ConfigError> {
    if low <= high {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange { name, low, high })
    }
}

// bands are non-empty: 0 ≤ low < high
fn band(name: &'static str, (low, high): (f32, f32)) -> Result<(), ConfigError> {
    let (low, high) = (low as f64, high as f64);
    finite(name, low)?;
    finite(name, high)?;
    non_negative(name, low)?;
    if low < high {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange { name, low, high })
    }
}
