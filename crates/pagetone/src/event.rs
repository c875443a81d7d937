//! Detected tone events

use std::fmt;

use serde::Serialize;
use strum::EnumMessage;

/// Kind of tone signaling
///
/// Each kind is detected by its own classifier. The kind also
/// identifies which classifier owns a masked span of time.
///
/// ```
/// use pagetone::ToneKind;
///
/// assert_eq!("qc", ToneKind::TwoTone.id_prefix());
/// assert_eq!("two_tone", ToneKind::TwoTone.as_ref());
/// assert_eq!("Two-tone (Quick Call)", &format!("{}", ToneKind::TwoTone));
/// ```
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
    strum_macros::EnumMessage,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToneKind {
    /// One steady tone keyed on and off repeatedly
    #[strum(message = "pl", detailed_message = "Pulsed single tone")]
    Pulsed,

    /// Tone A followed by tone B
    #[strum(message = "qc", detailed_message = "Two-tone (Quick Call)")]
    TwoTone,

    /// A single steady tone held for a long time
    #[strum(message = "lt", detailed_message = "Long tone")]
    LongTone,

    /// Two tones alternating repeatedly
    #[strum(message = "hl", detailed_message = "Hi-low warble")]
    HiLow,
}

impl ToneKind {
    /// Prefix for the `tone_id` of events of this kind
    pub fn id_prefix(&self) -> &'static str {
        self.get_message().expect("missing definition")
    }

    /// Human-readable name
    pub fn as_display_str(&self) -> &'static str {
        self.get_detailed_message().expect("missing definition")
    }

    /// Build the `tone_id` for the `ordinal`-th event (from 1)
    pub(crate) fn tone_id(&self, ordinal: usize) -> String {
        format!("{}_{}", self.id_prefix(), ordinal)
    }
}

impl fmt::Display for ToneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_display_str())
    }
}

/// A pulsed single-tone detection
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PulsedEvent {
    /// Event identifier, like `pl_1`
    pub tone_id: String,

    /// Median frequency of the ON pulses (Hz)
    pub detected_freq: f32,

    /// Start of the first pulse (seconds)
    pub start: f64,

    /// End of the last pulse (seconds)
    pub end: f64,

    /// `end - start` (seconds)
    pub length: f64,

    /// Number of ON pulses
    pub cycles: usize,

    /// Median ON pulse duration (milliseconds)
    ///
    /// Measured in whole analysis hops. A hop which holds any
    /// audible part of a pulse counts as ON, so this may read up
    /// to one hop longer than the true pulse.
    pub on_ms_median: f64,

    /// Median OFF gap between pulses (milliseconds)
    ///
    /// Measured in whole analysis hops, and may read up to one hop
    /// shorter than the true gap. Zero if the run has only one
    /// pulse.
    pub off_ms_median: f64,
}

/// A two-tone (Quick Call) detection
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TwoToneEvent {
    /// Event identifier, like `qc_1`
    pub tone_id: String,

    /// Frequencies of tone A and tone B, in that order (Hz)
    pub freq_pair: [f32; 2],

    /// Duration of tone A (seconds)
    pub tone_a_length: f64,

    /// Duration of tone B (seconds)
    pub tone_b_length: f64,

    /// Start of tone A (seconds)
    pub start: f64,

    /// End of tone B (seconds)
    pub end: f64,
}

/// A long-tone detection
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LongToneEvent {
    /// Event identifier, like `lt_1`
    pub tone_id: String,

    /// Tone frequency (Hz)
    pub detected_freq: f32,

    /// Duration (seconds)
    pub length: f64,

    /// Start (seconds)
    pub start: f64,

    /// End (seconds)
    pub end: f64,
}

/// A hi-low warble detection
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HiLowEvent {
    /// Event identifier, like `hl_1`
    pub tone_id: String,

    /// The low and high frequencies, in that order (Hz)
    pub freq_pair: [f32; 2],

    /// Number of changes between the two frequencies
    pub alternations: usize,

    /// `end - start` (seconds)
    pub length: f64,

    /// Start of the first tone (seconds)
    pub start: f64,

    /// End of the last tone (seconds)
    pub end: f64,
}

/// Any detected tone event
///
/// The closed set of everything the classifiers can report.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToneEvent {
    /// Pulsed single tone
    Pulsed(PulsedEvent),

    /// Two-tone (Quick Call)
    TwoTone(TwoToneEvent),

    /// Long tone
    LongTone(LongToneEvent),

    /// Hi-low warble
    HiLow(HiLowEvent),
}

impl ToneEvent {
    /// Which classifier produced this event
    pub fn kind(&self) -> ToneKind {
        match self {
            ToneEvent::Pulsed(_) => ToneKind::Pulsed,
            ToneEvent::TwoTone(_) => ToneKind::TwoTone,
            ToneEvent::LongTone(_) => ToneKind::LongTone,
            ToneEvent::HiLow(_) => ToneKind::HiLow,
        }
    }

    /// Event identifier
    pub fn tone_id(&self) -> &str {
        match self {
            ToneEvent::Pulsed(e) => &e.tone_id,
            ToneEvent::TwoTone(e) => &e.tone_id,
            ToneEvent::LongTone(e) => &e.tone_id,
            ToneEvent::HiLow(e) => &e.tone_id,
        }
    }

    /// Start time (seconds)
    pub fn start(&self) -> f64 {
        match self {
            ToneEvent::Pulsed(e) => e.start,
            ToneEvent::TwoTone(e) => e.start,
            ToneEvent::LongTone(e) => e.start,
            ToneEvent::HiLow(e) => e.start,
        }
    }

    /// End time (seconds)
    pub fn end(&self) -> f64 {
        match self {
            ToneEvent::Pulsed(e) => e.end,
            ToneEvent::TwoTone(e) => e.end,
            ToneEvent::LongTone(e) => e.end,
            ToneEvent::HiLow(e) => e.end,
        }
    }
}

impl fmt::Display for ToneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:.3} s → {:.3} s]: {}",
            self.tone_id(),
            self.start(),
            self.end(),
            self.kind()
        )?;
        match self {
            ToneEvent::Pulsed(e) => write!(
                f,
                " {:.1} Hz, {} cycles ({:.0}/{:.0} ms)",
                e.detected_freq, e.cycles, e.on_ms_median, e.off_ms_median
            ),
            ToneEvent::TwoTone(e) => write!(
                f,
                " {:.1} Hz → {:.1} Hz",
                e.freq_pair[0], e.freq_pair[1]
            ),
            ToneEvent::LongTone(e) => write!(f, " {:.1} Hz", e.detected_freq),
            ToneEvent::HiLow(e) => write!(
                f,
                " {:.1}/{:.1} Hz, {} alternations",
                e.freq_pair[0], e.freq_pair[1], e.alternations
            ),
        }
    }
}

impl From<PulsedEvent> for ToneEvent {
    fn from(e: PulsedEvent) -> Self {
        Self::Pulsed(e)
    }
}

impl From<TwoToneEvent> for ToneEvent {
    fn from(e: TwoToneEvent) -> Self {
        Self::TwoTone(e)
    }
}

impl From<LongToneEvent> for ToneEvent {
    fn from(e: LongToneEvent) -> Self {
        Self::LongTone(e)
    }
}

impl From<HiLowEvent> for ToneEvent {
    fn from(e: HiLowEvent) -> Self {
        Self::HiLow(e)
    }
}

// Round a time in seconds to the nearest millisecond
pub(crate) fn round_secs(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

// Convert seconds to milliseconds, rounded to the nearest 0.1 ms
pub(crate) fn round_ms(secs: f64) -> f64 {
    (secs * 10000.0).round() / 10.0
}

// Round a frequency to the nearest 0.1 Hz
pub(crate) fn round_hz(hz: f32) -> f32 {
    (hz * 10.0).round() / 10.0
}
