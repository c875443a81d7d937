//! # pagetone: Paging Tone Detection
//!
//! This crate finds fire, EMS, and public-safety *alerting tones* in
//! recorded radio audio. It reports each tone as a typed, timestamped
//! event:
//!
//! * **Two-tone** sequential paging ("Quick Call"): tone A, then
//!   tone B
//! * **Long tone**: one steady tone held for several seconds
//! * **Hi-low** warble: two tones alternating repeatedly
//! * **Pulsed** single tone: one tone keyed on and off repeatedly
//!
//! ## Disclaimer
//!
//! This crate is dual-licensed MIT and Apache 2.0. Read these licenses
//! carefully as they may affect your rights.
//!
//! This crate has not been certified for any purpose. Do not rely on it
//! as your only means of receiving dispatch alerts.
//!
//! ## Example
//!
//! Obtaining the audio is beyond the scope of this crate. The detector
//! analyzes one complete, finite, mono recording at a time. If you
//! have a stereo recording or a compressed file, convert it with `sox`
//! or `ffmpeg` first.
//!
//! ```
//! use pagetone::{SampleBuffer, ToneDetectorBuilder};
//!
//! # let rate = 16000;
//! # let some_recording = || -> Vec<i16> { vec![0i16; 16000] };
//! #
//! // one recording of signed 16-bit samples
//! let samples: Vec<i16> = some_recording();
//! let buffer = SampleBuffer::from_i16(rate, &samples).expect("bad rate");
//!
//! let detector = ToneDetectorBuilder::new()
//!     .with_matching_threshold(2.5)     // frequency tolerance, percent
//!     .with_two_tone_lengths(0.85, 2.6) // minimum A and B lengths, seconds
//!     .with_long_tone_min_length(3.8)   // minimum long tone, seconds
//!     .build()
//!     .expect("invalid configuration");
//!
//! let result = detector.detect(&buffer);
//! for evt in result.events() {
//!     println!("{}", evt);
//! }
//!
//! // the whole result serializes to JSON
//! let json = serde_json::to_string(&result).expect("serialize");
//! assert!(json.starts_with("{\"pulsed\":[]"));
//! ```
//!
//! The [`ToneDetector`] is created via a [builder](ToneDetectorBuilder).
//! It holds no state between recordings.
//!
//! ## How it works
//!
//! 1. The recording is cut into non-overlapping hops, 50 ms by default.
//!    The [`SpectralFrontend`] reduces each hop to a [`Frame`] with its
//!    dominant frequency, or OFF if the hop is silent or noisy.
//!
//! 2. The [`FrequencyGrouper`] merges frames into [`Group`]s: runs of
//!    one continuous tone, or of silence. Groups tile the recording
//!    without gaps.
//!
//! 3. Four classifiers search the groups in a fixed priority order:
//!    pulsed, two-tone, hi-low, and then long tone. When a classifier
//!    accepts a match, it claims that span of time in the [`Masker`].
//!    Lower-priority classifiers skip claimed time, so events of
//!    different kinds never overlap.
//!
//! Use [`ToneDetector::analyze()`] to inspect the frames, groups, and
//! claimed spans of a run.
//!
//! ## Other signal families
//!
//! Dispatch channels also carry MDC1200 data bursts and DTMF digits.
//! This crate does not decode them. Implement [`ExternalDecoder`] and
//! call [`ToneDetector::detect_with()`] to run your decoder alongside
//! the tone detector and fold its records into the same
//! [`DetectionResult`].

mod buffer;
mod builder;
mod detector;
mod event;
mod grouper;
mod mask;
mod result;
mod spectrum;
mod stats;

pub use buffer::{SampleBuffer, SampleRateError};
pub use builder::{ConfigError, ToneDetectorBuilder};
pub use detector::{Analysis, ToneDetector};
pub use event::{HiLowEvent, LongToneEvent, PulsedEvent, ToneEvent, ToneKind, TwoToneEvent};
pub use grouper::{FrequencyGrouper, Group};
pub use mask::{MaskError, MaskedInterval, Masker};
pub use result::{DecoderError, DetectionResult, ExternalDecoder, FamilyOutcome, SignalFamily};
pub use spectrum::{Frame, SpectralFrontend, MIN_FFT_LENGTH};
