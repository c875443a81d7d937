//! Recorded audio input

use thiserror::Error;

/// A complete mono recording
///
/// The `SampleBuffer` holds every `f32` PCM sample of one
/// finite recording at a known sampling rate. It is read-only
/// once built; the detector never modifies or resamples it.
///
/// Obtaining these samples (decoding a file, mixing to mono,
/// resampling) is beyond the scope of this crate. Pipe your
/// audio through `sox` or `ffmpeg` first.
///
/// ```
/// use pagetone::SampleBuffer;
///
/// let buf = SampleBuffer::from_i16(16000, &[0i16; 16000]).unwrap();
/// assert_eq!(buf.rate(), 16000);
/// assert_eq!(buf.duration(), 1.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    rate: u32,
    samples: Vec<f32>,
}

/// A sampling rate of zero was given
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
#[error("sampling rate must be greater than zero")]
pub struct SampleRateError {}

impl SampleBuffer {
    /// Wrap `f32` samples taken at `rate` Hz
    ///
    /// Samples should be scaled to `±1.0` full-scale, but this is
    /// not required: all level decisions are relative to the
    /// loudest part of the recording.
    pub fn new<S>(rate: u32, samples: S) -> Result<Self, SampleRateError>
    where
        S: Into<Vec<f32>>,
    {
        if rate == 0 {
            return Err(SampleRateError {});
        }

        Ok(Self {
            rate,
            samples: samples.into(),
        })
    }

    /// Convert signed 16-bit samples taken at `rate` Hz
    ///
    /// Samples are scaled to `±1.0` full-scale.
    pub fn from_i16(rate: u32, samples: &[i16]) -> Result<Self, SampleRateError> {
        const SCALE: f32 = 1.0f32 / 32768.0f32;
        Self::new(
            rate,
            samples.iter().map(|sa| *sa as f32 * SCALE).collect::<Vec<f32>>(),
        )
    }

    /// Sampling rate (Hz)
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// All samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the recording contains no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Recording length (seconds)
    pub fn duration(&self) -> f64 {
        self.sample_time(self.samples.len())
    }

    /// Time of the sample at `index` (seconds)
    ///
    /// All timestamps in this crate are derived from sample
    /// indices with this method so that adjacent spans share
    /// bit-identical boundaries.
    #[inline]
    pub fn sample_time(&self, index: usize) -> f64 {
        index as f64 / self.rate as f64
    }
}
