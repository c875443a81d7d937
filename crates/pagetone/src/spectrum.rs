//! Spectral frontend
//!
//! The frontend cuts the recording into fixed-length *hops* and
//! reduces each hop to a single [`Frame`]: either the dominant
//! in-band frequency or an explicit OFF label.
//!
//! ```txt
//! samples  |----hop----|----hop----|----hop----|--partial--|
//! frames   |  1000 Hz  |  1000 Hz  |    OFF    |  1500 Hz  |
//! ```
//!
//! Hops never overlap and no hop is ever dropped, so the frames
//! tile the recording exactly. The last frame may be shorter
//! than the others.
//!
//! Each hop is Hann-windowed and zero-padded to at least
//! [`MIN_FFT_LENGTH`] points. A hop is OFF if either
//!
//! 1. its in-band peak is too far below the loudest bin of the
//!    whole recording (the *silence gate*); or
//!
//! 2. its in-band peak does not rise far enough above the median
//!    in-band bin of the same hop (the *SNR gate*).

use num_complex::Complex32;
use realfft::RealFftPlanner;
use serde::Serialize;

#[cfg(not(test))]
use log::{debug, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as warn;

use crate::buffer::SampleBuffer;
use crate::stats;

/// Minimum FFT length, in points
///
/// Short hops are zero-padded to this length to interpolate
/// the spectrum more finely.
pub const MIN_FFT_LENGTH: usize = 2048;

// magnitudes below this are treated as silence (−200 dBFS)
const MIN_MAGNITUDE: f32 = 1.0e-10;

/// One hop of the recording
///
/// `frequency` is `None` if the hop is OFF.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Frame {
    /// Hop number, from zero
    pub index: usize,

    /// Start of the hop (seconds)
    pub start: f64,

    /// End of the hop (seconds)
    pub end: f64,

    /// Dominant in-band frequency (Hz), or `None` if OFF
    pub frequency: Option<f32>,

    /// Linear magnitude of the in-band peak
    pub magnitude: f32,
}

impl Frame {
    /// True if the hop carries a tone
    #[inline]
    pub fn is_on(&self) -> bool {
        self.frequency.is_some()
    }

    /// Hop length (seconds)
    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Short-time spectral peak picker
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralFrontend {
    time_resolution_ms: u32,
    band: (f32, f32),
    silence_below_global_db: f32,
    snr_above_noise_db: f32,
}

impl SpectralFrontend {
    /// New frontend
    ///
    /// * `time_resolution_ms`: hop length, in milliseconds
    /// * `band`: `(low, high)` search band, in Hz. The upper edge is
    ///   clipped to the Nyquist rate of the recording.
    /// * `silence_below_global_db`: a non-positive level, in dB,
    ///   relative to the loudest bin of the recording. Hops whose
    ///   in-band peak is quieter than this are OFF.
    /// * `snr_above_noise_db`: a hop's in-band peak must exceed its
    ///   median in-band bin by this many dB
    pub fn new(
        time_resolution_ms: u32,
        band: (f32, f32),
        silence_below_global_db: f32,
        snr_above_noise_db: f32,
    ) -> Self {
        Self {
            time_resolution_ms: u32::max(time_resolution_ms, 1),
            band,
            silence_below_global_db,
            snr_above_noise_db,
        }
    }

    /// Hop length, in samples, at the given sampling `rate`
    pub fn hop_length(&self, rate: u32) -> usize {
        let hop = (rate as f64 * self.time_resolution_ms as f64 / 1000.0).round() as usize;
        usize::max(hop, 1)
    }

    /// FFT length, in points, for the given hop length
    pub fn fft_length(hop: usize) -> usize {
        usize::max(MIN_FFT_LENGTH, hop.next_power_of_two())
    }

    /// Label every hop of the recording
    ///
    /// Returns one [`Frame`] per hop, in time order. An empty
    /// buffer produces no frames. A silent buffer produces only
    /// OFF frames.
    pub fn frames(&self, buffer: &SampleBuffer) -> Vec<Frame> {
        let hop = self.hop_length(buffer.rate());
        let peaks = self.peaks(buffer, hop);

        // loudest bin anywhere in the recording
        let global = peaks
            .iter()
            .flatten()
            .fold(0.0f32, |acc, pk| f32::max(acc, pk.full_band_peak));
        let global_db = to_db(global);

        let mut out = Vec::with_capacity(peaks.len());
        for (index, peak) in peaks.into_iter().enumerate() {
            let start_sa = index * hop;
            let end_sa = usize::min(start_sa + hop, buffer.len());
            let (frequency, magnitude) = match peak {
                Some(pk) if global > MIN_MAGNITUDE => {
                    let peak_db = to_db(pk.magnitude);
                    let quiet = peak_db - global_db < self.silence_below_global_db;
                    let noisy = peak_db - to_db(pk.noise_floor) < self.snr_above_noise_db;
                    let frequency = if quiet || noisy {
                        None
                    } else {
                        Some(pk.frequency)
                    };
                    (frequency, pk.magnitude)
                }
                Some(pk) => (None, pk.magnitude),
                None => (None, 0.0f32),
            };

            out.push(Frame {
                index,
                start: buffer.sample_time(start_sa),
                end: buffer.sample_time(end_sa),
                frequency,
                magnitude,
            });
        }

        debug!(
            "frontend: {} of {} frames ON (hop {} samples)",
            out.iter().filter(|fr| fr.is_on()).count(),
            out.len(),
            hop
        );

        out
    }

    // Estimate the spectral peak of every hop
    //
    // A hop is `None` if its spectrum could not be computed.
    fn peaks(&self, buffer: &SampleBuffer, hop: usize) -> Vec<Option<PeakEstimate>> {
        if buffer.is_empty() {
            return Vec::new();
        }

        let nfft = Self::fft_length(hop);
        let bin_hz = buffer.rate() as f32 / nfft as f32;
        let last_bin = nfft / 2;

        let lo_bin = usize::max((self.band.0 / bin_hz).ceil() as usize, 1);
        let hi_bin = usize::min((self.band.1 / bin_hz).floor() as usize, last_bin);
        if lo_bin > hi_bin {
            warn!(
                "frontend: search band {:.0}–{:.0} Hz is empty at {} Hz sampling rate",
                self.band.0,
                self.band.1,
                buffer.rate()
            );
        }

        debug!(
            "frontend: {}-point FFT, {:.2} Hz bins, searching bins {}–{}",
            nfft, bin_hz, lo_bin, hi_bin
        );

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(nfft);
        let mut input = fft.make_input_vec();
        let mut spectrum: Vec<Complex32> = fft.make_output_vec();
        let window = hann_window(hop);

        let mut out = Vec::with_capacity(buffer.len() / hop + 1);
        for chunk in buffer.samples().chunks(hop) {
            let partial_window;
            let win = if chunk.len() == hop {
                &window
            } else {
                partial_window = hann_window(chunk.len());
                &partial_window
            };

            input.iter_mut().for_each(|x| *x = 0.0f32);
            for ((inp, sa), w) in input.iter_mut().zip(chunk.iter()).zip(win.iter()) {
                *inp = sa * w;
            }

            if let Err(err) = fft.process(&mut input, &mut spectrum) {
                warn!("frontend: FFT failed, marking hop OFF: {}", err);
                out.push(None);
                continue;
            }

            let magnitudes: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();
            out.push(Some(PeakEstimate::from_magnitudes(
                &magnitudes,
                lo_bin,
                hi_bin,
                bin_hz,
            )));
        }

        out
    }
}

// Spectral peak of one hop
#[derive(Clone, Copy, Debug, PartialEq)]
struct PeakEstimate {
    // in-band peak frequency (Hz), interpolated
    frequency: f32,

    // in-band peak magnitude
    magnitude: f32,

    // median in-band magnitude
    noise_floor: f32,

    // largest non-DC magnitude at any frequency
    full_band_peak: f32,
}

impl PeakEstimate {
    // Find the peak of `magnitudes[lo_bin..=hi_bin]`
    //
    // If the band is empty, the estimate has zero magnitude.
    fn from_magnitudes(magnitudes: &[f32], lo_bin: usize, hi_bin: usize, bin_hz: f32) -> Self {
        let full_band_peak = magnitudes
            .iter()
            .skip(1)
            .fold(0.0f32, |acc, m| f32::max(acc, *m));

        if lo_bin > hi_bin || hi_bin >= magnitudes.len() {
            return Self {
                frequency: 0.0,
                magnitude: 0.0,
                noise_floor: 0.0,
                full_band_peak,
            };
        }

        let band = &magnitudes[lo_bin..=hi_bin];
        let (peak_idx, magnitude) = band
            .iter()
            .enumerate()
            .fold((0usize, f32::MIN), |(bi, bm), (i, m)| {
                if *m > bm {
                    (i, *m)
                } else {
                    (bi, bm)
                }
            });

        let offset = if peak_idx > 0 && peak_idx + 1 < band.len() {
            parabolic_offset(band[peak_idx - 1], band[peak_idx], band[peak_idx + 1])
        } else {
            0.0f32
        };

        Self {
            frequency: ((lo_bin + peak_idx) as f32 + offset) * bin_hz,
            magnitude,
            noise_floor: stats::median(band).unwrap_or(0.0),
            full_band_peak,
        }
    }
}

// Fractional bin offset of a peak from its log-magnitude neighbors
//
// Fits a parabola through `(−1, left)`, `(0, center)`,
// `(+1, right)` and returns the abscissa of its vertex,
// in `[-0.5, +0.5]`.
fn parabolic_offset(left: f32, center: f32, right: f32) -> f32 {
    let a = f32::max(left, MIN_MAGNITUDE).ln();
    let b = f32::max(center, MIN_MAGNITUDE).ln();
    let c = f32::max(right, MIN_MAGNITUDE).ln();
    let denom = a - 2.0f32 * b + c;
    if denom.abs() < f32::EPSILON {
        0.0f32
    } else {
        f32::clamp(0.5f32 * (a - c) / denom, -0.5, 0.5)
    }
}

// Symmetric Hann window of `len` points
fn hann_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0f32; len];
    }

    let n_minus_1 = (len - 1) as f32;
    (0..len)
        .map(|i| 0.5f32 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

// Linear magnitude to decibels
#[inline]
fn to_db(mag: f32) -> f32 {
    20.0f32 * f32::max(mag, MIN_MAGNITUDE).log10()
}
