//! Detector setup and one detection run
//!
//! ```txt
//! input ──► SampleBuffer ──► ToneDetector ──┬──► JSON
//!                 │                         │
//!                 └──► ChildDecoder (mdc) ──┤
//!                 └──► ChildDecoder (dtmf) ─┘
//! ```
//!
//! The decoder children only run when a program is given after `--`.

use log::{debug, log_enabled, trace, Level};
use strum::IntoEnumIterator;

use pagetone::{
    ConfigError, DetectionResult, Masker, SampleBuffer, SignalFamily, ToneDetector,
    ToneDetectorBuilder, ToneKind,
};

use crate::cli::Args;
use crate::spawner::ChildDecoder;

/// Build the tone detector from command-line `args`
///
/// Fails if any option is invalid.
pub fn detector(args: &Args) -> Result<ToneDetector, ConfigError> {
    let mut builder = ToneDetectorBuilder::new();
    builder
        .with_matching_threshold(args.matching_threshold)
        .with_time_resolution_ms(args.time_resolution_ms)
        .with_frequency_band(args.fe_freq_band.0, args.fe_freq_band.1)
        .with_merge_short_gaps_ms(args.fe_merge_short_gaps_ms)
        .with_silence_below_global_db(args.fe_silence_below_global_db)
        .with_snr_above_noise_db(args.fe_snr_above_noise_db)
        .with_abs_cap_hz(args.fe_abs_cap_hz)
        .with_force_split_step_hz(args.fe_force_split_step_hz)
        .with_split_lookahead_frames(args.fe_split_lookahead_frames)
        .with_two_tone_lengths(args.tone_a_min_length, args.tone_b_min_length)
        .with_two_tone_max_gap(args.two_tone_max_gap_between_a_b)
        .with_two_tone_bw_hz(args.two_tone_bw_hz)
        .with_two_tone_min_separation_hz(args.two_tone_min_pair_separation_hz)
        .with_hi_low_interval(args.hi_low_interval)
        .with_hi_low_min_alternations(args.hi_low_min_alternations)
        .with_hi_low_bw_hz(args.hi_low_tone_bw_hz)
        .with_hi_low_min_separation_hz(args.hi_low_min_pair_separation_hz)
        .with_long_tone_min_length(args.long_tone_min_length)
        .with_long_tone_bw_hz(args.long_tone_bw_hz)
        .with_pulsed_auto_center_band(
            args.pulsed_auto_center_band.0,
            args.pulsed_auto_center_band.1,
        )
        .with_pulsed_mode_bin_hz(args.pulsed_mode_bin_hz)
        .with_pulsed_bw_hz(args.pulsed_bw_hz)
        .with_pulsed_min_cycles(args.pulsed_min_cycles)
        .with_pulsed_on_ms(args.pulsed_min_on_ms, args.pulsed_max_on_ms)
        .with_pulsed_off_ms(args.pulsed_min_off_ms, args.pulsed_max_off_ms)
        .with_detector(ToneKind::Pulsed, args.detect_pulsed)
        .with_detector(ToneKind::TwoTone, args.detect_two_tone)
        .with_detector(ToneKind::LongTone, args.detect_long)
        .with_detector(ToneKind::HiLow, args.detect_hi_low)
        .with_family(SignalFamily::Mdc, args.detect_mdc)
        .with_family(SignalFamily::Dtmf, args.detect_dtmf);

    let detector = builder.build()?;
    if log_enabled!(Level::Debug) {
        if let Ok(cfg) = serde_json::to_string(detector.config()) {
            debug!("configuration: {}", cfg);
        }
    }
    Ok(detector)
}

/// Run one detection over `buffer`
///
/// If the user named a decoder program, the external families are
/// decoded by it. Otherwise they are reported empty.
pub fn run(args: &Args, detector: &ToneDetector, buffer: &SampleBuffer) -> DetectionResult {
    let analysis = match args.decoder.split_first() {
        Some((cmd, cmd_args)) => {
            let mut decoder = ChildDecoder::new(cmd, cmd_args);
            decoder.with_mdc_filter(args.mdc_high_pass, args.mdc_low_pass);
            detector.analyze_with(buffer, &decoder)
        }
        None => detector.analyze(buffer),
    };

    if log_enabled!(Level::Trace) {
        trace_masks(&analysis.masker);
    }

    let result = analysis.into_result();
    for evt in result.events() {
        debug!("{}", evt);
    }
    result
}

// Summarize the time claimed by each classifier
fn trace_masks(masker: &Masker) {
    for kind in ToneKind::iter() {
        let spans: Vec<String> = masker
            .intervals_by_owner(kind)
            .map(|iv| format!("[{:.3}, {:.3})", iv.start, iv.end))
            .collect();
        trace!("{} claimed {} span(s): {}", kind, spans.len(), spans.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;

    #[test]
    fn test_detector_from_args() {
        let args = Args::try_parse_from([
            "pagedec",
            "-t",
            "3.5",
            "--detect-hi-low",
            "false",
            "--pulsed-max-off-ms",
            "400",
        ])
        .expect("parse");
        let det = detector(&args).expect("build");
        assert_eq!(det.config().matching_threshold(), 3.5);
        assert!(!det.config().detector_enabled(ToneKind::HiLow));
        assert_eq!(det.config().pulsed_off_ms(), (25.0, 400.0));
    }

    #[test]
    fn test_invalid_options() {
        let args = Args::try_parse_from(["pagedec", "--fe-freq-band", "3000,200"]).expect("parse");
        assert!(matches!(
            detector(&args),
            Err(ConfigError::InvertedRange {
                name: "fe_freq_band",
                ..
            })
        ));
    }

    #[test]
    fn test_run_without_decoder() {
        let args = Args::try_parse_from(["pagedec"]).expect("parse");
        let det = detector(&args).expect("build");
        let buffer = SampleBuffer::from_i16(args.rate, &[0i16; 16000]).expect("rate");
        let result = run(&args, &det, &buffer);
        assert_eq!(result, DetectionResult::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_decoder() {
        let args = Args::try_parse_from([
            "pagedec",
            "--detect-dtmf",
            "false",
            "--",
            "sh",
            "-c",
            "cat > /dev/null; echo '[1]'",
        ])
        .expect("parse");
        let det = detector(&args).expect("build");
        let buffer = SampleBuffer::from_i16(args.rate, &[0i16; 16000]).expect("rate");
        let result = run(&args, &det, &buffer);
        assert_eq!(result.mdc.records(), &[serde_json::json!(1)]);
        assert!(result.dtmf.records().is_empty());
        assert!(result.events().is_empty());
    }
}
