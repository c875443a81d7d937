use std::fmt::Display;

use clap::builder::BoolishValueParser;
use clap::{error::ErrorKind, value_parser, ArgAction, CommandFactory, Parser};

/// Standard input filename
const STDIN_FILE: &str = "-";

const USAGE_SHORT: &str = r#"
This program accepts raw PCM samples in signed 16-bit (i16) format, at the given sampling --rate, and detects any paging tones that are present. Detected tones are printed as JSON.

See --help for more details.

ALWAYS TEST YOUR DETECTION SETUP!
"#;

const USAGE_LONG: &str = r#"
This program accepts raw PCM samples in signed 16-bit (i16) format, at the given sampling --rate, and detects any paging tones that are present. The entire input is read before detection begins. Detected tones are printed as JSON.

You can pipe in an audio file with sox

    sox input.wav -t raw -r 16k -e signed -b 16 -c 1 - \
        | pagedec -r 16000

Arguments which follow "--" name a decoder program for MDC1200 and DTMF signaling. The decoder is run once for each enabled family, with the input audio piped to its standard input. It must print a JSON array of records to standard output and exit with status zero.

    pagedec -r 16000 --file call.raw -- my-mdc-dtmf-decoder

The decoder receives the following environment variables:

  PAGEDEC_RATE="16000" (configured sample --rate)
  PAGEDEC_FAMILY="mdc" (or dtmf)
  PAGEDEC_MDC_HIGH_PASS="200" (Hz)
  PAGEDEC_MDC_LOW_PASS="4000" (Hz)

If the decoder fails, its family reports {"error": "…"} and the tone results are still printed.

ALWAYS TEST YOUR DETECTION SETUP!
"#;

const FRONTEND: &str = "Spectral Frontend Options";
const TWO_TONE: &str = "Two-Tone Options";
const HI_LOW: &str = "Hi-Low Options";
const LONG_TONE: &str = "Long Tone Options";
const PULSED: &str = "Pulsed Tone Options";
const DETECTORS: &str = "Detector Selection";

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print NOTHING, not even the results
    #[arg(short, long)]
    pub quiet: bool,

    /// Sampling rate (Hz)
    ///
    /// Set to the sampling rate of your audio source. 16000 Hz or
    /// more is recommended.
    #[arg(short, long, default_value_t = 16000)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    pub rate: u32,

    /// Input file (or "-" for stdin)
    ///
    /// The input must be one-channel (mono), signed 16-bit
    /// native-endian at --rate.
    #[arg(long, default_value_t = STDIN_FILE.to_string())]
    pub file: String,

    /// Frequency matching tolerance (%)
    #[arg(short = 't', long, default_value_t = 2.5)]
    pub matching_threshold: f32,

    /// Analysis hop length (ms)
    #[arg(long, default_value_t = 50)]
    pub time_resolution_ms: u32,

    /// Frequency search band (LOW,HIGH Hz)
    #[arg(long, default_value = "200,3000", value_parser = parse_band)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = FRONTEND)]
    pub fe_freq_band: (f32, f32),

    /// Bridge OFF gaps up to this length (ms, 0 disables)
    #[arg(long, default_value_t = 0.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = FRONTEND)]
    pub fe_merge_short_gaps_ms: f64,

    /// Silence gate relative to loudest bin (dB, ≤ 0)
    #[arg(long, default_value_t = -28.0, allow_negative_numbers = true)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = FRONTEND)]
    pub fe_silence_below_global_db: f32,

    /// Required peak above median in-band level (dB)
    #[arg(long, default_value_t = 6.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = FRONTEND)]
    pub fe_snr_above_noise_db: f32,

    /// Absolute frequency tolerance cap (Hz)
    #[arg(long)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = FRONTEND)]
    pub fe_abs_cap_hz: Option<f32>,

    /// Split tones on single-frame steps above this (Hz)
    #[arg(long)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = FRONTEND)]
    pub fe_force_split_step_hz: Option<f32>,

    /// Frames required to confirm a forced split
    #[arg(long, default_value_t = 2)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = FRONTEND)]
    pub fe_split_lookahead_frames: usize,

    /// Minimum tone A length (s)
    #[arg(short = 'a', long, default_value_t = 0.85)]
    #[arg(help_heading = TWO_TONE)]
    pub tone_a_min_length: f64,

    /// Minimum tone B length (s)
    #[arg(short = 'b', long, default_value_t = 2.6)]
    #[arg(help_heading = TWO_TONE)]
    pub tone_b_min_length: f64,

    /// Maximum gap between tones A and B (s)
    #[arg(long, default_value_t = 0.35)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = TWO_TONE)]
    pub two_tone_max_gap_between_a_b: f64,

    /// Maximum frequency spread of each tone (Hz)
    #[arg(long, default_value_t = 25.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = TWO_TONE)]
    pub two_tone_bw_hz: f32,

    /// Minimum separation of tones A and B (Hz)
    #[arg(long, default_value_t = 40.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = TWO_TONE)]
    pub two_tone_min_pair_separation_hz: f32,

    /// Maximum gap between warble tones (s)
    #[arg(short = 'i', long, default_value_t = 0.2)]
    #[arg(help_heading = HI_LOW)]
    pub hi_low_interval: f64,

    /// Minimum number of alternations
    #[arg(short = 'n', long, default_value_t = 6)]
    #[arg(help_heading = HI_LOW)]
    pub hi_low_min_alternations: usize,

    /// Frequency tolerance of each warble tone (Hz)
    #[arg(long, default_value_t = 25.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = HI_LOW)]
    pub hi_low_tone_bw_hz: f32,

    /// Minimum separation of the two warble tones (Hz)
    #[arg(long, default_value_t = 40.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = HI_LOW)]
    pub hi_low_min_pair_separation_hz: f32,

    /// Minimum long tone length (s)
    #[arg(short = 'l', long, default_value_t = 3.8)]
    #[arg(help_heading = LONG_TONE)]
    pub long_tone_min_length: f64,

    /// Maximum frequency spread of a long tone (Hz)
    #[arg(long, default_value_t = 25.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = LONG_TONE)]
    pub long_tone_bw_hz: f32,

    /// Auto-centering band (LOW,HIGH Hz)
    #[arg(long, default_value = "200,3000", value_parser = parse_band)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = PULSED)]
    pub pulsed_auto_center_band: (f32, f32),

    /// Auto-centering histogram bin width (Hz)
    #[arg(long, default_value_t = 5.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = PULSED)]
    pub pulsed_mode_bin_hz: f32,

    /// Pulse frequency tolerance (Hz)
    #[arg(long, default_value_t = 25.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = PULSED)]
    pub pulsed_bw_hz: f32,

    /// Minimum number of pulses
    #[arg(long, default_value_t = 6)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = PULSED)]
    pub pulsed_min_cycles: usize,

    /// Minimum pulse length (ms)
    #[arg(long, default_value_t = 120.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = PULSED)]
    pub pulsed_min_on_ms: f64,

    /// Maximum pulse length (ms)
    #[arg(long, default_value_t = 900.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = PULSED)]
    pub pulsed_max_on_ms: f64,

    /// Minimum gap between pulses (ms)
    #[arg(long, default_value_t = 25.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = PULSED)]
    pub pulsed_min_off_ms: f64,

    /// Maximum gap between pulses (ms)
    #[arg(long, default_value_t = 350.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = PULSED)]
    pub pulsed_max_off_ms: f64,

    /// Detect pulsed single tones
    #[arg(long, default_value = "true", value_name = "BOOL")]
    #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    #[arg(help_heading = DETECTORS)]
    pub detect_pulsed: bool,

    /// Detect two-tone sequential paging
    #[arg(long, default_value = "true", value_name = "BOOL")]
    #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    #[arg(help_heading = DETECTORS)]
    pub detect_two_tone: bool,

    /// Detect long tones
    #[arg(long, default_value = "true", value_name = "BOOL")]
    #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    #[arg(help_heading = DETECTORS)]
    pub detect_long: bool,

    /// Detect hi-low warbles
    #[arg(long, default_value = "true", value_name = "BOOL")]
    #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    #[arg(help_heading = DETECTORS)]
    pub detect_hi_low: bool,

    /// Decode MDC1200 with the external decoder
    #[arg(long, default_value = "true", value_name = "BOOL")]
    #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    #[arg(help_heading = DETECTORS)]
    pub detect_mdc: bool,

    /// MDC1200 decoder high-pass corner (Hz)
    #[arg(long, default_value_t = 200)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = DETECTORS)]
    pub mdc_high_pass: u32,

    /// MDC1200 decoder low-pass corner (Hz)
    #[arg(long, default_value_t = 4000)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = DETECTORS)]
    pub mdc_low_pass: u32,

    /// Decode DTMF with the external decoder
    #[arg(long, default_value = "true", value_name = "BOOL")]
    #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    #[arg(help_heading = DETECTORS)]
    pub detect_dtmf: bool,

    /// External decoder for MDC1200 and DTMF. Optional.
    ///
    /// Arguments are provided VERBATIM to the decoder process
    /// without shell interpretation.
    #[arg(last = true)]
    pub decoder: Vec<String>,
}

impl Args {
    /// Return true if the user requests input from stdin
    pub fn input_is_stdin(&self) -> bool {
        self.file == STDIN_FILE
    }
}

/// Parse a `LOW,HIGH` frequency band
///
/// Validation of the band itself is left to the detector.
fn parse_band(arg: &str) -> Result<(f32, f32), String> {
    let (low, high) = arg
        .split_once(',')
        .ok_or_else(|| format!("expected LOW,HIGH but got \"{}\"", arg))?;

    let low: f32 = low
        .trim()
        .parse()
        .map_err(|e| format!("bad LOW frequency \"{}\": {}", low.trim(), e))?;
    let high: f32 = high
        .trim()
        .parse()
        .map_err(|e| format!("bad HIGH frequency \"{}\": {}", high.trim(), e))?;
    Ok((low, high))
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other types of errors
    /// are printed indirectly via clap's fancy formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 1 } else { 0 };
        CliError::new(err.into(), code)
    }
}

impl From<pagetone::ConfigError> for CliError {
    fn from(err: pagetone::ConfigError) -> CliError {
        CliError::new(anyhow::Error::new(err).context("invalid detector option"), 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clap() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_band() {
        assert_eq!(parse_band("200,3000"), Ok((200.0, 3000.0)));
        assert_eq!(parse_band(" 300.5 , 1200 "), Ok((300.5, 1200.0)));
        assert!(parse_band("200").is_err());
        assert!(parse_band("low,3000").is_err());
    }

    #[test]
    fn test_defaults_and_toggles() {
        let args = Args::try_parse_from(["pagedec"]).expect("parse");
        assert_eq!(args.rate, 16000);
        assert!(args.input_is_stdin());
        assert_eq!(args.fe_freq_band, (200.0, 3000.0));
        assert_eq!(args.fe_silence_below_global_db, -28.0);
        assert!(args.detect_mdc);
        assert!(args.decoder.is_empty());

        let args = Args::try_parse_from([
            "pagedec",
            "--detect-long",
            "no",
            "--detect-dtmf=0",
            "--fe-silence-below-global-db",
            "-35",
            "--fe-freq-band",
            "300,2500",
            "--",
            "decoder",
            "--fast",
        ])
        .expect("parse");
        assert!(!args.detect_long);
        assert!(!args.detect_dtmf);
        assert!(args.detect_pulsed);
        assert_eq!(args.fe_silence_below_global_db, -35.0);
        assert_eq!(args.fe_freq_band, (300.0, 2500.0));
        assert_eq!(args.decoder, vec!["decoder", "--fast"]);
    }
}
