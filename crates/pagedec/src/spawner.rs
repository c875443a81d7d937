//! Runs the external MDC1200/DTMF decoder as a child process

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::{Command, Stdio};

use byteorder::{NativeEndian, WriteBytesExt};
use log::{debug, warn};
use serde_json::Value;

use pagetone::{DecoderError, ExternalDecoder, SampleBuffer, SignalFamily};

/// External decoder program
///
/// The program is started once per signal family. It receives
/// the recording on standard input, as `i16` native-endian
/// samples, and the variables in [`childenv`] in its
/// environment. It must print one JSON array to standard output.
#[derive(Clone, Debug)]
pub struct ChildDecoder {
    cmd: OsString,
    args: Vec<OsString>,
    mdc_high_pass: u32,
    mdc_low_pass: u32,
}

impl ChildDecoder {
    /// Decoder which runs `cmd` with the given `args`
    pub fn new<C, A, B>(cmd: C, args: A) -> Self
    where
        C: Into<OsString>,
        B: Into<OsString>,
        A: IntoIterator<Item = B>,
    {
        Self {
            cmd: cmd.into(),
            args: args.into_iter().map(Into::into).collect(),
            mdc_high_pass: 200,
            mdc_low_pass: 4000,
        }
    }

    /// MDC1200 filter corners (Hz), passed through to the child
    pub fn with_mdc_filter(&mut self, high_pass: u32, low_pass: u32) -> &mut Self {
        self.mdc_high_pass = high_pass;
        self.mdc_low_pass = low_pass;
        self
    }
}

impl ExternalDecoder for ChildDecoder {
    fn decode(
        &self,
        buffer: &SampleBuffer,
        family: SignalFamily,
    ) -> Result<Vec<Value>, DecoderError> {
        debug!(
            "spawning {} decoder: {:?} {:?}",
            family.as_ref(),
            self.cmd,
            self.args
        );

        let mut child = Command::new(&self.cmd)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .env(childenv::PAGEDEC_RATE, buffer.rate().to_string())
            .env(childenv::PAGEDEC_FAMILY, family.as_ref())
            .env(childenv::PAGEDEC_MDC_HIGH_PASS, self.mdc_high_pass.to_string())
            .env(childenv::PAGEDEC_MDC_LOW_PASS, self.mdc_low_pass.to_string())
            .spawn()
            .map_err(DecoderError::Spawn)?;

        // feed stdin from another thread so a chatty child cannot
        // deadlock on a full stdout pipe
        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || -> io::Result<()> {
                match stdin {
                    Some(stdin) => write_samples(stdin, buffer.samples()),
                    None => Ok(()),
                }
            });

            let output = child.wait_with_output();
            match writer.join() {
                Ok(Err(err)) if err.kind() != io::ErrorKind::BrokenPipe => {
                    warn!("{} decoder: unable to write samples: {}", family.as_ref(), err)
                }
                _ => {}
            }
            output
        })?;

        if !output.status.success() {
            return Err(DecoderError::Exited {
                code: output.status.code().unwrap_or(-1),
            });
        }

        parse_records(&output.stdout)
    }
}

// Write `samples` as i16 native-endian, then close the stream
fn write_samples<W: Write>(out: W, samples: &[f32]) -> io::Result<()> {
    let mut out = io::BufWriter::new(out);
    for sa in samples {
        let sa = (sa * 32768.0f32).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.write_i16::<NativeEndian>(sa)?;
    }
    out.flush()
}

// Parse the child's standard output
//
// Empty output means no records.
fn parse_records(stdout: &[u8]) -> Result<Vec<Value>, DecoderError> {
    if stdout.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(stdout)?)
}

pub mod childenv {
    /// Decoder input rate
    ///
    /// The audio input `--rate` that pagedec is running at. This is
    /// also the rate of the samples on the child's standard input.
    pub const PAGEDEC_RATE: &str = "PAGEDEC_RATE";

    /// Signal family to decode
    ///
    /// Either `mdc` or `dtmf`.
    pub const PAGEDEC_FAMILY: &str = "PAGEDEC_FAMILY";

    /// MDC1200 high-pass filter corner (Hz)
    pub const PAGEDEC_MDC_HIGH_PASS: &str = "PAGEDEC_MDC_HIGH_PASS";

    /// MDC1200 low-pass filter corner (Hz)
    pub const PAGEDEC_MDC_LOW_PASS: &str = "PAGEDEC_MDC_LOW_PASS";
}
