use std::io;

use anyhow::{anyhow, Context};
use byteorder::{NativeEndian, ReadBytesExt};
use clap::Parser;
use log::{info, LevelFilter};

use pagetone::SampleBuffer;

mod app;
mod cli;
mod spawner;

use cli::{Args, CliError};

fn main() {
    match pagedec() {
        Ok(()) => {}
        Err(cli_error) => cli_error.exit(),
    }
}

fn pagedec() -> Result<(), CliError> {
    // Parse options and start logging
    let args = Args::try_parse()?;
    log_setup(&args);

    // create the detector: fails fast on bad options
    let detector = app::detector(&args)?;

    // file setup: locks stdin in case we need it
    let stdin = io::stdin();
    let stdin_handle = stdin.lock();
    let mut inbuf = file_setup(&args, stdin_handle)?;

    // read the entire recording as i16
    let samples: Vec<i16> =
        std::iter::from_fn(|| inbuf.read_i16::<NativeEndian>().ok()).collect();
    let buffer = SampleBuffer::from_i16(args.rate, &samples)
        .map_err(|e| anyhow!(e).context("invalid --rate"))?;
    info!(
        "read {} samples ({:.3} s) at {} Hz",
        buffer.len(),
        buffer.duration(),
        buffer.rate()
    );

    let result = app::run(&args, &detector, &buffer);

    if !args.quiet {
        let json = serde_json::to_string_pretty(&result).context("unable to format results")?;
        println!("{}", json);
    }

    Ok(())
}

fn log_setup(args: &Args) {
    if args.quiet {
        // no logging
        return;
    } else if std::env::var_os("RUST_LOG").is_none() {
        // parameter controls
        let log_filter = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            3 | _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("pagetone", log_filter)
            .filter_module("pagedec", log_filter)
            .init();
    } else {
        // environment controls
        pretty_env_logger::init();
    }
}

fn file_setup<'stdin>(
    args: &Args,
    stdin: std::io::StdinLock<'stdin>,
) -> Result<Box<dyn io::BufRead + 'stdin>, anyhow::Error> {
    if args.input_is_stdin() {
        info!("tone detector reading standard input");
        if !is_terminal(&std::io::stdin()) {
            Ok(Box::new(io::BufReader::new(stdin)))
        } else {
            Err(anyhow!(
                "cowardly refusing to read audio samples from a terminal.

Pipe a recording of raw uncompressed audio from sox, ffmpeg,
or similar into this program."
            ))
        }
    } else {
        info!("tone detector reading file: \"{}\"", &args.file);
        Ok(Box::new(io::BufReader::new(
            std::fs::File::open(&args.file)
                .with_context(|| format!("Unable to open --file \"{}\"", args.file))?,
        )))
    }
}

#[cfg(not(target_os = "windows"))]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::fd::AsRawFd,
{
    terminal_size::terminal_size_using_fd(stream.as_raw_fd()).is_some()
}

#[cfg(target_os = "windows")]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::windows::io::AsRawHandle,
{
    terminal_size::terminal_size_using_handle(stream.as_raw_handle()).is_some()
}
