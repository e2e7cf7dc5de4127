//! aduc-upload CLI - flashes an ADuC70xx over its AN-724 serial bootloader.
//!
//! A thin binary over the `aduc-upload` library: argument parsing, a progress
//! bar, and help text live here so the library stays free of UI concerns.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use aduc_upload::{
    image, SerialConfig, Status, StatusSink, UploadFlags, Uploader, UploaderConfig,
};

/// Flash firmware onto an ADuC70xx over its AN-724 serial bootloader.
#[derive(Parser)]
#[command(name = "aduc-upload", author, version, about, long_about = None)]
struct Cli {
    /// Intel-HEX or raw binary firmware file. Omit (or pass `-`) to read from stdin.
    input: Option<PathBuf>,

    /// Serial port the device is connected to (e.g. `/dev/ttyUSB0`, `COM6`).
    #[arg(short, long, env = "ADUC_UPLOAD_PORT")]
    port: String,

    /// Baud rate. The bootloader defaults to 115200.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Verify every written byte once writing completes.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", default_value_t = false)]
    verify: bool,

    /// Jump to the application once writing (and verification) succeeds.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", default_value_t = false)]
    run: bool,

    /// Force a device reset once writing (and verification) succeeds.
    /// Ignored if `--run` is also given.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", default_value_t = false)]
    reset: bool,

    /// Shell command to run after a successful `--run`/`--reset`.
    #[arg(long = "thenrun", value_name = "SHELL")]
    then_run: Option<String>,

    /// Erase and unprotect the entire flash instead of per-segment erasing.
    #[arg(long = "massErase")]
    mass_erase: bool,

    /// Skip the erase phase entirely (the target range is assumed erased).
    #[arg(long)]
    no_erase: bool,

    /// Anchor address for a raw (non Intel-HEX) input file.
    #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
    address: u32,

    /// Number of retries for write/verify/run commands before giving up.
    #[arg(long, default_value_t = 3)]
    num_tries: u32,

    /// Verbosity (-v, -vv for more detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_hex_u32(s: &str) -> std::result::Result<u32, String> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(s, 16).map_err(|e| format!("invalid hex address '{s}': {e}"))
}

/// Bridges [`StatusSink`] to an `indicatif` progress bar plus `console`
/// styled log lines.
struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StatusSink for ProgressSink {
    fn status_changed(&mut self, status: Status) {
        let message = match status {
            Status::Connecting => "connecting",
            Status::WaitingForDevice => "waiting for device",
            Status::NotInFlashMode => "device is running firmware, not the bootloader",
            Status::DeviceFound => "bootloader found",
            Status::Erasing => "erasing",
            Status::EraseSucceeded => "erase succeeded",
            Status::EraseFailed => "erase failed",
            Status::Writing => "writing",
            Status::WriteSucceeded => "write succeeded",
            Status::WriteFailed => "write failed",
            Status::Verifying => "verifying",
            Status::VerifySucceeded => "verify succeeded",
            Status::VerifyFailed => "verify failed",
            Status::Running => "starting application",
            Status::RunSucceeded => "application started",
            Status::RunFailed => "run failed",
            Status::Resetting => "resetting device",
            Status::ResetSucceeded => "reset succeeded",
            Status::ResetFailed => "reset failed",
            Status::PostStep => "running post-run command",
            Status::PostStepSucceeded => "post-run command succeeded",
            Status::PostStepFailed => "post-run command failed",
            Status::Done => "done",
        };
        info!("{message}");
        self.bar.set_message(message.to_string());
    }

    fn progress_changed(&mut self, progress: f32) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = (progress.clamp(0.0, 1.0) * 100.0) as u64;
        self.bar.set_position(pct);
    }
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("error:").red().bold());
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let bytes = read_input(cli.input.as_deref()).context("failed to read firmware image")?;
    let segments = image::load_segments(&bytes, cli.address).context("failed to load image")?;

    let serial = SerialConfig::new(&cli.port, cli.baud).with_read_timeout(Duration::from_millis(10));
    let config = UploaderConfig::builder()
        .num_tries(cli.num_tries)
        .build()
        .context("invalid configuration")?;

    let mut sink = ProgressSink::new();
    let mut uploader =
        Uploader::connect(&serial, config, &mut sink).context("failed to open serial port")?;

    if cli.mass_erase {
        uploader.mass_erase().context("mass erase failed")?;
        sink.finish();
        println!("{}", style("mass erase complete").green());
        return Ok(());
    }

    let flags = UploadFlags {
        verify: cli.verify,
        run: cli.run,
        reset: cli.reset,
        no_erase: cli.no_erase,
        post_run: cli.then_run.clone(),
    };

    let result = uploader.upload_segments(&segments, &flags, &mut sink);
    sink.finish();
    result.context("upload failed")?;

    println!("{}", style("upload complete").green().bold());
    Ok(())
}

/// Read the firmware image from `path`, or from stdin when `path` is `None`
/// or literally `-`.
fn read_input(path: Option<&std::path::Path>) -> Result<Vec<u8>> {
    match path {
        Some(p) if p != std::path::Path::new("-") => {
            std::fs::read(p).with_context(|| format!("failed to read {}", p.display()))
        }
        _ => {
            if std::io::stdin().is_terminal() {
                anyhow::bail!("no input file given and stdin is a terminal");
            }
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}
