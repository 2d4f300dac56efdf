//! Recover deleted files from an XFS image or block device.
//!
//! Every inode of the table without links that stores its data in extents is
//! written to `<output>/<prefix>_<index>.dat`.  The progress is logged to
//! standard output.
//!
//! # Exit codes
//!
//! - `0` - the scan completed, independent of the number of recovered files.
//! - `1` - no image given, an argument is not UTF-8, the image cannot be opened
//!   or it is not XFS.

use ap_storage::Error;
use ap_storage_linux::LinuxDisk;
use ap_storage_xfs_undelete::{report::Report, DecoderKind, Settings, Undelete};
use gumdrop::Options;
use log::{error, info, Level, LevelFilter, Metadata, Record};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Options)]
struct CommandOptions {
    /// Print the help message.
    help: bool,

    /// Log every block that is copied.
    verbose: bool,

    /// Only log warnings and errors.
    quiet: bool,

    /// The bytes to skip in the disk file.
    #[options(no_short, meta = "N")]
    offset: u64,

    /// Directory for the recovered files.
    #[options(short = "o", meta = "DIR", default = ".")]
    output: PathBuf,

    /// File name prefix of the recovered files.
    #[options(short = "p", default = "recovered_inode")]
    prefix: String,

    /// Extent decoder. One of {legacy,packed}.
    #[options(short = "d", default = "legacy")]
    decoder: DecoderKind,

    /// Scan only and do not write any file.
    #[options(short = "n")]
    dry_run: bool,

    /// Write a JSON summary to this file.
    #[options(short = "r", meta = "FILE")]
    report: Option<PathBuf>,

    /// The image or device.
    #[options(free)]
    image: Vec<String>,
}

/// Log lines on standard output where the front end picks them up.
struct StdoutLogger;

static LOGGER: StdoutLogger = StdoutLogger;

impl log::Log for StdoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut out = std::io::stdout().lock();
        let _ = match record.level() {
            Level::Info => writeln!(out, "{}", record.args()),
            Level::Error => writeln!(out, "error: {}", record.args()),
            Level::Warn => writeln!(out, "warning: {}", record.args()),
            Level::Debug | Level::Trace => writeln!(out, "debug: {}", record.args()),
        };
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Set by SIGINT and SIGTERM to end the scan early.
static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

fn run(opts: &CommandOptions, image: &str) -> Result<(), Error> {
    let disk = LinuxDisk::new(image, opts.offset)?;
    let undelete = Undelete::new(&disk, disk.size())?;
    undelete.log_superblock();

    let settings = Settings {
        output: opts.output.clone(),
        prefix: opts.prefix.clone(),
        decoder: opts.decoder,
        dry_run: opts.dry_run,
        source: Some(PathBuf::from(image)),
    };
    let summary = undelete.run(&settings, &STOP)?;
    info!(
        "Scanned {} inodes: {} deleted, {} recovered, {} malformed, {} extents dropped{}",
        summary.scanned,
        summary.eligible,
        summary.artifacts.len(),
        summary.malformed,
        summary.extents_dropped,
        if summary.cancelled { ", cancelled" } else { "" }
    );
    if let Some(path) = &opts.report {
        Report::new(image, &undelete, opts.decoder, &summary).write(path)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match std::env::args_os().skip(1).map(|arg| arg.into_string()).collect::<Result<Vec<_>, _>>() {
        Ok(args) => args,
        Err(arg) => {
            println!("xfs-undelete: argument {arg:?} is not valid UTF-8");
            return ExitCode::from(1);
        }
    };
    let opts = match CommandOptions::parse_args_default(&args) {
        Ok(opts) => opts,
        Err(e) => {
            println!("xfs-undelete: {e}");
            return ExitCode::from(1);
        }
    };
    if opts.help_requested() {
        println!("Usage: xfs-undelete [OPTIONS] IMAGE\n\n{}", CommandOptions::usage());
        return ExitCode::SUCCESS;
    }

    let _ = log::set_logger(&LOGGER);
    log::set_max_level(match (opts.verbose, opts.quiet) {
        (true, _) => LevelFilter::Debug,
        (_, true) => LevelFilter::Warn,
        _ => LevelFilter::Info,
    });

    let [image] = opts.image.as_slice() else {
        println!("Usage: xfs-undelete [OPTIONS] IMAGE");
        return ExitCode::from(1);
    };
    if !std::path::Path::new(image).exists() {
        error!("Disk image {image} does not exist.");
        return ExitCode::from(1);
    }

    install_signal_handlers();
    match run(&opts, image) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
