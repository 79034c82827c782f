//! Logging to the console and to `am.log`.
//!
//! Every record at DEBUG and above is written to `am.log` in the current
//! directory; the console only sees records at the level selected with `-v`
//! repetition.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};

const LOG_FILE: &str = "am.log";
const ROTATED_LOG_FILE: &str = "am.log.old";
/// Rotate the log once it grows past this size.
const LOG_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

struct Logger {
    console_level: AtomicUsize,
    file: Mutex<Option<File>>,
}

static LOGGER: Logger = Logger {
    console_level: AtomicUsize::new(2),
    file: Mutex::new(None),
};

fn encode_level(level: LevelFilter) -> usize {
    match level {
        LevelFilter::Off => 0,
        LevelFilter::Error => 1,
        LevelFilter::Warn => 2,
        LevelFilter::Info => 3,
        LevelFilter::Debug => 4,
        LevelFilter::Trace => 5,
    }
}

fn decode_level(level: usize) -> LevelFilter {
    match level {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl Logger {
    fn console_level(&self) -> LevelFilter {
        decode_level(self.console_level.load(Ordering::Relaxed))
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug || metadata.level() <= self.console_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if record.level() <= Level::Debug {
            if let Ok(mut file) = self.file.lock() {
                if let Some(file) = file.as_mut() {
                    let _ = writeln!(
                        file,
                        "{} {}: {} [{}]",
                        Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                        record.level(),
                        record.args(),
                        record.target(),
                    );
                }
            }
        }

        if record.level() <= self.console_level() {
            eprintln!("{}: {} [{}]", record.level(), record.args(), record.target());
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            if let Some(file) = file.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Raise the console level, e.g. for a `--verbose` flag.
pub fn set_console_level(level: LevelFilter) {
    let current = LOGGER.console_level.load(Ordering::Relaxed);
    let wanted = encode_level(level);
    if wanted > current {
        LOGGER.console_level.store(wanted, Ordering::Relaxed);
    }
}

/// Install the logger.
///
/// `verbose` is the number of `-v` flags given; the log file always records
/// at DEBUG. A missing or unwritable log file disables file logging rather
/// than the tool.
pub fn init(verbose: u64) {
    let console_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    LOGGER
        .console_level
        .store(encode_level(console_level), Ordering::Relaxed);

    if let Ok(metadata) = fs::metadata(LOG_FILE) {
        if metadata.len() > LOG_SIZE_LIMIT {
            let _ = fs::rename(LOG_FILE, ROTATED_LOG_FILE);
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
        .ok();
    if let Ok(mut guard) = LOGGER.file.lock() {
        *guard = file;
    }

    let _ = log::set_logger(&LOGGER);
    log::set_max_level(LevelFilter::Trace);
}
