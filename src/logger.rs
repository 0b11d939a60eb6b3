//! Stderr logging for harness runs.

use std::{env, str::FromStr};

use log::{Level, LevelFilter, Log, Metadata, Record};
use strum::EnumString;

/// Environment variable selecting the log level.
pub const ENV_LOG: &str = "PGRIDER_LOG";

/// Stderr logging verbosity.
#[derive(EnumString, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, Debug)]
#[strum(ascii_case_insensitive)]
pub enum LogLevel {
    Off,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug)]
struct Logger;

static LOGGER: &Logger = &Logger;

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !record.target().starts_with("pgrider") {
            // only log our logs
            return;
        }

        if record.level() == Level::Info {
            eprintln!("pgrider: {}", record.args());
        } else {
            eprintln!("pgrider {}: {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the stderr logger at `level`.
///
/// Safe to call more than once; later calls only adjust the level.
pub fn init(level: LogLevel) {
    let _ = log::set_logger(LOGGER);
    log::set_max_level(level.into());
}

/// Install the stderr logger at the level named by `PGRIDER_LOG` (default: info).
pub fn init_from_env() {
    let level = env::var(ENV_LOG)
        .ok()
        .and_then(|value| LogLevel::from_str(&value).ok())
        .unwrap_or_default();
    init(level);
}
