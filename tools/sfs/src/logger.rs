//! Minimal stderr backend for the `log` facade.
//!
//! The level comes from `SFS_LOG` (`off`, `error`, `warn`, `info`, `debug`,
//! `trace`) and defaults to `warn`.

use std::str::FromStr;

use log::{LevelFilter, Log, Metadata, Record};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:<5} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Parses an `SFS_LOG` value, falling back to `warn`
pub fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(LevelFilter::Warn)
}

/// Installs the logger. Later calls are ignored.
pub fn init() {
    let level = parse_level(std::env::var("SFS_LOG").ok().as_deref());
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
