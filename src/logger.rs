//! Optional logger for tests and embedding harnesses
//!
//! The core itself only ever emits `log` records (spec.md §1: logging is an
//! out-of-scope external collaborator); it never installs a logger. This
//! module is a convenience `log::Log` impl, `LevelFilter`-gated and
//! env-driven, printing to stderr since this crate has no bare-metal
//! backend to route output through.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{Level, LevelFilter, Metadata, Record};

pub struct Logger {
    log_level: LevelFilter,
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.log_level >= metadata.level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "[{} | {}] {}",
                level_display(record.level()),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

impl Logger {
    const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

    fn from_env() -> Self {
        let log_level = std::env::var("TAGRV_LOG")
            .ok()
            .and_then(|s| match s.as_str() {
                "trace" => Some(LevelFilter::Trace),
                "debug" => Some(LevelFilter::Debug),
                "info" => Some(LevelFilter::Info),
                "warn" => Some(LevelFilter::Warn),
                "error" => Some(LevelFilter::Error),
                "off" => Some(LevelFilter::Off),
                _ => None,
            })
            .unwrap_or(Self::DEFAULT_LOG_LEVEL);

        Logger { log_level }
    }
}

/// Install the logger, reading `TAGRV_LOG` for the level (default `info`).
/// Idempotent: a second call logs a warning and leaves the first logger in
/// place.
pub fn init() {
    static IS_INITIALIZED: AtomicBool = AtomicBool::new(false);

    if IS_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        let logger = Logger::from_env();
        log::set_max_level(logger.log_level);
        log::set_boxed_logger(Box::new(logger)).unwrap();
    } else {
        log::warn!("logger is already initialized, skipping init");
    }
}

fn level_display(level: Level) -> &'static str {
    match level {
        Level::Error => "Error",
        Level::Warn => "Warn ",
        Level::Info => "Info ",
        Level::Debug => "Debug",
        Level::Trace => "Trace",
    }
}
