use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{stderr, Write};
use std::sync::Once;

/// Log implementation writing diagnostics to standard error
///
/// Standard output is reserved for the probe report, so every record goes to stderr, tagged with
/// its level.
pub struct StdLogger {
    level: LevelFilter,
}

impl StdLogger {
    /// Initialize logger for the given number of `-v` flags
    ///
    /// Even if this function is called multiple times, initialization will only be done once. If
    /// another logger was installed first, that one stays in place.
    pub fn init(verbosity: u64) {
        static INIT: Once = Once::new();

        // Initialization may run from more than one thread
        INIT.call_once(|| {
            let level = Self::level_for(verbosity);
            if log::set_boxed_logger(Box::new(StdLogger { level })).is_ok() {
                log::set_max_level(level);
            }
        });
    }

    /// Map the number of `-v` flags to a level filter
    pub fn level_for(verbosity: u64) -> LevelFilter {
        match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn tag(level: Level) -> &'static str {
        match level {
            Level::Error => "[-]",
            Level::Warn => "[!]",
            Level::Info => "[i]",
            Level::Debug | Level::Trace => "[+]",
        }
    }
}

impl Log for StdLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stderr = stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(handle, "{} {}", Self::tag(record.level()), record.args());
    }

    fn flush(&self) {
        let _ = stderr().flush();
    }
}
