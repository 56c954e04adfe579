//! `log` backend that writes to the UART console.
//!
//! Lines look like `[WARN  rpmsg_remote::rpmsg::endpoint] message`. The
//! default level is `Info`; the `verbose` feature lets `trace!` payload dumps
//! through as well.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record};

use crate::uart;

#[cfg(feature = "verbose")]
pub const MAX_LEVEL: LevelFilter = LevelFilter::Trace;
#[cfg(not(feature = "verbose"))]
pub const MAX_LEVEL: LevelFilter = LevelFilter::Info;

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= MAX_LEVEL
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = writeln!(
            uart::writer(),
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Install the console logger. Safe to call more than once.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(MAX_LEVEL);
    }
}
