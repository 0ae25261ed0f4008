//! `log` backend writing to the BIOS console.
//!
//! Records are formatted as `[LEVEL] target: message` and end in CR LF.

use core::fmt;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Once;

use crate::console::Console;

struct ConsoleLogger {
    level: LevelFilter,
}

static LOGGER: Once<ConsoleLogger> = Once::new();

/// Install the console logger. Only the first call takes effect; later
/// calls return the `log` crate's error.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| ConsoleLogger { level });
    log::set_logger(logger)?;
    log::set_max_level(logger.level);
    Ok(())
}

/// Format one record the way the console shows it.
pub fn write_record<W: fmt::Write>(out: &mut W, record: &Record<'_>) -> fmt::Result {
    writeln!(
        out,
        "[{:<5}] {}: {}",
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            // Console converts \n to \r\n
            let _ = write_record(&mut Console, record);
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use log::Level;
    use std::string::String;

    #[test]
    fn formats_level_target_and_message() {
        let mut out = String::new();
        write_record(
            &mut out,
            &Record::builder()
                .level(Level::Warn)
                .target("spiflash")
                .args(format_args!("busy after {} polls", 8))
                .build(),
        )
        .unwrap();

        assert_eq!(out, "[WARN ] spiflash: busy after 8 polls\n");
    }

    #[test]
    fn filters_below_threshold() {
        let logger = ConsoleLogger {
            level: LevelFilter::Info,
        };
        let debug = Metadata::builder().level(Level::Debug).build();
        let warn = Metadata::builder().level(Level::Warn).build();
        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&warn));
    }
}
