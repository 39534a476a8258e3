//! Console logging
//!
//! All diagnostics go through the [`log`] facade to the firmware text
//! console. The loader starts chatty (Info) so early failures are
//! visible, then clamps to the level the flag files ask for once they
//! have been probed.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record};

use crate::get_boot_table;

/// Logger writing to the UEFI `stdout`. Does nothing when the system
/// table is not yet (or no longer) available.
pub struct UefiLogger {
    _priv: (),
}

impl UefiLogger {
    pub const fn new() -> Self {
        Self { _priv: () }
    }
}

static LOGGER: UefiLogger = UefiLogger::new();

/// Install the logger. Verbose by default; [`apply_verbosity`] tightens
/// it once the flag files have been read. Calling this twice has no
/// effect.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// Map the runtime flags onto a log level: quiet by default, Info with
/// the verbose flag, Debug with the nvram-debug flag.
pub fn apply_verbosity(verbose: bool, debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    log::set_max_level(level);
}

impl Log for UefiLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Some(table) = get_boot_table() {
            let mut stdout = table.stdout();
            let _ = writeln!(
                stdout,
                "[{}] {} - {}",
                record.target(),
                record.level(),
                record.args()
            );
        }
    }

    #[inline]
    fn flush(&self) {}
}
