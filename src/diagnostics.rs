//! Process-wide logger bootstrap (feature `diagnostics`).
//!
//! Dual terminal + file logging, mirroring the teacher's
//! `rbp-core::log()` bootstrap: colored terminal output at the configured
//! level, plus a full-detail file under `logs/`.

use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::fs::{self, File};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the global logger. Safe to call more than once — only the
/// first call takes effect.
pub fn init(level: LevelFilter) {
    INIT.call_once(|| {
        let _ = fs::create_dir_all("logs");
        let file = File::create("logs/cadence-engine.log").ok();
        let mut loggers: Vec<Box<dyn simplelog::SharedLogger>> =
            vec![TermLogger::new(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)];
        if let Some(file) = file {
            loggers.push(WriteLogger::new(LevelFilter::Trace, Config::default(), file));
        }
        let _ = CombinedLogger::init(loggers);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_when_called_twice() {
        init(LevelFilter::Off);
        init(LevelFilter::Off);
    }
}
