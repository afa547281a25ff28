//! Terminal (and optional file) logger for the controller binaries

use std::path::Path;
use std::time::Instant;

use colored::{ColoredString, Colorize};
use log::info;
use thiserror::Error;

pub use log::LevelFilter;

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

/// Initialise the global logger.
///
/// Lines are stamped with the seconds elapsed since this call. Debug and
/// trace lines also carry their target module. When `log_file` is given the
/// same lines are appended to it.
///
/// Only the first call in a process can succeed.
pub fn init(min_level: LevelFilter, log_file: Option<&Path>) -> Result<(), LoggerInitError> {
    let epoch = Instant::now();

    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            let elapsed = epoch.elapsed().as_secs_f64();
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    elapsed,
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    elapsed,
                    level_to_str(record.level()),
                    message
                ))
            }
        })
        .level(min_level)
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path).map_err(LoggerInitError::LogFileInitError)?);
    }

    dispatch.apply().map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Log level: {:?}", min_level);
    if let Some(path) = log_file {
        info!("    Log file path: {:?}", path);
    }

    Ok(())
}

/// Get the string representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info => "INF".normal(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_tags() {
        colored::control::set_override(false);
        assert_eq!(level_to_str(log::Level::Info).to_string(), "INF");
        assert_eq!(level_to_str(log::Level::Warn).to_string(), "WRN");
        assert_eq!(level_to_str(log::Level::Error).to_string(), "ERR");
        assert_eq!(level_to_str(log::Level::Debug).to_string(), "DBG");
    }

    #[test]
    fn test_bad_log_file_path() {
        let result = init(
            LevelFilter::Info,
            Some(Path::new("/nonexistent-dir-for-logger-test/run.log")),
        );
        assert!(matches!(result, Err(LoggerInitError::LogFileInitError(_))));
    }
}
