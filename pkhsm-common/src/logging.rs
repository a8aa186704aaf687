//! Logging utilities.

use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Logging setup error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Logger initialization error.
    #[error("Logger initialization error: {0}")]
    Logger(#[from] log::SetLoggerError),
}

/// Sets up a terminal logger writing to stderr.
///
/// Standard output is reserved for command output (e.g. a rendered dependency graph), which is
/// why all log messages go to stderr.
///
/// # Errors
///
/// An error is returned if a logger has already been set.
pub fn setup_logging(max_level: impl Into<LevelFilter>) -> Result<(), Error> {
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Debug)
        .set_thread_level(LevelFilter::Off)
        .build();
    TermLogger::init(
        max_level.into(),
        config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;
    Ok(())
}
