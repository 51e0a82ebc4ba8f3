//! Low allocation structured logging.
//!
//! Log calls go through a level gated [`Event`] builder that encodes every
//! field straight into a pooled buffer, then the finished record is handed to
//! the configured output, usually a [`RotatingWriter`]:
//!
//! ```
//! use logline::{Logger, LogLevel};
//!
//! let logger = Logger::discard();
//! logger.set_level(LogLevel::Info);
//! logger
//!     .info()
//!     .str("user", "ada")
//!     .int("attempt", 3)
//!     .msg("logged in");
//! logline::warn!(logger, "disk {}% full", 93);
//! ```
//!
//! Records are single line JSON objects by default,
//! `{"time":"2024-01-02 10:11:12.123","level":"info","user":"ada","attempt":3,"msg":"logged in"}`,
//! or the relaxed text form of [`encoding::text`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

pub mod config;
pub mod encoding;
mod error;
mod event;
mod logger;
mod mutex;
pub mod pool;
pub mod record;
pub mod retention;
pub mod timestamp;
pub mod writer;

pub use config::{Config, OutputTarget};
pub use encoding::{
    BStr, Displayed, DurationFormat, Encode, Encoding, Format, Hex, NullFields, Serialized,
    TimeFormat, Value, ValueEncoder,
};
pub use error::{Error, Result};
pub use event::Event;
pub use logger::Logger;
pub use writer::RotatingWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn from_u8(byte: u8) -> Option<LogLevel> {
        match byte {
            0 => Some(LogLevel::Debug),
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        match input.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(Error::InvalidLevel(input.to_string())),
        }
    }
}

static GLOBAL: LazyLock<Logger> = LazyLock::new(Logger::stderr);

/// The process wide logger. It starts out writing JSON to stderr at the
/// `debug` level; reconfigure it through its setters, for example with
/// `global().apply_config(&Config::from_env(false))`.
///
/// Call [`Logger::close`] before exiting when it writes to a file.
pub fn global() -> &'static Logger {
    &GLOBAL
}

/// Emits a `debug` record with a formatted message.
///
/// ```
/// let logger = logline::Logger::discard();
/// logline::debug!(logger, "cache size {}", 12);
/// logline::debug!(logline::global(), "plain message");
/// ```
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.debug().msgf(::std::format_args!($($arg)+))
    };
}

/// Emits an `info` record with a formatted message.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.info().msgf(::std::format_args!($($arg)+))
    };
}

/// Emits a `warn` record with a formatted message.
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.warn().msgf(::std::format_args!($($arg)+))
    };
}

/// Emits an `error` record with a formatted message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.error().msgf(::std::format_args!($($arg)+))
    };
}
