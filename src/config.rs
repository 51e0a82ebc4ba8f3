//! Logger configuration.
//!
//! A [`Config`] can be built in code, or parsed from a `key=value` list
//! separated by `;` or newlines:
//!
//! ```
//! use logline::{Config, LogLevel, OutputTarget};
//!
//! let config: Config = "output=file:logs/app.log; level=warn; caller=on; max_size=1048576"
//!     .parse()
//!     .unwrap();
//! assert_eq!(config.level, LogLevel::Warn);
//! assert_eq!(config.output, OutputTarget::File("logs/app.log".into()));
//! ```
//!
//! | key        | values                                              |
//! |------------|-----------------------------------------------------|
//! | `output`   | `stderr`, `stdout`, `discard`, `file:<path>`        |
//! | `level`    | `debug`, `info`, `warn`, `error`                    |
//! | `caller`   | `on`/`off` (also `true`/`false`, `1`/`0`)           |
//! | `sep`      | caller path separator, empty keeps the full path    |
//! | `max_size` | bytes before the log file rotates                   |
//! | `max_age`  | days rotated files are kept                         |
//! | `console`  | mirror file output to stderr                        |
//! | `encoding` | `json`, `text`                                      |
//! | `time`     | `datetime`, `rfc3339`, `unix`, `unixms`, `unixmicro`, `unixnano` or a strftime pattern |
//! | `duration` | `human`, `float:<unit>`, `int:<unit>`               |
//! | `nulls`    | `emit`, `omit`                                      |
//! | `skip`     | stack depth to skip; checked, then ignored          |
//!
//! Lines starting with `#` are ignored. Call sites are found with
//! `#[track_caller]`, so wrappers need no `skip` count; the key is only
//! accepted for older configuration strings.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::encoding::{DurationFormat, Encoding, NullFields, TimeFormat};
use crate::writer::{DEFAULT_MAX_AGE_DAYS, DEFAULT_MAX_SIZE};
use crate::{Error, LogLevel, Result};

/// Environment variable read by [`Config::from_env`].
pub const CONFIG_ENV_VAR: &str = "LOGLINE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    #[default]
    Stderr,
    Stdout,
    Discard,
    /// A rotating log file.
    File(PathBuf),
}

impl FromStr for OutputTarget {
    type Err = &'static str;

    fn from_str(input: &str) -> std::result::Result<Self, Self::Err> {
        match input.split_once(':') {
            Some(("file", path)) if !path.is_empty() => Ok(OutputTarget::File(path.into())),
            Some(("file", _)) => Err("file path is required and must not be empty"),
            _ => match input {
                "stderr" => Ok(OutputTarget::Stderr),
                "stdout" => Ok(OutputTarget::Stdout),
                "discard" => Ok(OutputTarget::Discard),
                "file" => Err("file path is required and must not be empty"),
                _ => Err("expected stderr, stdout, discard or file:<path>"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub output: OutputTarget,
    pub level: LogLevel,
    pub caller: bool,
    pub separator: String,
    pub max_size: u64,
    pub max_age: u32,
    pub console: bool,
    pub encoding: Encoding,
    pub time: TimeFormat,
    pub duration: DurationFormat,
    pub nulls: NullFields,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output: OutputTarget::Stderr,
            level: LogLevel::Debug,
            caller: false,
            separator: "/".to_string(),
            max_size: DEFAULT_MAX_SIZE,
            max_age: DEFAULT_MAX_AGE_DAYS,
            console: false,
            encoding: Encoding::Json,
            time: TimeFormat::Datetime,
            duration: DurationFormat::default(),
            nulls: NullFields::Emit,
        }
    }
}

impl Config {
    pub fn with_output(self, output: OutputTarget) -> Self {
        Config { output, ..self }
    }
    pub fn with_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_output(OutputTarget::File(path.into()))
    }
    pub fn with_level(self, level: LogLevel) -> Self {
        Config { level, ..self }
    }
    pub fn with_caller(self, caller: bool) -> Self {
        Config { caller, ..self }
    }
    pub fn with_separator(self, separator: &str) -> Self {
        Config {
            separator: separator.to_string(),
            ..self
        }
    }
    pub fn with_max_size(self, max_size: u64) -> Self {
        Config { max_size, ..self }
    }
    pub fn with_max_age(self, max_age: u32) -> Self {
        Config { max_age, ..self }
    }
    pub fn with_console(self, console: bool) -> Self {
        Config { console, ..self }
    }
    pub fn with_encoding(self, encoding: Encoding) -> Self {
        Config { encoding, ..self }
    }
    pub fn with_time(self, time: TimeFormat) -> Self {
        Config { time, ..self }
    }
    pub fn with_duration(self, duration: DurationFormat) -> Self {
        Config { duration, ..self }
    }
    pub fn with_nulls(self, nulls: NullFields) -> Self {
        Config { nulls, ..self }
    }

    /// Reads the configuration from the `LOGLINE_CONFIG` environment
    /// variable, using [`Config::default()`] when it is unset or invalid.
    /// Unless `quiet` is set, the choice is reported on stderr.
    pub fn from_env(quiet: bool) -> Config {
        let (config, source) = match std::env::var(CONFIG_ENV_VAR) {
            Ok(value) => match value.parse::<Config>() {
                Ok(config) => (config, "configuration from LOGLINE_CONFIG"),
                Err(err) => {
                    if !quiet {
                        eprintln!(
                            "logline: error parsing LOGLINE_CONFIG\n value: `{}`\n error: {}",
                            value, err
                        );
                    }
                    (Config::default(), "default configuration after an error parsing")
                }
            },
            Err(_) => (Config::default(), "default configuration (LOGLINE_CONFIG not set)"),
        };
        if !quiet {
            eprintln!("logline: using the {}: {:?}", source, config);
        }
        config
    }

    /// Reads a configuration file in the same `key=value` format.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |reason: &str| Error::Config(format!("{}: {} (got `{}`)", key, reason, value));
        match key {
            "output" => self.output = value.parse().map_err(invalid)?,
            "level" => self.level = value.parse()?,
            "caller" => self.caller = parse_switch(value).ok_or_else(|| invalid("expected on or off"))?,
            "sep" | "separator" => self.separator = value.to_string(),
            "max_size" => {
                self.max_size = value
                    .parse()
                    .map_err(|_| invalid("expected a number of bytes"))?
            }
            "max_age" => {
                self.max_age = value
                    .parse()
                    .map_err(|_| invalid("expected a number of days"))?
            }
            "console" => {
                self.console = parse_switch(value).ok_or_else(|| invalid("expected on or off"))?
            }
            "encoding" => self.encoding = value.parse().map_err(invalid)?,
            "time" => self.time = value.parse().map_err(invalid)?,
            "duration" => self.duration = value.parse().map_err(invalid)?,
            "nulls" => self.nulls = value.parse().map_err(invalid)?,
            "skip" => {
                value
                    .parse::<u32>()
                    .map_err(|_| invalid("expected a stack depth"))?;
            }
            _ => return Err(Error::Config(format!("unknown key `{}`", key))),
        }
        Ok(())
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let mut config = Config::default();
        for entry in input.split(|c| c == ';' || c == '\n') {
            let entry = entry.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            let Some((key, value)) = entry.split_once('=') else {
                return Err(Error::Config(format!("expected key=value, got `{}`", entry)));
            };
            config.set(key.trim(), value.trim())?;
        }
        Ok(config)
    }
}
