use std::io::{self, Write};
use std::panic::Location;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use jiff::Timestamp;

use crate::config::{Config, OutputTarget};
use crate::encoding::{DurationFormat, Encoding, Format, NullFields, TimeFormat};
use crate::event::{Event, Pending};
use crate::mutex::Mutex;
use crate::pool::{self, BufferPool};
use crate::record::{self, Caller, Message, Record};
use crate::writer::{RotatingWriter, DEFAULT_MAX_AGE_DAYS, DEFAULT_MAX_SIZE};
use crate::{LogLevel, Result};

/// Where finished records go.
enum Output {
    Stream(Mutex<Box<dyn Write + Send>>),
    File(RotatingWriter),
    Discard,
}

/// Settings applied to the rotating writer, kept so they survive
/// [`Logger::set_file`].
struct FileSettings {
    max_size: u64,
    max_age: u32,
    console: bool,
}

/// A leveled structured logger.
///
/// All configuration is interior, so a logger can be shared freely (it is
/// usually a `static`, see [`crate::global`]) and reconfigured while other
/// threads are logging through it.
pub struct Logger {
    level: AtomicU8,
    caller: AtomicBool,
    separator: RwLock<Arc<str>>,
    format: RwLock<Arc<Format>>,
    output: RwLock<Output>,
    file_settings: Mutex<FileSettings>,
    pool: &'static BufferPool,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Logger {
    fn with_output(output: Output) -> Logger {
        Logger {
            level: AtomicU8::new(LogLevel::Debug as u8),
            caller: AtomicBool::new(false),
            separator: RwLock::new(Arc::from("/")),
            format: RwLock::new(Arc::new(Format::default())),
            output: RwLock::new(output),
            file_settings: Mutex::new(FileSettings {
                max_size: DEFAULT_MAX_SIZE,
                max_age: DEFAULT_MAX_AGE_DAYS,
                console: false,
            }),
            pool: pool::global(),
        }
    }

    /// A logger writing to `out`, one `write_all` per record.
    pub fn new(out: impl Write + Send + 'static) -> Logger {
        Logger::with_output(Output::Stream(Mutex::new(Box::new(out))))
    }

    pub fn stderr() -> Logger {
        Logger::new(io::stderr())
    }

    /// A logger that formats records and throws them away.
    pub fn discard() -> Logger {
        Logger::with_output(Output::Discard)
    }

    /// A logger writing to a [`RotatingWriter`] at `path`.
    pub fn file(path: impl AsRef<Path>) -> Logger {
        let logger = Logger::discard();
        logger.set_file(path);
        logger
    }

    pub fn from_config(config: &Config) -> Logger {
        let logger = Logger::discard();
        logger.apply_config(config);
        logger
    }

    /// Applies every setting in `config`, replacing the output.
    pub fn apply_config(&self, config: &Config) {
        self.set_level(config.level);
        self.set_caller(config.caller);
        self.set_separator(&config.separator);
        self.set_max_size(config.max_size);
        self.set_max_age(config.max_age);
        self.set_console(config.console);
        self.update_format(|format| {
            format.encoding = config.encoding;
            format.time = config.time.clone();
            format.duration = config.duration;
            format.nulls = config.nulls;
        });
        match &config.output {
            OutputTarget::Stderr => self.set_output(io::stderr()),
            OutputTarget::Stdout => self.set_output(io::stdout()),
            OutputTarget::Discard => self.set_discard(),
            OutputTarget::File(path) => self.set_file(path),
        }
    }

    pub(crate) fn pool(&self) -> &'static BufferPool {
        self.pool
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed)).unwrap_or(LogLevel::Debug)
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Parses and applies a level name. An unknown name leaves the current
    /// level in place and is returned as an error.
    pub fn try_set_level_str(&self, level: &str) -> Result<()> {
        self.set_level(level.parse()?);
        Ok(())
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level as u8 >= self.level.load(Ordering::Relaxed)
    }

    /// Report the call site of every record in a `caller` field.
    pub fn set_caller(&self, caller: bool) {
        self.caller.store(caller, Ordering::Relaxed);
    }

    /// Caller paths are cut after the last occurrence of `sep`; an empty
    /// separator keeps the full path.
    pub fn set_separator(&self, sep: &str) {
        *write(&self.separator) = Arc::from(sep);
    }

    /// The formatting settings new events will use.
    pub fn format(&self) -> Arc<Format> {
        read(&self.format).clone()
    }

    fn update_format(&self, update: impl FnOnce(&mut Format)) {
        let zone = {
            let mut format = write(&self.format);
            update(Arc::make_mut(&mut format));
            format.stamp_zone()
        };
        if let Output::File(writer) = &*read(&self.output) {
            writer.set_time_zone(zone);
        }
    }

    pub fn set_encoding(&self, encoding: Encoding) {
        self.update_format(|format| format.encoding = encoding);
    }

    pub fn set_time_format(&self, time: TimeFormat) {
        self.update_format(|format| format.time = time);
    }

    pub fn set_duration_format(&self, duration: DurationFormat) {
        self.update_format(|format| format.duration = duration);
    }

    pub fn set_null_fields(&self, nulls: NullFields) {
        self.update_format(|format| format.nulls = nulls);
    }

    /// Time zone for `datetime` and custom time formats, the system zone by
    /// default.
    pub fn set_time_zone(&self, zone: TimeZone) {
        self.update_format(|format| format.zone = zone);
    }

    /// Sends records to `out`. The previous output is dropped, which closes
    /// a log file.
    pub fn set_output(&self, out: impl Write + Send + 'static) {
        *write(&self.output) = Output::Stream(Mutex::new(Box::new(out)));
    }

    pub fn set_discard(&self) {
        *write(&self.output) = Output::Discard;
    }

    /// Sends records to a rotating log file at `path`, carrying over the
    /// size, age and console settings.
    pub fn set_file(&self, path: impl AsRef<Path>) {
        let writer = RotatingWriter::new(path);
        writer.set_time_zone(self.format().stamp_zone());
        {
            let settings = self.file_settings.lock();
            writer.set_max_size(settings.max_size);
            writer.set_max_age(settings.max_age);
            writer.set_console(settings.console);
        }
        *write(&self.output) = Output::File(writer);
    }

    /// Rotation size for the log file. Zero is ignored.
    pub fn set_max_size(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.file_settings.lock().max_size = bytes;
        if let Output::File(writer) = &*read(&self.output) {
            writer.set_max_size(bytes);
        }
    }

    /// Days rotated files are kept for. Zero is ignored.
    pub fn set_max_age(&self, days: u32) {
        if days == 0 {
            return;
        }
        self.file_settings.lock().max_age = days;
        if let Output::File(writer) = &*read(&self.output) {
            writer.set_max_age(days);
        }
    }

    /// Mirror file output to stderr.
    pub fn set_console(&self, console: bool) {
        self.file_settings.lock().console = console;
        if let Output::File(writer) = &*read(&self.output) {
            writer.set_console(console);
        }
    }

    /// Flushes the output and closes the log file, if any. Logging after
    /// `close` reopens the file.
    pub fn close(&self) -> io::Result<()> {
        match &*read(&self.output) {
            Output::Stream(out) => out.lock().flush(),
            Output::File(writer) => writer.close(),
            Output::Discard => Ok(()),
        }
    }

    /// Starts an event at `level`. Disabled levels return an inert event
    /// without touching the buffer pool.
    pub fn event(&self, level: LogLevel) -> Event<'_> {
        if !self.enabled(level) {
            return Event::disabled();
        }
        Event::new(Pending {
            logger: self,
            level,
            format: self.format(),
            fields: self.pool.acquire(),
            trace: None,
            caller: self.caller.load(Ordering::Relaxed),
        })
    }

    pub fn debug(&self) -> Event<'_> {
        self.event(LogLevel::Debug)
    }

    pub fn info(&self) -> Event<'_> {
        self.event(LogLevel::Info)
    }

    pub fn warn(&self) -> Event<'_> {
        self.event(LogLevel::Warn)
    }

    pub fn error(&self) -> Event<'_> {
        self.event(LogLevel::Error)
    }

    /// Logs `msg` at `level` without fields.
    #[track_caller]
    pub fn log(&self, level: LogLevel, msg: &str) {
        self.event(level).msg(msg)
    }

    pub(crate) fn emit(
        &self,
        pending: Pending<'_>,
        message: Message<'_>,
        location: &'static Location<'static>,
    ) {
        let separator = if pending.caller {
            Some(read(&self.separator).clone())
        } else {
            None
        };
        let time = Timestamp::now();
        let record = Record {
            time,
            level: pending.level,
            trace: pending.trace.as_deref().map(Vec::as_slice).unwrap_or_default(),
            caller: separator.as_deref().map(|sep| Caller::new(location, sep)),
            fields: &pending.fields,
            message,
        };
        let mut line = self.pool.acquire();
        record::assemble(&mut line, &pending.format, &record);
        self.write_output(&line, Some(pending.format.stamp_datetime(time)));
    }

    /// Hands an already assembled record to the output. Failures are
    /// reported on stderr; logging carries on.
    pub fn write_record(&self, line: &[u8]) {
        self.write_output(line, None);
    }

    fn write_output(&self, line: &[u8], stamp: Option<DateTime>) {
        let result = match &*read(&self.output) {
            Output::Stream(out) => out.lock().write_all(line),
            Output::File(writer) => match stamp {
                Some(stamp) => writer.write_at(line, stamp).map(drop),
                None => writer.write(line).map(drop),
            },
            Output::Discard => Ok(()),
        };
        if let Err(err) = result {
            eprintln!("logline: failed to write record: {}", err);
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let output = match &*read(&self.output) {
            Output::Stream(_) => "stream".to_string(),
            Output::File(writer) => writer.path().display().to_string(),
            Output::Discard => "discard".to_string(),
        };
        f.debug_struct("Logger")
            .field("level", &self.level())
            .field("caller", &self.caller.load(Ordering::Relaxed))
            .field("output", &output)
            .field("format", &self.format())
            .finish()
    }
}
