use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use serde::Serialize;

use crate::encoding::{BStr, Encode, Encoder, Format, Hex, NullFields, ValueEncoder};
use crate::pool::PooledBuffer;
use crate::record::{Message, ERROR_FIELD};
use crate::{LogLevel, Logger};

/// A record under construction.
///
/// Obtained from [`Logger::debug`] and friends. When the level is disabled
/// the event holds nothing and every method is a no-op, so building fields
/// for a filtered record costs almost nothing. Nothing is written until
/// [`msg`](Event::msg), [`msgf`](Event::msgf) or [`send`](Event::send).
#[must_use = "an event is only written by `msg`, `msgf` or `send`"]
pub struct Event<'a> {
    inner: Option<Pending<'a>>,
}

pub(crate) struct Pending<'a> {
    pub(crate) logger: &'a Logger,
    pub(crate) level: LogLevel,
    pub(crate) format: Arc<Format>,
    pub(crate) fields: PooledBuffer<'static>,
    pub(crate) trace: Option<PooledBuffer<'static>>,
    pub(crate) caller: bool,
}

impl<'a> Event<'a> {
    pub(crate) fn disabled() -> Event<'a> {
        Event { inner: None }
    }

    pub(crate) fn new(pending: Pending<'a>) -> Event<'a> {
        Event {
            inner: Some(pending),
        }
    }

    /// Whether this event will produce a record.
    pub fn enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn level(&self) -> Option<LogLevel> {
        self.inner.as_ref().map(|pending| pending.level)
    }

    /// Adds any encodable value under `key`.
    pub fn field<T: Encode>(mut self, key: &str, value: T) -> Self {
        if let Some(pending) = &mut self.inner {
            if pending.format.nulls == NullFields::Omit && value.is_nil() {
                return self;
            }
            pending.format.encoding.put_key(&mut pending.fields, key);
            value.encode_log_value_into(ValueEncoder::new(&mut pending.fields, &pending.format));
        }
        self
    }

    pub fn str(self, key: &str, value: &str) -> Self {
        self.field(key, value)
    }

    pub fn strs(self, key: &str, values: &[&str]) -> Self {
        self.field(key, values)
    }

    /// Bytes rendered as a string; invalid UTF-8 is replaced.
    pub fn bytes(self, key: &str, value: &[u8]) -> Self {
        self.field(key, BStr(value))
    }

    /// Bytes rendered as lowercase hex.
    pub fn hex(self, key: &str, value: &[u8]) -> Self {
        self.field(key, Hex(value))
    }

    pub fn bool(self, key: &str, value: bool) -> Self {
        self.field(key, value)
    }

    pub fn int(self, key: &str, value: i64) -> Self {
        self.field(key, value)
    }

    pub fn uint(self, key: &str, value: u64) -> Self {
        self.field(key, value)
    }

    pub fn float(self, key: &str, value: f64) -> Self {
        self.field(key, value)
    }

    pub fn time(self, key: &str, value: Timestamp) -> Self {
        self.field(key, value)
    }

    pub fn dur(self, key: &str, value: Duration) -> Self {
        self.field(key, value)
    }

    /// Adds the `error` field: the error's message, or null for `None`.
    pub fn err(mut self, err: Option<&dyn StdError>) -> Self {
        if let Some(pending) = &mut self.inner {
            let enc = pending.format.encoding;
            match err {
                Some(err) => {
                    enc.put_key(&mut pending.fields, ERROR_FIELD);
                    enc.put_display(&mut pending.fields, &err);
                }
                None if pending.format.nulls == NullFields::Omit => {}
                None => {
                    enc.put_key(&mut pending.fields, ERROR_FIELD);
                    enc.put_nil(&mut pending.fields);
                }
            }
        }
        self
    }

    /// Adds `value` through its [`Display`] implementation, or null for `None`.
    pub fn stringer(mut self, key: &str, value: Option<&dyn Display>) -> Self {
        if let Some(pending) = &mut self.inner {
            let enc = pending.format.encoding;
            match value {
                Some(value) => {
                    enc.put_key(&mut pending.fields, key);
                    enc.put_display(&mut pending.fields, value);
                }
                None if pending.format.nulls == NullFields::Omit => {}
                None => {
                    enc.put_key(&mut pending.fields, key);
                    enc.put_nil(&mut pending.fields);
                }
            }
        }
        self
    }

    /// Adds an arbitrary serializable value. Serialization errors are
    /// recorded in place of the value.
    pub fn any<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        if let Some(pending) = &mut self.inner {
            let enc = pending.format.encoding;
            enc.put_key(&mut pending.fields, key);
            enc.put_any(&mut pending.fields, value);
        }
        self
    }

    /// Adds an already encoded value verbatim. The caller is responsible for
    /// it being valid in the logger's encoding.
    pub fn raw(mut self, key: &str, encoded: &[u8]) -> Self {
        if let Some(pending) = &mut self.inner {
            let enc = pending.format.encoding;
            enc.put_key(&mut pending.fields, key);
            enc.put_raw(&mut pending.fields, encoded);
        }
        self
    }

    /// Sets the trace identifier, written right after the level.
    pub fn trace(mut self, id: &str) -> Self {
        if let Some(pending) = &mut self.inner {
            let logger = pending.logger;
            let trace = pending.trace.get_or_insert_with(|| logger.pool().acquire());
            trace.clear();
            if !id.is_empty() {
                pending.format.encoding.put_str(trace, id);
            }
        }
        self
    }

    /// Turns caller reporting off for this event. Caller reporting can only
    /// be enabled on the logger.
    pub fn caller(mut self, enabled: bool) -> Self {
        if let Some(pending) = &mut self.inner {
            pending.caller &= enabled;
        }
        self
    }

    /// Writes the record with `msg` as its message.
    #[track_caller]
    pub fn msg(self, msg: &str) {
        self.finish(Message::Str(msg), Location::caller())
    }

    /// Writes the record with a formatted message, see [`format_args!`].
    #[track_caller]
    pub fn msgf(self, args: fmt::Arguments<'_>) {
        self.finish(Message::Args(args), Location::caller())
    }

    /// Writes the record without a message.
    #[track_caller]
    pub fn send(self) {
        self.finish(Message::None, Location::caller())
    }

    fn finish(self, message: Message<'_>, location: &'static Location<'static>) {
        if let Some(pending) = self.inner {
            let logger = pending.logger;
            logger.emit(pending, message, location);
        }
    }
}

impl fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(pending) => f
                .debug_struct("Event")
                .field("level", &pending.level)
                .field("fields", &pending.fields)
                .finish_non_exhaustive(),
            None => f.write_str("Event(disabled)"),
        }
    }
}
