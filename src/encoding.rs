//! Append-only value encoders.
//!
//! Everything here writes straight into a caller owned `Vec<u8>`: no
//! intermediate strings, no reflection. The [`Encoder`] trait is the shared
//! contract; [`json::JsonEncoder`] and [`text::TextEncoder`] only differ in how
//! keys, strings and nulls are spelled, everything else is a default method.
//!
//! Values reach the encoder through the [`Encode`] capability trait, which is
//! implemented for primitives, strings, time types and containers. Anything
//! else goes through the one fallback, [`ValueEncoder::any`].

use std::borrow::Cow;
use std::fmt::Display;
use std::io::Write;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use jiff::fmt::strtime::BrokenDownTime;
use jiff::tz::TimeZone;
use jiff::Timestamp;
use serde::Serialize;
use uuid::Uuid;

use crate::timestamp;

mod escape;
pub mod json;
pub mod text;

pub use json::JsonEncoder;
pub use text::TextEncoder;

/// The operations both record encodings provide.
///
/// Only the spelling of keys, strings, nulls and opaque tokens is encoding
/// specific; numbers, markers, times and durations are shared.
pub trait Encoder {
    /// Appends a field separator (when needed), the key and `:`.
    fn put_key(&self, dst: &mut Vec<u8>, key: &str);
    fn put_str(&self, dst: &mut Vec<u8>, val: &str);
    /// Bytes are rendered as a string, invalid UTF-8 bytes escaped as `\ufffd`.
    fn put_bytes(&self, dst: &mut Vec<u8>, val: &[u8]);
    fn put_nil(&self, dst: &mut Vec<u8>);
    /// Renders `val` through [`Display`] as a string value.
    fn put_display(&self, dst: &mut Vec<u8>, val: &dyn Display);
    /// Appends a value produced by `write` which never needs escaping
    /// (digits, hex, durations). JSON quotes it, text leaves it bare
    /// unless it could be mistaken for another type.
    fn put_token<F: FnOnce(&mut Vec<u8>)>(&self, dst: &mut Vec<u8>, write: F);

    fn put_begin_marker(&self, dst: &mut Vec<u8>) {
        dst.push(b'{');
    }
    fn put_end_marker(&self, dst: &mut Vec<u8>) {
        dst.push(b'}');
    }
    fn put_line_break(&self, dst: &mut Vec<u8>) {
        dst.push(b'\n');
    }
    fn put_array_start(&self, dst: &mut Vec<u8>) {
        dst.push(b'[');
    }
    fn put_array_end(&self, dst: &mut Vec<u8>) {
        dst.push(b']');
    }
    fn put_array_delim(&self, dst: &mut Vec<u8>) {
        dst.push(b',');
    }

    fn put_bool(&self, dst: &mut Vec<u8>, val: bool) {
        dst.extend_from_slice(if val { b"true" } else { b"false" });
    }
    fn put_i64(&self, dst: &mut Vec<u8>, val: i64) {
        dst.extend_from_slice(itoa::Buffer::new().format(val).as_bytes());
    }
    fn put_u64(&self, dst: &mut Vec<u8>, val: u64) {
        dst.extend_from_slice(itoa::Buffer::new().format(val).as_bytes());
    }
    fn put_i128(&self, dst: &mut Vec<u8>, val: i128) {
        dst.extend_from_slice(itoa::Buffer::new().format(val).as_bytes());
    }
    fn put_u128(&self, dst: &mut Vec<u8>, val: u128) {
        dst.extend_from_slice(itoa::Buffer::new().format(val).as_bytes());
    }
    fn put_f32(&self, dst: &mut Vec<u8>, val: f32) {
        if !put_float_sentinel(dst, val.is_nan(), val.is_infinite(), val > 0.0) {
            let _ = write!(dst, "{}", val);
        }
    }
    fn put_f64(&self, dst: &mut Vec<u8>, val: f64) {
        if !put_float_sentinel(dst, val.is_nan(), val.is_infinite(), val > 0.0) {
            let _ = write!(dst, "{}", val);
        }
    }
    fn put_hex(&self, dst: &mut Vec<u8>, val: &[u8]) {
        self.put_token(dst, |dst| escape::append_hex(dst, val));
    }
    fn put_uuid(&self, dst: &mut Vec<u8>, val: &Uuid) {
        let mut buf = Uuid::encode_buffer();
        let text = val.hyphenated().encode_lower(&mut buf);
        self.put_token(dst, |dst| dst.extend_from_slice(text.as_bytes()));
    }

    fn put_time(&self, dst: &mut Vec<u8>, val: Timestamp, format: &TimeFormat, zone: &TimeZone) {
        match format {
            TimeFormat::Datetime => self.put_token(dst, |dst| {
                timestamp::append_datetime(dst, timestamp::local_millis(val, zone), b' ')
            }),
            TimeFormat::Rfc3339 => self.put_token(dst, |dst| timestamp::append_iso_utc(dst, val)),
            TimeFormat::Unix => self.put_i64(dst, val.as_second()),
            TimeFormat::UnixMs => self.put_i64(dst, val.as_millisecond()),
            TimeFormat::UnixMicro => self.put_i64(dst, val.as_microsecond()),
            TimeFormat::UnixNano => self.put_i128(dst, val.as_nanosecond()),
            TimeFormat::Custom(pattern) => {
                let zoned = val.to_zoned(zone.clone());
                match BrokenDownTime::from(&zoned).to_string(pattern.as_str()) {
                    Ok(text) => self.put_str(dst, &text),
                    Err(err) => self.put_display(dst, &format_args!("time format error: {}", err)),
                }
            }
        }
    }

    fn put_duration(&self, dst: &mut Vec<u8>, val: Duration, format: DurationFormat) {
        match format {
            DurationFormat::Human => self.put_token(dst, |dst| {
                let _ = write!(dst, "{:?}", val);
            }),
            DurationFormat::Float(unit) => {
                let unit = unit.as_nanos().max(1) as f64;
                self.put_f64(dst, val.as_nanos() as f64 / unit)
            }
            DurationFormat::Integer(unit) => {
                let scaled = val.as_nanos() / unit.as_nanos().max(1);
                self.put_u64(dst, u64::try_from(scaled).unwrap_or(u64::MAX))
            }
        }
    }

    /// Generic structured fallback. Serialization failures are written as a
    /// string describing the error, never propagated.
    fn put_any<T: Serialize + ?Sized>(&self, dst: &mut Vec<u8>, val: &T) {
        let start = dst.len();
        if let Err(err) = serde_json::to_writer(&mut *dst, val) {
            dst.truncate(start);
            self.put_display(dst, &format_args!("marshaling error: {}", err));
        }
    }

    /// Appends already encoded data verbatim.
    fn put_raw(&self, dst: &mut Vec<u8>, raw: &[u8]) {
        dst.extend_from_slice(raw);
    }

    /// Merges an encoded object (`{..}` or a bare field list) into the open
    /// object in `dst`, dropping its opening marker.
    fn put_object_data(&self, dst: &mut Vec<u8>, object: &[u8]) {
        let object = match object.first() {
            Some(b'{') => &object[1..],
            Some(_) => object,
            None => return,
        };
        if dst.len() > 1 && !object.is_empty() && object[0] != b'}' {
            dst.push(b',');
        }
        dst.extend_from_slice(object);
    }
}

fn put_float_sentinel(dst: &mut Vec<u8>, nan: bool, inf: bool, positive: bool) -> bool {
    // JSON has no NaN or Infinity.
    let sentinel: &[u8] = match (nan, inf, positive) {
        (true, _, _) => b"\"NaN\"",
        (false, true, true) => b"\"+Inf\"",
        (false, true, false) => b"\"-Inf\"",
        _ => return false,
    };
    dst.extend_from_slice(sentinel);
    true
}

/// The active record dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Json,
    Text,
}

impl Encoder for Encoding {
    #[inline]
    fn put_key(&self, dst: &mut Vec<u8>, key: &str) {
        match self {
            Encoding::Json => JsonEncoder.put_key(dst, key),
            Encoding::Text => TextEncoder.put_key(dst, key),
        }
    }
    #[inline]
    fn put_str(&self, dst: &mut Vec<u8>, val: &str) {
        match self {
            Encoding::Json => JsonEncoder.put_str(dst, val),
            Encoding::Text => TextEncoder.put_str(dst, val),
        }
    }
    fn put_bytes(&self, dst: &mut Vec<u8>, val: &[u8]) {
        match self {
            Encoding::Json => JsonEncoder.put_bytes(dst, val),
            Encoding::Text => TextEncoder.put_bytes(dst, val),
        }
    }
    fn put_nil(&self, dst: &mut Vec<u8>) {
        match self {
            Encoding::Json => JsonEncoder.put_nil(dst),
            Encoding::Text => TextEncoder.put_nil(dst),
        }
    }
    fn put_display(&self, dst: &mut Vec<u8>, val: &dyn Display) {
        match self {
            Encoding::Json => JsonEncoder.put_display(dst, val),
            Encoding::Text => TextEncoder.put_display(dst, val),
        }
    }
    fn put_token<F: FnOnce(&mut Vec<u8>)>(&self, dst: &mut Vec<u8>, write: F) {
        match self {
            Encoding::Json => JsonEncoder.put_token(dst, write),
            Encoding::Text => TextEncoder.put_token(dst, write),
        }
    }
}

impl FromStr for Encoding {
    type Err = &'static str;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "json" | "JSON" => Ok(Encoding::Json),
            "text" | "TEXT" => Ok(Encoding::Text),
            _ => Err("expected `json` or `text`"),
        }
    }
}

/// How time values (including the record `time` field) are rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// `2024-01-02 10:11:12.123` in the configured time zone.
    #[default]
    Datetime,
    /// `2024-01-02T10:11:12.123Z`, always UTC.
    Rfc3339,
    /// Seconds since the Unix epoch as a bare integer.
    Unix,
    UnixMs,
    UnixMicro,
    UnixNano,
    /// A `strftime` pattern, rendered in the configured time zone.
    Custom(String),
}

impl FromStr for TimeFormat {
    type Err = &'static str;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "datetime" => Ok(TimeFormat::Datetime),
            "rfc3339" => Ok(TimeFormat::Rfc3339),
            "unix" => Ok(TimeFormat::Unix),
            "unixms" => Ok(TimeFormat::UnixMs),
            "unixmicro" => Ok(TimeFormat::UnixMicro),
            "unixnano" => Ok(TimeFormat::UnixNano),
            pattern if pattern.contains('%') => Ok(TimeFormat::Custom(pattern.to_string())),
            _ => Err("expected datetime, rfc3339, unix, unixms, unixmicro, unixnano or a strftime pattern"),
        }
    }
}

/// How [`Duration`] values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationFormat {
    /// The Rust debug form, e.g. `1.5s` or `250µs`.
    Human,
    /// Fractional count of the given unit.
    Float(Duration),
    /// Whole count of the given unit, truncated.
    Integer(Duration),
}

impl Default for DurationFormat {
    fn default() -> Self {
        DurationFormat::Float(Duration::from_millis(1))
    }
}

impl FromStr for DurationFormat {
    type Err = &'static str;

    /// `human`, `float:<unit>` or `int:<unit>` with unit one of
    /// `ns`, `us`, `ms`, `s`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input == "human" {
            return Ok(DurationFormat::Human);
        }
        let (kind, unit) = input.split_once(':').unwrap_or((input, "ms"));
        let unit = match unit {
            "ns" => Duration::from_nanos(1),
            "us" | "µs" => Duration::from_micros(1),
            "ms" => Duration::from_millis(1),
            "s" => Duration::from_secs(1),
            _ => return Err("duration unit must be one of ns, us, ms, s"),
        };
        match kind {
            "float" => Ok(DurationFormat::Float(unit)),
            "int" | "integer" => Ok(DurationFormat::Integer(unit)),
            _ => Err("expected human, float:<unit> or int:<unit>"),
        }
    }
}

/// What to do with a field whose value is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullFields {
    /// Write the encoding's null token: `null` for JSON, `nil` for text.
    #[default]
    Emit,
    /// Leave the field out of the record.
    Omit,
}

impl FromStr for NullFields {
    type Err = &'static str;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "emit" => Ok(NullFields::Emit),
            "omit" => Ok(NullFields::Omit),
            _ => Err("expected `emit` or `omit`"),
        }
    }
}

/// Everything needed to render values: the dialect plus value formats.
#[derive(Debug, Clone)]
pub struct Format {
    pub encoding: Encoding,
    pub time: TimeFormat,
    pub duration: DurationFormat,
    pub nulls: NullFields,
    pub zone: TimeZone,
}

impl Default for Format {
    fn default() -> Self {
        Format {
            encoding: Encoding::Json,
            time: TimeFormat::Datetime,
            duration: DurationFormat::default(),
            nulls: NullFields::Emit,
            zone: TimeZone::system(),
        }
    }
}

impl Format {
    /// The zone record stamps are rendered in: UTC for RFC3339, otherwise
    /// [`Format::zone`].
    pub fn stamp_zone(&self) -> TimeZone {
        match self.time {
            TimeFormat::Rfc3339 => TimeZone::UTC,
            _ => self.zone.clone(),
        }
    }

    /// The civil time of `ts` as a record stamp shows it.
    pub fn stamp_datetime(&self, ts: Timestamp) -> jiff::civil::DateTime {
        match self.time {
            TimeFormat::Rfc3339 => TimeZone::UTC.to_datetime(ts),
            _ => self.zone.to_datetime(ts),
        }
    }
}

/// Destination for exactly one value.
pub struct ValueEncoder<'a> {
    pub(crate) buffer: &'a mut Vec<u8>,
    pub(crate) format: &'a Format,
}

impl<'a> ValueEncoder<'a> {
    pub fn new(buffer: &'a mut Vec<u8>, format: &'a Format) -> ValueEncoder<'a> {
        ValueEncoder { buffer, format }
    }
    fn reborrow(&mut self) -> ValueEncoder<'_> {
        ValueEncoder {
            buffer: &mut *self.buffer,
            format: self.format,
        }
    }
    pub fn format(&self) -> &Format {
        self.format
    }
    pub fn str(self, value: &str) {
        self.format.encoding.put_str(self.buffer, value)
    }
    pub fn bytes(self, value: &[u8]) {
        self.format.encoding.put_bytes(self.buffer, value)
    }
    pub fn hex(self, value: &[u8]) {
        self.format.encoding.put_hex(self.buffer, value)
    }
    pub fn bool(self, value: bool) {
        self.format.encoding.put_bool(self.buffer, value)
    }
    pub fn i64(self, value: i64) {
        self.format.encoding.put_i64(self.buffer, value)
    }
    pub fn u64(self, value: u64) {
        self.format.encoding.put_u64(self.buffer, value)
    }
    pub fn f32(self, value: f32) {
        self.format.encoding.put_f32(self.buffer, value)
    }
    pub fn f64(self, value: f64) {
        self.format.encoding.put_f64(self.buffer, value)
    }
    pub fn nil(self) {
        self.format.encoding.put_nil(self.buffer)
    }
    pub fn time(self, value: Timestamp) {
        let format = self.format;
        format
            .encoding
            .put_time(self.buffer, value, &format.time, &format.zone)
    }
    pub fn duration(self, value: Duration) {
        let format = self.format;
        format
            .encoding
            .put_duration(self.buffer, value, format.duration)
    }
    pub fn display(self, value: &dyn Display) {
        self.format.encoding.put_display(self.buffer, value)
    }
    pub fn any<T: Serialize + ?Sized>(self, value: &T) {
        self.format.encoding.put_any(self.buffer, value)
    }
    /// The caller guarantees `raw` is valid in the active encoding.
    pub fn raw(self, raw: &[u8]) {
        self.format.encoding.put_raw(self.buffer, raw)
    }
    pub fn array<I>(mut self, items: I)
    where
        I: IntoIterator,
        I::Item: Encode,
    {
        let encoding = self.format.encoding;
        encoding.put_array_start(self.buffer);
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                encoding.put_array_delim(self.buffer);
            }
            item.encode_log_value_into(self.reborrow());
        }
        encoding.put_array_end(self.buffer);
    }
}

/// A value that knows how to append itself to a record.
pub trait Encode {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>);

    /// True when the value renders as null, so it can be omitted.
    fn is_nil(&self) -> bool {
        false
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        match self {
            Some(value) => value.encode_log_value_into(output),
            None => output.nil(),
        }
    }
    fn is_nil(&self) -> bool {
        match self {
            Some(value) => value.is_nil(),
            None => true,
        }
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        (**self).encode_log_value_into(output)
    }
    fn is_nil(&self) -> bool {
        (**self).is_nil()
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        (**self).encode_log_value_into(output)
    }
    fn is_nil(&self) -> bool {
        (**self).is_nil()
    }
}

impl<T: Encode + ToOwned + ?Sized> Encode for Cow<'_, T> {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        (**self).encode_log_value_into(output)
    }
}

impl<T: Encode> Encode for [T] {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.array(self)
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.array(self)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.array(self)
    }
}

impl Encode for str {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.str(self)
    }
}

impl Encode for String {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.str(self)
    }
}

impl Encode for char {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        let mut buf = [0u8; 4];
        output.str(self.encode_utf8(&mut buf))
    }
}

impl Encode for bool {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.bool(*self)
    }
}

impl Encode for f32 {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.f32(*self)
    }
}

impl Encode for f64 {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.f64(*self)
    }
}

macro_rules! impl_as_log_value {
    ($($type:tt as $as_type:tt => $method:ident),* $(,)?) => {
        $(
            impl Encode for $type {
                fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
                    output.$method(*self as $as_type);
                }
            }
        )*
    };
}

impl_as_log_value! {
    i8 as i64 => i64,
    i16 as i64 => i64,
    i32 as i64 => i64,
    i64 as i64 => i64,
    isize as i64 => i64,
    u8 as u64 => u64,
    u16 as u64 => u64,
    u32 as u64 => u64,
    u64 as u64 => u64,
    usize as u64 => u64,
}

impl Encode for i128 {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.format.encoding.put_i128(output.buffer, *self)
    }
}

impl Encode for u128 {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.format.encoding.put_u128(output.buffer, *self)
    }
}

impl Encode for Timestamp {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.time(*self)
    }
}

impl Encode for SystemTime {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        match Timestamp::try_from(*self) {
            Ok(ts) => output.time(ts),
            Err(err) => output.display(&err),
        }
    }
}

impl Encode for Duration {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.duration(*self)
    }
}

impl Encode for Uuid {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.format.encoding.put_uuid(output.buffer, self)
    }
}

/// Bytes rendered as a string rather than an array of numbers.
pub struct BStr<'a>(pub &'a [u8]);

impl Encode for BStr<'_> {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.bytes(self.0)
    }
}

/// Bytes rendered as a quoted lowercase hex string.
pub struct Hex<'a>(pub &'a [u8]);

impl Encode for Hex<'_> {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.hex(self.0)
    }
}

/// Renders the wrapped value through its [`Display`] implementation.
pub struct Displayed<T>(pub T);

impl<T: Display> Encode for Displayed<T> {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.display(&self.0)
    }
}

/// Renders the wrapped value through `serde_json`.
pub struct Serialized<T>(pub T);

impl<T: Serialize> Encode for Serialized<T> {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        output.any(&self.0)
    }
}

/// A tagged primitive, for code that picks the field type at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
    Time(Timestamp),
    Duration(Duration),
    Nil,
}

impl Encode for Value<'_> {
    fn encode_log_value_into(&self, output: ValueEncoder<'_>) {
        match *self {
            Value::Bool(value) => output.bool(value),
            Value::I64(value) => output.i64(value),
            Value::U64(value) => output.u64(value),
            Value::F32(value) => output.f32(value),
            Value::F64(value) => output.f64(value),
            Value::Str(value) => output.str(value),
            Value::Bytes(value) => output.bytes(value),
            Value::Time(value) => output.time(value),
            Value::Duration(value) => output.duration(value),
            Value::Nil => output.nil(),
        }
    }
    fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

macro_rules! impl_value_from {
    ($($type:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$type> for Value<'_> {
                fn from(value: $type) -> Self {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

impl_value_from! {
    bool => Bool,
    i8 => I64,
    i16 => I64,
    i32 => I64,
    i64 => I64,
    u8 => U64,
    u16 => U64,
    u32 => U64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Timestamp => Time,
    Duration => Duration,
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(value: &'a str) -> Self {
        Value::Str(value)
    }
}

impl<'a, T: Into<Value<'a>>> From<Option<T>> for Value<'a> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Nil, Into::into)
    }
}

/// Encodes `value` with `format` into a fresh string, mostly for tests and
/// diagnostics.
pub fn to_string<T: Encode + ?Sized>(value: &T, format: &Format) -> String {
    let mut out = Vec::new();
    value.encode_log_value_into(ValueEncoder::new(&mut out, format));
    String::from_utf8_lossy(&out).into_owned()
}
