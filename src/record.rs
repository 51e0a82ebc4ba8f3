//! Assembly of complete log lines.
//!
//! A record is always laid out in the same order:
//!
//! ```text
//! { time, level, [trace], [caller], [fields...], [msg] }\n
//! ```
//!
//! Fields arrive already encoded (see [`crate::Event`]); the assembler only
//! writes the header, splices the fields and closes the object.

use std::fmt;
use std::panic::Location;

use jiff::Timestamp;

use crate::encoding::{Encoder, Format};
use crate::LogLevel;

pub const TIME_FIELD: &str = "time";
pub const LEVEL_FIELD: &str = "level";
pub const TRACE_FIELD: &str = "trace";
pub const CALLER_FIELD: &str = "caller";
pub const MSG_FIELD: &str = "msg";
pub const ERROR_FIELD: &str = "error";

/// Reported when the call site has no usable file name.
const UNKNOWN_FILE: &str = "???";

#[derive(Debug, Clone, Copy)]
pub enum Message<'a> {
    None,
    Str(&'a str),
    Args(fmt::Arguments<'a>),
}

impl Message<'_> {
    fn is_empty(&self) -> bool {
        match self {
            Message::None => true,
            Message::Str(msg) => msg.is_empty(),
            Message::Args(args) => args.as_str() == Some(""),
        }
    }
}

/// The file and line a record was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller<'a> {
    pub file: &'a str,
    pub line: u32,
}

impl<'a> Caller<'a> {
    /// Shortens the path of `location` to what follows the last `sep`. An
    /// empty separator keeps the full path.
    pub fn new(location: &'a Location<'a>, sep: &str) -> Caller<'a> {
        Caller::from_parts(location.file(), location.line(), sep)
    }

    pub fn from_parts(file: &'a str, line: u32, sep: &str) -> Caller<'a> {
        if file.is_empty() {
            return Caller {
                file: UNKNOWN_FILE,
                line: 0,
            };
        }
        let file = match sep {
            "" => file,
            sep => file.rfind(sep).map_or(file, |at| &file[at + sep.len()..]),
        };
        Caller { file, line }
    }
}

impl fmt::Display for Caller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Everything that goes into one line besides the encoding settings.
pub struct Record<'a> {
    pub time: Timestamp,
    pub level: LogLevel,
    /// Encoded trace value, skipped when empty.
    pub trace: &'a [u8],
    pub caller: Option<Caller<'a>>,
    /// Encoded `key:value` pairs, comma separated.
    pub fields: &'a [u8],
    pub message: Message<'a>,
}

/// Appends the complete line for `record`, terminator included.
pub fn assemble(dst: &mut Vec<u8>, format: &Format, record: &Record<'_>) {
    let enc = format.encoding;
    enc.put_begin_marker(dst);

    enc.put_key(dst, TIME_FIELD);
    enc.put_time(dst, record.time, &format.time, &format.zone);

    enc.put_key(dst, LEVEL_FIELD);
    enc.put_str(dst, record.level.as_str());

    if !record.trace.is_empty() {
        enc.put_key(dst, TRACE_FIELD);
        enc.put_raw(dst, record.trace);
    }

    if let Some(caller) = &record.caller {
        enc.put_key(dst, CALLER_FIELD);
        enc.put_display(dst, caller);
    }

    enc.put_object_data(dst, record.fields);

    if !record.message.is_empty() {
        enc.put_key(dst, MSG_FIELD);
        match record.message {
            Message::Str(msg) => enc.put_str(dst, msg),
            Message::Args(args) => match args.as_str() {
                Some(msg) => enc.put_str(dst, msg),
                None => enc.put_display(dst, &args),
            },
            Message::None => {}
        }
    }

    enc.put_end_marker(dst);
    enc.put_line_break(dst);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoding::{Encoding, TimeFormat};
    use jiff::tz::TimeZone;

    fn format(encoding: Encoding) -> Format {
        Format {
            encoding,
            zone: TimeZone::UTC,
            ..Format::default()
        }
    }

    fn record<'a>(fields: &'a [u8], message: Message<'a>) -> Record<'a> {
        Record {
            time: Timestamp::from_millisecond(1_705_670_400_123).unwrap(),
            level: LogLevel::Info,
            trace: b"",
            caller: None,
            fields,
            message,
        }
    }

    fn line(format: &Format, record: &Record<'_>) -> String {
        let mut out = Vec::new();
        assemble(&mut out, format, record);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn minimal_json_record() {
        let out = line(&format(Encoding::Json), &record(b"", Message::None));
        assert_eq!(out, "{\"time\":\"2024-01-19 13:20:00.123\",\"level\":\"info\"}\n");
    }

    #[test]
    fn full_json_record_order() {
        let mut rec = record(br#""user":"bob","n":3"#, Message::Str("hello"));
        rec.trace = br#""abc123""#;
        rec.caller = Some(Caller::from_parts("src/bin/main.rs", 42, "/"));
        rec.level = LogLevel::Warn;
        let out = line(&format(Encoding::Json), &rec);
        assert_eq!(
            out,
            concat!(
                r#"{"time":"2024-01-19 13:20:00.123","level":"warn","trace":"abc123","#,
                r#""caller":"main.rs:42","user":"bob","n":3,"msg":"hello"}"#,
                "\n"
            )
        );
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["n"], 3);
    }

    #[test]
    fn formatted_message() {
        let name = "ada";
        let out = line(
            &format(Encoding::Json),
            &record(b"", Message::Args(format_args!("hi {name}\n"))),
        );
        assert!(out.ends_with("\"msg\":\"hi ada\\n\"}\n"), "{out}");
    }

    #[test]
    fn empty_message_is_omitted() {
        let out = line(&format(Encoding::Json), &record(b"", Message::Str("")));
        assert!(!out.contains("msg"));
        let out = line(&format(Encoding::Json), &record(b"", Message::Args(format_args!(""))));
        assert!(!out.contains("msg"));
    }

    #[test]
    fn text_record() {
        let mut rec = record(b"user:bob,port:\"8080\"", Message::Str("started"));
        rec.caller = Some(Caller::from_parts("main.rs", 7, "/"));
        let out = line(&format(Encoding::Text), &rec);
        assert_eq!(
            out,
            "{time:2024-01-19 13:20:00.123,level:info,caller:main.rs:7,user:bob,port:\"8080\",msg:started}\n"
        );
    }

    #[test]
    fn unix_time_header() {
        let mut fmt = format(Encoding::Json);
        fmt.time = TimeFormat::UnixMs;
        let out = line(&fmt, &record(b"", Message::None));
        assert!(out.starts_with("{\"time\":1705670400123,"), "{out}");
    }

    #[test]
    fn caller_truncation() {
        assert_eq!(
            Caller::from_parts("a/b/c.rs", 3, "/"),
            Caller { file: "c.rs", line: 3 }
        );
        assert_eq!(
            Caller::from_parts("a/b/c.rs", 3, ""),
            Caller { file: "a/b/c.rs", line: 3 }
        );
        assert_eq!(
            Caller::from_parts("src/log/c.rs", 3, "src/"),
            Caller { file: "log/c.rs", line: 3 }
        );
        assert_eq!(Caller::from_parts("c.rs", 9, "/").to_string(), "c.rs:9");
        assert_eq!(Caller::from_parts("", 9, "/").to_string(), "???:0");
    }

    #[test]
    fn caller_from_location() {
        let here = Location::caller();
        let caller = Caller::new(here, "/");
        assert_eq!(caller.file, "record.rs");
        assert_eq!(caller.line, here.line());
    }
}
