use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jiff::tz::TimeZone;
use logline::encoding::text::{parse_record, TextValue};
use logline::{
    Config, DurationFormat, Encoding, LogLevel, Logger, NullFields, OutputTarget, TimeFormat,
};

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn take(&self) -> Vec<String> {
        let data = std::mem::take(&mut *self.0.lock().unwrap());
        String::from_utf8(data)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn capture() -> (Logger, Capture) {
    let out = Capture::default();
    let logger = Logger::new(out.clone());
    logger.set_time_zone(TimeZone::UTC);
    (logger, out)
}

#[test]
fn threshold_filters_lower_levels() {
    let (logger, out) = capture();
    logger.set_level(LogLevel::Warn);
    logger.debug().msg("d");
    logger.info().msg("i");
    logger.warn().msg("w");
    logger.error().msg("e");
    logger.log(LogLevel::Info, "i again");
    let lines = out.take();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].contains(r#""level":"warn""#));
    assert!(lines[1].contains(r#""level":"error""#));
}

#[test]
fn macros_report_their_call_site() {
    let (logger, out) = capture();
    logger.set_caller(true);
    let line = line!() + 1;
    logline::info!(logger, "{} + {} = {}", 1, 2, 1 + 2);
    logline::error!(logger, "plain");
    let lines = out.take();
    let record: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(record["msg"], "1 + 2 = 3");
    assert_eq!(record["caller"], format!("logger.rs:{}", line));
    let record: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    assert_eq!(record["msg"], "plain");
    assert_eq!(record["caller"], format!("logger.rs:{}", line + 1));
}

#[test]
fn separator_keeps_path_tail() {
    let (logger, out) = capture();
    logger.set_caller(true);
    logger.set_separator("");
    logger.info().send();
    logger.set_separator("tests/");
    logger.info().send();
    let lines = out.take();
    let full: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    let cut: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    assert!(full["caller"].as_str().unwrap().contains("tests"));
    assert!(cut["caller"].as_str().unwrap().starts_with("logger.rs:"));
}

#[test]
fn text_records_parse_back() {
    let (logger, out) = capture();
    logger.set_encoding(Encoding::Text);
    logger.set_duration_format(DurationFormat::Integer(Duration::from_millis(1)));
    logger
        .info()
        .str("user", "ada lovelace")
        .str("note", "a, b")
        .int("n", -7)
        .float("ratio", 0.25)
        .bool("ok", true)
        .dur("took", Duration::from_millis(1500))
        .strs("tags", &["x", "y z"])
        .msg("done");
    let lines = out.take();
    let fields = parse_record(&lines[0]).unwrap();
    let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_ref()).collect();
    assert_eq!(
        keys,
        ["time", "level", "user", "note", "n", "ratio", "ok", "took", "tags", "msg"]
    );
    assert_eq!(fields[1].1, TextValue::Str("info".into()));
    assert_eq!(fields[2].1.as_str(), Some("ada lovelace"));
    assert_eq!(fields[3].1.as_str(), Some("a, b"));
    assert_eq!(fields[4].1, TextValue::Int(-7));
    assert_eq!(fields[5].1, TextValue::Float(0.25));
    assert_eq!(fields[6].1, TextValue::Bool(true));
    assert_eq!(fields[7].1, TextValue::Int(1500));
    assert_eq!(
        fields[8].1,
        TextValue::Array(vec![TextValue::Str("x".into()), TextValue::Str("y z".into())])
    );
    assert_eq!(fields[9].1.as_str(), Some("done"));
}

#[test]
fn omitted_nulls() {
    let (logger, out) = capture();
    logger.set_null_fields(NullFields::Omit);
    logger
        .info()
        .field("missing", None::<&str>)
        .field("present", Some("here"))
        .stringer("shown", None)
        .err(None)
        .send();
    let lines = out.take();
    let record: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    let object = record.as_object().unwrap();
    assert!(!object.contains_key("missing"));
    assert!(!object.contains_key("shown"));
    assert!(!object.contains_key("error"));
    assert_eq!(record["present"], "here");
}

#[test]
fn time_formats() {
    let (logger, out) = capture();
    logger.set_time_format(TimeFormat::Unix);
    logger.info().send();
    logger.set_time_format(TimeFormat::Rfc3339);
    logger.info().send();
    logger.set_time_format(TimeFormat::Custom("%Y".to_string()));
    logger.info().send();
    let lines = out.take();
    let unix: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert!(unix["time"].as_i64().unwrap() > 1_600_000_000);
    let rfc: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    assert!(rfc["time"].as_str().unwrap().ends_with('Z'));
    let custom: serde_json::Value = serde_json::from_str(&lines[2]).unwrap();
    assert_eq!(custom["time"].as_str().unwrap().len(), 4);
}

#[test]
fn serialized_values() {
    #[derive(serde::Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    let (logger, out) = capture();
    logger
        .info()
        .any("point", &Point { x: 1, y: -2 })
        .raw("pre", br#"{"already":"encoded"}"#)
        .hex("digest", &[0xde, 0xad])
        .bytes("body", b"caf\xc3\xa9")
        .send();
    let lines = out.take();
    let record: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(record["point"], serde_json::json!({"x": 1, "y": -2}));
    assert_eq!(record["pre"]["already"], "encoded");
    assert_eq!(record["digest"], "dead");
    assert_eq!(record["body"], "café");
}

#[test]
fn config_driven_file_logger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc.log");
    let config = Config::default()
        .with_file(&path)
        .with_level(LogLevel::Info)
        .with_encoding(Encoding::Text);
    let logger = Logger::from_config(&config);
    logger.debug().msg("filtered");
    logger.info().str("k", "v").msg("kept");
    logger.close().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);
    let fields = parse_record(lines[0]).unwrap();
    assert_eq!(fields[2].1.as_str(), Some("v"));

    logger.apply_config(&config.clone().with_output(OutputTarget::Discard));
    logger.info().msg("nowhere");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
}

#[test]
fn global_logger_can_be_redirected() {
    let out = Capture::default();
    let logger = logline::global();
    logger.set_output(out.clone());
    logger.set_level(LogLevel::Info);
    logline::debug!(logger, "hidden");
    logline::warn!(logline::global(), "disk {}% full", 93);
    logger.set_discard();
    let lines = out.take();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(r#""msg":"disk 93% full""#));
}
