//! Size and day rotated log file.
//!
//! ```no_run
//! use std::io::Write;
//! use logline::writer::RotatingWriter;
//!
//! let writer = RotatingWriter::new("logs/app.log");
//! writer.set_max_size(16 << 20);
//! (&writer).write_all(b"{\"time\":\"2024-01-02 10:11:12.000\",\"msg\":\"hi\"}\n")?;
//! writer.close()?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! The active file is always `dir/name.suffix`. It is rotated when a record
//! belongs to another day than the file was created on, or when the record
//! would push the file to `max_size`. A record's day is taken from the value
//! of its leading `time` field (see [`record_stamp`]), or from
//! [`RotatingWriter::write_at`] when the caller already knows it; anything
//! else counts as written now. Rotated files are renamed to
//! `name.YYYY-MM-DD-HHMMSS.suffix` after their creation time, and a day
//! rotation also starts a background sweep of files older than `max_age`
//! days (see [`crate::retention`]).

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use jiff::Timestamp;

use crate::mutex::Mutex;
use crate::record::TIME_FIELD;
use crate::retention;

pub const DEFAULT_MAX_SIZE: u64 = 64 << 20;
pub const DEFAULT_MAX_AGE_DAYS: u32 = 31;
pub const DEFAULT_SUFFIX: &str = ".log";

/// Upper bound on `.N` counters tried for a single rotation stamp.
const MAX_COLLISIONS: u32 = 10_000;

pub struct RotatingWriter {
    path: PathBuf,
    dir: PathBuf,
    name: String,
    suffix: String,
    state: Mutex<State>,
}

struct State {
    file: Option<File>,
    /// Bytes in the open file, including what was there before it was opened.
    size: u64,
    /// When the contents of the active file were started.
    created: DateTime,
    max_size: u64,
    max_age: u32,
    console: bool,
    /// Zone record stamps are written in, used for the wall clock and for
    /// the modification time of a file found on disk.
    zone: TimeZone,
}

impl RotatingWriter {
    /// Prepares a writer for `path`. Nothing is opened until the first
    /// write; the parent directory is created eagerly on a best effort basis.
    pub fn new(path: impl AsRef<Path>) -> RotatingWriter {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let suffix = match path.extension() {
            Some(ext) => format!(".{}", ext.to_string_lossy()),
            None => DEFAULT_SUFFIX.to_string(),
        };
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _ = std::fs::create_dir_all(&dir);
        let zone = TimeZone::system();
        RotatingWriter {
            path: dir.join(format!("{}{}", name, suffix)),
            dir,
            name,
            suffix,
            state: Mutex::new(State {
                file: None,
                size: 0,
                created: zone.to_datetime(Timestamp::now()),
                max_size: DEFAULT_MAX_SIZE,
                max_age: DEFAULT_MAX_AGE_DAYS,
                console: false,
                zone,
            }),
        }
    }

    /// The active file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Zero is ignored.
    pub fn set_max_size(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.state.lock().max_size = bytes;
    }

    /// Zero is ignored.
    pub fn set_max_age(&self, days: u32) {
        if days == 0 {
            return;
        }
        self.state.lock().max_age = days;
    }

    /// Mirror every record to stderr as well.
    pub fn set_console(&self, console: bool) {
        self.state.lock().console = console;
    }

    /// Zone the record stamps are in, the system zone by default. RFC3339
    /// stamps are UTC.
    pub fn set_time_zone(&self, zone: TimeZone) {
        self.state.lock().zone = zone;
    }

    pub fn max_size(&self) -> u64 {
        self.state.lock().max_size
    }

    pub fn max_age(&self) -> u32 {
        self.state.lock().max_age
    }

    /// Bytes in the active file, zero when nothing is open.
    pub fn size(&self) -> u64 {
        let state = self.state.lock();
        if state.file.is_some() {
            state.size
        } else {
            0
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().file.is_some()
    }

    /// Writes one complete record, rotating first if needed.
    ///
    /// On failure the record is mirrored to stderr so it is not lost, and
    /// the error is returned.
    pub fn write(&self, record: &[u8]) -> io::Result<usize> {
        self.write_stamped(record, record_stamp(record))
    }

    /// Like [`write`](Self::write) for a record whose civil time is already
    /// known, so the record text is not inspected.
    pub fn write_at(&self, record: &[u8], stamp: DateTime) -> io::Result<usize> {
        self.write_stamped(record, Some(stamp))
    }

    fn write_stamped(&self, record: &[u8], stamp: Option<DateTime>) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.console {
            let _ = io::stderr().write_all(record);
        }
        let stamp = stamp.unwrap_or_else(|| state.zone.to_datetime(Timestamp::now()));

        let result = self.write_locked(&mut state, record, stamp);
        if result.is_err() && !state.console {
            let _ = io::stderr().write_all(record);
        }
        result
    }

    fn write_locked(&self, state: &mut State, record: &[u8], stamp: DateTime) -> io::Result<usize> {
        if state.file.is_none() {
            self.open(state, stamp)?;
        }
        if stamp.date() != state.created.date() {
            self.spawn_sweep(state.max_age, stamp);
            self.rotate(state, stamp)?;
        }
        if state.size > 0 && state.size + record.len() as u64 >= state.max_size {
            self.rotate(state, stamp)?;
        }
        let Some(file) = state.file.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "log file is not open"));
        };
        file.write_all(record)?;
        state.size += record.len() as u64;
        Ok(record.len())
    }

    /// Opens the active file for appending, picking up an existing file's
    /// size and age.
    fn open(&self, state: &mut State, stamp: DateTime) -> io::Result<()> {
        let existing = std::fs::metadata(&self.path).ok();
        std::fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        match existing {
            Some(meta) => {
                state.size = meta.len();
                state.created = meta
                    .modified()
                    .ok()
                    .and_then(|mtime| Timestamp::try_from(mtime).ok())
                    .map_or(stamp, |ts| state.zone.to_datetime(ts));
            }
            None => {
                state.size = 0;
                state.created = stamp;
            }
        }
        state.file = Some(file);
        Ok(())
    }

    fn rotate(&self, state: &mut State, stamp: DateTime) -> io::Result<()> {
        if let Some(file) = state.file.take() {
            let _ = file.sync_all();
            drop(file);
            let target = self.rotated_path(state.created);
            if let Err(err) = std::fs::rename(&self.path, &target) {
                // Keep appending to the current file rather than drop records.
                eprintln!(
                    "logline: failed to rotate {} to {}: {}",
                    self.path.display(),
                    target.display(),
                    err
                );
            }
        }
        state.size = 0;
        self.open(state, stamp)
    }

    fn rotated_path(&self, created: DateTime) -> PathBuf {
        let stamp = created.strftime(retention::STAMP_FORMAT).to_string();
        let candidate = self.dir.join(format!("{}.{}{}", self.name, stamp, self.suffix));
        if !candidate.exists() {
            return candidate;
        }
        let mut counter = 1;
        loop {
            let candidate = self
                .dir
                .join(format!("{}.{}.{}{}", self.name, stamp, counter, self.suffix));
            if !candidate.exists() || counter >= MAX_COLLISIONS {
                return candidate;
            }
            counter += 1;
        }
    }

    fn spawn_sweep(&self, max_age: u32, now: DateTime) {
        if max_age == 0 {
            return;
        }
        let dir = self.dir.clone();
        let name = self.name.clone();
        let suffix = self.suffix.clone();
        let spawned = std::thread::Builder::new()
            .name("logline-retention".into())
            .spawn(move || {
                retention::sweep(&dir, &name, &suffix, max_age, now);
            });
        if let Err(err) = spawned {
            eprintln!("logline: failed to start retention sweep: {}", err);
        }
    }

    /// Runs the retention sweep on the calling thread, relative to the
    /// current time in the stamp zone. Returns the number of files deleted.
    pub fn sweep(&self) -> usize {
        let (max_age, now) = {
            let state = self.state.lock();
            (state.max_age, state.zone.to_datetime(Timestamp::now()))
        };
        retention::sweep(&self.dir, &self.name, &self.suffix, max_age, now)
    }

    /// Flushes file contents to disk.
    pub fn sync(&self) -> io::Result<()> {
        match &self.state.lock().file {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }

    /// Syncs and closes the active file. Safe to call repeatedly; a later
    /// write reopens the file.
    pub fn close(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        let Some(file) = state.file.take() else {
            return Ok(());
        };
        state.size = 0;
        file.sync_all()
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            eprintln!("logline: failed to close {}: {}", self.path.display(), err);
        }
    }
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(&*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Reads the day of a record from the value of its leading `time` field,
/// `{"time":"...` in JSON or `{time:...` in text, or from a line that starts
/// with the stamp itself. The value must be `YYYY-MM-DD[ T]HH:MM:SS` or a bare
/// date, `/` also accepted as the date separator. Anything else, such as a
/// unix time or a custom pattern, yields `None`; later fields are never read.
pub fn record_stamp(record: &[u8]) -> Option<DateTime> {
    if let Some(rest) = record.strip_prefix(b"{") {
        let rest = skip_quote(rest);
        let rest = skip_quote(rest.strip_prefix(TIME_FIELD.as_bytes())?);
        let rest = skip_quote(rest.strip_prefix(b":")?);
        return stamp_at(rest);
    }
    stamp_at(record)
}

fn skip_quote(s: &[u8]) -> &[u8] {
    s.strip_prefix(b"\"").unwrap_or(s)
}

fn digits(bytes: &[u8]) -> Option<i32> {
    bytes.iter().try_fold(0i32, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + (b - b'0') as i32)
    })
}

fn stamp_at(s: &[u8]) -> Option<DateTime> {
    if s.len() < 10 {
        return None;
    }
    let date_sep = s[4];
    if !matches!(date_sep, b'-' | b'/') || s[7] != date_sep {
        return None;
    }
    let year = digits(&s[0..4])?;
    let month = digits(&s[5..7])?;
    let day = digits(&s[8..10])?;
    let (hour, minute, second) = match s.get(10..19) {
        Some([b' ' | b'T', h1, h2, b':', m1, m2, b':', s1, s2]) => (
            digits(&[*h1, *h2])?,
            digits(&[*m1, *m2])?,
            digits(&[*s1, *s2])?,
        ),
        _ => (0, 0, 0),
    };
    DateTime::new(
        year as i16,
        month as i8,
        day as i8,
        hour as i8,
        minute as i8,
        second as i8,
        0,
    )
    .ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use jiff::civil::date;

    #[test]
    fn splits_path() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingWriter::new(dir.path().join("nested/app.txt"));
        assert_eq!(writer.path(), dir.path().join("nested/app.txt"));
        assert_eq!(writer.suffix, ".txt");
        assert_eq!(writer.name, "app");
        assert!(dir.path().join("nested").is_dir());

        let writer = RotatingWriter::new(dir.path().join("plain"));
        assert_eq!(writer.path(), dir.path().join("plain.log"));
    }

    #[test]
    fn finds_record_stamps() {
        assert_eq!(
            record_stamp(br#"{"time":"2024-01-19 13:20:00.123","level":"info"}"#),
            Some(date(2024, 1, 19).at(13, 20, 0, 0))
        );
        assert_eq!(
            record_stamp(b"{time:2024/01/19T01:02:03,level:info}"),
            Some(date(2024, 1, 19).at(1, 2, 3, 0))
        );
        assert_eq!(
            record_stamp(br#"{"time":"2024-01-19"}"#),
            Some(date(2024, 1, 19).at(0, 0, 0, 0))
        );
        assert_eq!(
            record_stamp(b"2024-01-19 13:20:00 plain line"),
            Some(date(2024, 1, 19).at(13, 20, 0, 0))
        );
        assert_eq!(record_stamp(br#"{"time":1705670400123,"level":"info"}"#), None);
        assert_eq!(record_stamp(b"2024-13-40 00:00:00"), None);
        assert_eq!(record_stamp(br#"{"time":"#), None);
        assert_eq!(record_stamp(b""), None);
        assert_eq!(record_stamp(b"short"), None);
    }

    #[test]
    fn dates_in_later_fields_are_not_stamps() {
        assert_eq!(
            record_stamp(br#"{"time":1705670400123,"level":"info","d":"2020-01-01"}"#),
            None
        );
        assert_eq!(
            record_stamp(b"{time:\"Fri 19 Jan\",level:info,d:2020-01-01}"),
            None
        );
        assert_eq!(record_stamp(br#"{"level":"info","time":"2024-01-19"}"#), None);
        assert_eq!(record_stamp(br#"{"d":"2020-01-01 00:00:00"}"#), None);
    }

    #[test]
    fn setters_ignore_zero() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingWriter::new(dir.path().join("app.log"));
        writer.set_max_size(0);
        writer.set_max_age(0);
        assert_eq!(writer.max_size(), DEFAULT_MAX_SIZE);
        assert_eq!(writer.max_age(), DEFAULT_MAX_AGE_DAYS);
        writer.set_max_size(10);
        writer.set_max_age(2);
        assert_eq!(writer.max_size(), 10);
        assert_eq!(writer.max_age(), 2);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingWriter::new(dir.path().join("app.log"));
        writer.close().unwrap();
        writer.write(b"hello\n").unwrap();
        assert!(writer.is_open());
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(!writer.is_open());
        writer.write(b"again\n").unwrap();
        assert_eq!(writer.size(), 12);
        assert_eq!(std::fs::read(writer.path()).unwrap(), b"hello\nagain\n");
    }

    #[test]
    fn rotation_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingWriter::new(dir.path().join("app.log"));
        writer.set_max_size(10);
        let line = b"{\"time\":\"2024-01-19 13:20:00.000\"}\n";
        for _ in 0..3 {
            writer.write(line).unwrap();
        }
        writer.close().unwrap();
        assert!(dir.path().join("app.2024-01-19-132000.log").exists());
        assert!(dir.path().join("app.2024-01-19-132000.1.log").exists());
        assert_eq!(std::fs::read(dir.path().join("app.log")).unwrap(), line);
    }

    #[test]
    fn explicit_stamp_wins_over_record_text() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingWriter::new(dir.path().join("app.log"));
        let day = date(2024, 1, 19).at(10, 0, 0, 0);
        writer.write_at(b"{\"time\":\"2020-01-01\"}\n", day).unwrap();
        writer.write_at(b"{\"time\":\"2021-06-30\"}\n", day).unwrap();
        assert_eq!(writer.size(), 44);
        writer.write_at(b"next\n", date(2024, 1, 20).at(0, 0, 1, 0)).unwrap();
        writer.close().unwrap();
        assert!(dir.path().join("app.2024-01-19-100000.log").exists());
        assert_eq!(std::fs::read(writer.path()).unwrap(), b"next\n");
    }
}
