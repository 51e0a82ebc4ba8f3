//! Deletion of rotated log files that have aged out.
//!
//! Rotated files are named `<name>.<YYYY-MM-DD-HHMMSS>[.N]<suffix>`, where
//! the stamp is the creation time of the file's contents. Only files that
//! match this shape exactly are ever considered, so unrelated files sharing
//! the directory are left alone.

use std::io;
use std::path::Path;

use jiff::civil::DateTime;
use jiff::Span;

/// Length of the `YYYY-MM-DD-HHMMSS` stamp.
pub const STAMP_LEN: usize = 17;

/// The strftime pattern producing rotation stamps.
pub const STAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Extracts the rotation stamp from a file name produced by rotation of
/// `name` + `suffix`. Returns `None` for anything else, including the
/// active file itself.
pub fn parse_rotated_name(file_name: &str, name: &str, suffix: &str) -> Option<DateTime> {
    let rest = file_name.strip_prefix(name)?.strip_prefix('.')?;
    let rest = rest.strip_suffix(suffix)?;
    if rest.len() < STAMP_LEN || !rest.is_char_boundary(STAMP_LEN) {
        return None;
    }
    let (stamp, counter) = rest.split_at(STAMP_LEN);
    if !counter.is_empty() {
        let digits = counter.strip_prefix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    parse_stamp(stamp.as_bytes())
}

fn parse_stamp(s: &[u8]) -> Option<DateTime> {
    if s[4] != b'-' || s[7] != b'-' || s[10] != b'-' {
        return None;
    }
    let num = |range: std::ops::Range<usize>| -> Option<i32> {
        s[range].iter().try_fold(0i32, |acc, &b| {
            b.is_ascii_digit().then(|| acc * 10 + (b - b'0') as i32)
        })
    };
    DateTime::new(
        num(0..4)? as i16,
        num(5..7)? as i8,
        num(8..10)? as i8,
        num(11..13)? as i8,
        num(13..15)? as i8,
        num(15..17)? as i8,
        0,
    )
    .ok()
}

/// Removes every rotated file in `dir` whose stamp is more than
/// `max_age_days` days before `now`. Returns how many files were removed.
///
/// Problems with individual files are reported on stderr and skipped; a
/// zero `max_age_days` disables the sweep.
pub fn sweep(dir: &Path, name: &str, suffix: &str, max_age_days: u32, now: DateTime) -> usize {
    if max_age_days == 0 {
        return 0;
    }
    let cutoff = match Span::new()
        .try_days(i64::from(max_age_days))
        .and_then(|age| now.checked_sub(age))
    {
        Ok(cutoff) => cutoff,
        Err(err) => {
            eprintln!("logline: retention cutoff out of range: {}", err);
            return 0;
        }
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                eprintln!("logline: failed to list {}: {}", dir.display(), err);
            }
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };
        if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(stamp) = parse_rotated_name(file_name, name, suffix) else {
            continue;
        };
        if stamp >= cutoff {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            // Another sweep got there first.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => eprintln!(
                "logline: unable to delete old file '{}': {}",
                entry.path().display(),
                err
            ),
        }
    }
    removed
}
