//! Fixed width date/time formatting for the record hot path.
//!
//! General purpose formatting (`strftime`, `Display`) is far slower than
//! writing 23 known-width digits, and every record carries a timestamp.

use jiff::tz::TimeZone;
use jiff::Timestamp;

const MS_PER_DAY: i64 = 86_400_000;
const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_MIN: i64 = 60_000;
const MS_PER_SECOND: i64 = 1000;

// 0000-01-01T00:00:00.000 and 9999-12-31T23:59:59.999, the range that fits
// four year digits.
const MIN_MS: i64 = -62_167_219_200_000;
const MAX_MS: i64 = 253_402_300_799_999;

/// Length of [`append_datetime`] output without quotes.
pub const DATETIME_LEN: usize = 23;

/// Milliseconds since the epoch shifted into `zone`'s wall clock.
pub fn local_millis(ts: Timestamp, zone: &TimeZone) -> i64 {
    let offset = zone.to_offset(ts).seconds() as i64;
    ts.as_millisecond().saturating_add(offset * MS_PER_SECOND)
}

/// Appends `YYYY-MM-DD<sep>HH:MM:SS.mmm` for a wall clock millisecond value.
pub fn append_datetime(out: &mut Vec<u8>, ms: i64, sep: u8) {
    let ms = ms.clamp(MIN_MS, MAX_MS);
    let days_since_epoch = ms.div_euclid(MS_PER_DAY);
    let ms_today = ms.rem_euclid(MS_PER_DAY);
    let Date(year, month, day) = to_date(days_since_epoch as i32);

    let mut buf = [0u8; DATETIME_LEN];
    let year = year.unsigned_abs() as usize;
    write_2digit_number(&mut buf[0..2], year / 100);
    write_2digit_number(&mut buf[2..4], year % 100);
    buf[4] = b'-';
    write_2digit_number(&mut buf[5..7], month as usize);
    buf[7] = b'-';
    write_2digit_number(&mut buf[8..10], day as usize);
    buf[10] = sep;

    let hours = ms_today / MS_PER_HOUR;
    let rest = ms_today % MS_PER_HOUR;
    write_2digit_number(&mut buf[11..13], hours as usize);
    buf[13] = b':';
    write_2digit_number(&mut buf[14..16], (rest / MS_PER_MIN) as usize);
    buf[16] = b':';
    write_2digit_number(&mut buf[17..19], ((rest % MS_PER_MIN) / MS_PER_SECOND) as usize);
    buf[19] = b'.';
    let millis = ms_today % MS_PER_SECOND;
    buf[20] = b'0' + (millis / 100) as u8;
    write_2digit_number(&mut buf[21..23], (millis % 100) as usize);

    out.extend_from_slice(&buf);
}

/// Appends a UTC ISO 8601 timestamp such as `2025-04-17T09:56:52.232Z`.
pub fn append_iso_utc(out: &mut Vec<u8>, ts: Timestamp) {
    append_datetime(out, ts.as_millisecond(), b'T');
    out.push(b'Z');
}

// Precomputed lookup table for formatting two decimal digits (00-99) quickly.
#[rustfmt::skip]
const DEC_DIGITS_LUT: &[u8; 200] = b"\
    0001020304050607080910111213141516171819\
    2021222324252627282930313233343536373839\
    4041424344454647484950515253545556575859\
    6061626364656667686970717273747576777879\
    8081828384858687888990919293949596979899";

fn write_2digit_number(dst: &mut [u8], value: usize) {
    let i = (value % 100) * 2;
    dst[..2].copy_from_slice(&DEC_DIGITS_LUT[i..i + 2]);
}

pub struct Date(pub i32, pub u32, pub u32);

/// Converts days since the Unix epoch into a proleptic Gregorian date.
pub fn to_date(n_u: i32) -> Date {
    const S: u32 = 82;
    const K: u32 = 719468 + 146097 * S;
    const L: u32 = 400 * S;
    let n = (n_u as u32).wrapping_add(K);

    let n_1 = 4 * n + 3;
    let c = n_1 / 146097;
    let n_c = n_1 % 146097 / 4;

    let n_2 = 4 * n_c + 3;
    let p_2 = 2939745_u64 * (n_2 as u64);
    let z = (p_2 >> 32) as u32;
    let n_y = (p_2 as u32) / (2939745 * 4);
    let y = 100 * c + z;

    let n_3 = 2141 * n_y + 197913;
    let m = n_3 >> 16;
    let d = (n_3 & 0xffff) / 2141;

    let j = n_y >= 306;
    let y_g = ((y - L) + (j as u32)) as i32;
    let m_g = if j { m - 12 } else { m };
    let d_g = d + 1;

    Date(y_g, m_g, d_g)
}
