use std::{path::Path, sync::LazyLock};

use hifitime::prelude::{Duration, Epoch};
use regex::Regex;

static RINEX_OBS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\.\d\d[oO]|\.obs|\.OBS)(\.gz)?$").unwrap());

static TELEMETRY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(?:telemetry|photoscan)\.txt$").unwrap());

static TELEMETRY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(?:telemetry|photo[sS]can)").unwrap());

/// True if this file name looks like an observation RINEX
pub fn is_rinex(filename: &str) -> bool {
    RINEX_OBS_NAME.is_match(filename)
}

/// True if this file name looks like a drone telemetry log
pub fn is_telemetry(filename: &str) -> bool {
    TELEMETRY_NAME.is_match(&filename.to_lowercase())
}

/// Name of the merged products of a telemetry file:
/// "2020_07_22_reg36_g201b20395_f077_telemetry.txt" is turned into "2020_07_22_reg36_g201b20395_f077_GNSS"
pub fn merged_output_name(telemetry: &Path) -> String {
    let stem = file_stem(telemetry);
    let replaced = TELEMETRY_SUFFIX.replace(&stem, "_GNSS").to_string();
    if replaced == stem {
        format!("{}_GNSS", stem)
    } else {
        replaced
    }
}

/// File name without its last extension
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Converts fractional second digits to microseconds.
/// Digits beyond the microsecond are truncated.
pub fn fraction_to_micros(digits: &str) -> Option<u32> {
    if digits.is_empty() {
        return Some(0);
    }

    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = &digits[..digits.len().min(6)];
    let value = digits.parse::<u32>().ok()?;
    Some(value * 10u32.pow(6 - digits.len() as u32))
}

/// Parses a "SS.sssssss" seconds field into integer seconds and nanoseconds,
/// with microsecond resolution.
pub fn parse_seconds(field: &str) -> Option<(u8, u32)> {
    let (integer, fraction) = field.split_once('.').unwrap_or((field, ""));
    let seconds = integer.parse::<u8>().ok()?;
    let micros = fraction_to_micros(fraction)?;
    Some((seconds, micros * 1_000))
}

/// Builds an [Epoch] from calendar fields, returning None on invalid dates
pub fn gregorian(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    nanos: u32,
) -> Option<Epoch> {
    Epoch::maybe_from_gregorian_utc(year, month, day, hour, minute, second, nanos).ok()
}

/// Rounds to the nearest millisecond (half up), sub microsecond is dropped first.
pub fn round_to_millis(t: Epoch) -> Epoch {
    let (y, m, d, hh, mm, ss, ns) = t.to_gregorian_utc();
    let micros = ns / 1_000;
    let millis = if micros % 1_000 >= 500 {
        micros / 1_000 + 1
    } else {
        micros / 1_000
    };
    Epoch::from_gregorian_utc(y, m, d, hh, mm, ss, 0) + Duration::from_milliseconds(millis as f64)
}

/// Floors this [Epoch] to the sub-second observation grid.
/// Steps of one second or more leave the [Epoch] untouched.
pub fn floor_to_grid(t: Epoch, step: Duration) -> Epoch {
    let step_ns = step.total_nanoseconds();
    if step_ns <= 0 || step_ns >= 1_000_000_000 {
        return t;
    }

    let (y, m, d, hh, mm, ss, ns) = t.to_gregorian_utc();
    let floored = (ns as i128 / step_ns * step_ns) as u32;
    Epoch::from_gregorian_utc(y, m, d, hh, mm, ss, floored)
}

/// Date and time arguments of the solver: "YYYY/MM/DD" "HH:MM:SS".
/// When `ceil` is set, any fractional second rounds up to the next second.
pub fn solver_datetime(t: Epoch, ceil: bool) -> (String, String) {
    let (_, _, _, _, _, _, ns) = t.to_gregorian_utc();

    let t = if ceil && ns > 0 {
        t + Duration::from_nanoseconds((1_000_000_000 - ns) as f64)
    } else {
        t
    };

    let (y, m, d, hh, mm, ss, _) = t.to_gregorian_utc();
    (
        format!("{:04}/{:02}/{:02}", y, m, d),
        format!("{:02}:{:02}:{:02}", hh, mm, ss),
    )
}

/// Timestamp of merged products: "YYYY.MM.DD HH:MM:SS.sss"
pub fn merged_datetime(t: Epoch) -> String {
    let (y, m, d, hh, mm, ss, ns) = t.to_gregorian_utc();
    format!(
        "{:04}.{:02}.{:02} {:02}:{:02}:{:02}.{:03}",
        y,
        m,
        d,
        hh,
        mm,
        ss,
        ns / 1_000_000
    )
}

/// "HH:MM:SS" used in warnings
pub fn clock_time(t: Epoch) -> String {
    let (_, _, _, hh, mm, ss, _) = t.to_gregorian_utc();
    format!("{:02}:{:02}:{:02}", hh, mm, ss)
}
