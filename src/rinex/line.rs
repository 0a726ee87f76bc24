//! Observation RINEX body line classification.
use std::sync::LazyLock;

use hifitime::prelude::Epoch;
use regex::Regex;

use crate::utils::{gregorian, parse_seconds};

/// Epoch flag of a valid observation
const FLAG_OK: u8 = 0;

/// Epoch flag of a moving antenna (kinematic rover)
pub const FLAG_MOVING_ANTENNA: u8 = 2;

/// Epoch flag of an external time event (camera shutter)
const FLAG_EXTERNAL_EVENT: u8 = 5;

/// Flag 2 record with blank date fields, followed by its special records count
static BLANK_MOVING_ANTENNA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(>\s*)?2\s+\d{1,2}\s*$").unwrap());

/// Classification of a RINEX body line.
/// The payload is the index of the first numeric token (the year),
/// which depends on the revision (none in V2, ">" in V3).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Epoch line (flag 0)
    Epoch(usize),
    /// Time event line (flag 5)
    Event(usize),
    /// Anything else
    Other,
}

impl LineKind {
    pub fn is_timeline(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// Timeline tokens: offset of the year and the 7 fields
/// (year, month, day, hour, minute, second, flag).
fn timeline_tokens(line: &str) -> Option<(usize, [&str; 7])> {
    let mut tokens = line.split_ascii_whitespace();
    let mut offset = 0;

    let year = loop {
        let token = tokens.next()?;
        if token.bytes().all(|b| b.is_ascii_digit()) {
            break token;
        }
        offset += 1;
    };

    let mut fields = [year; 7];
    for field in fields.iter_mut().skip(1) {
        *field = tokens.next()?;
    }

    Some((offset, fields))
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn in_range(token: &str, min: u8, max: u8) -> bool {
    is_digits(token)
        && token
            .parse::<u8>()
            .map(|value| value >= min && value <= max)
            .unwrap_or(false)
}

/// Validates the date fields, returns the epoch flag and year offset.
fn parse_flag(line: &str) -> Option<(u8, usize, [&str; 7])> {
    let (offset, fields) = timeline_tokens(line)?;
    let [year, month, day, hour, minute, second, flag] = fields;

    if year.len() != 2 && year.len() != 4 {
        return None;
    }

    if !in_range(month, 1, 12)
        || !in_range(day, 1, 31)
        || !in_range(hour, 0, 24)
        || !in_range(minute, 0, 59)
    {
        return None;
    }

    let seconds = second.parse::<f64>().ok()?;
    if !(0.0..60.0).contains(&seconds) {
        return None;
    }

    if !is_digits(flag) {
        return None;
    }

    let flag = flag.parse::<u8>().ok()?;
    Some((flag, offset, fields))
}

/// Classifies a RINEX body line
pub fn is_timeline(line: &str) -> LineKind {
    match parse_flag(line) {
        Some((FLAG_OK, offset, _)) => LineKind::Epoch(offset),
        Some((FLAG_EXTERNAL_EVENT, offset, _)) => LineKind::Event(offset),
        _ => LineKind::Other,
    }
}

/// Epoch flag of any valid timeline, whatever its value
pub fn epoch_flag(line: &str) -> Option<u8> {
    parse_flag(line).map(|(flag, _, _)| flag)
}

/// True if this record starts a kinematic (moving antenna) session.
/// Event flags 2 to 5 may come with blank date fields.
pub fn is_moving_antenna(line: &str) -> bool {
    epoch_flag(line) == Some(FLAG_MOVING_ANTENNA) || BLANK_MOVING_ANTENNA.is_match(line)
}

/// Returns the [Epoch] of epoch and event lines, None for anything else.
/// Two digit years are expanded into 20YY. Sub microsecond digits are truncated.
pub fn time_from_line(line: &str) -> Option<Epoch> {
    let (flag, _, fields) = parse_flag(line)?;
    if flag != FLAG_OK && flag != FLAG_EXTERNAL_EVENT {
        return None;
    }

    let [year, month, day, hour, minute, second, _] = fields;

    let year = year.parse::<i32>().ok()?;
    let year = if year < 100 { 2000 + year } else { year };

    let hour = hour.parse::<u8>().ok()?;
    if hour > 23 {
        return None;
    }

    let (seconds, nanos) = parse_seconds(second)?;

    gregorian(
        year,
        month.parse().ok()?,
        day.parse().ok()?,
        hour,
        minute.parse().ok()?,
        seconds,
        nanos,
    )
}
