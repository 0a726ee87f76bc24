//! Drone telemetry logs: one line per camera shot.
use std::{
    io::BufRead,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use hifitime::prelude::Epoch;
use log::warn;
use regex::Regex;
use serde::Serialize;

use crate::{
    error::{Error, InputDataError, Result},
    fd::FileDescriptor,
    utils::{fraction_to_micros, gregorian, round_to_millis},
};

/// Tolerant date time: any of `./\:-` between fields, `.` or `,` before the fraction
static TELEMETRY_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[./\\:\-](\d{2})[./\\:\-](\d{2}) (\d+?)[./\\:\-](\d+?)[./\\:\-](\d+)[.,](\d*)")
        .unwrap()
});

/// One camera shot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPosition {
    /// Image file name
    pub name: String,

    /// Navigation grade coordinates
    pub lat: f64,
    pub lon: f64,
    pub height: f64,

    /// Attitude (degrees)
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Parses a telemetry timestamp, rounded to the millisecond
pub fn parse_telemetry_time(field: &str) -> Option<Epoch> {
    let captures = TELEMETRY_TIME.captures(field)?;

    let number = |index: usize| captures.get(index).map(|m| m.as_str());

    let year = number(1)?.parse::<i32>().ok()?;
    let month = number(2)?.parse::<u8>().ok()?;
    let day = number(3)?.parse::<u8>().ok()?;
    let hour = number(4)?.parse::<u8>().ok()?;
    let minute = number(5)?.parse::<u8>().ok()?;
    let second = number(6)?.parse::<u8>().ok()?;
    let micros = fraction_to_micros(number(7)?)?;

    let t = gregorian(year, month, day, hour, minute, second, micros * 1_000)?;
    Some(round_to_millis(t))
}

/// Column indexes of the required fields
#[derive(Debug, Copy, Clone)]
struct Columns {
    count: usize,
    file: usize,
    lat: usize,
    lon: usize,
    height: usize,
    roll: usize,
    pitch: usize,
    yaw: usize,
    time: usize,
}

impl Columns {
    fn from_title(title: &[String]) -> Result<Self> {
        let position = |name: &str| {
            title.iter().position(|col| col == name).ok_or_else(|| {
                Error::from(InputDataError::Telemetry(format!(
                    "missing \"{}\" column",
                    name
                )))
            })
        };

        Ok(Self {
            count: title.len(),
            file: position("file")?,
            lat: position("lat")?,
            lon: position("lon")?,
            height: position("altGPS")?,
            roll: position("roll")?,
            pitch: position("pitch")?,
            yaw: position("yaw")?,
            time: position("time")?,
        })
    }

    fn parse_row(&self, row: &[&str]) -> Option<(Epoch, TelemetryPosition)> {
        let float = |index: usize| {
            row[index]
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
        };

        let t = parse_telemetry_time(row[self.time])?;

        Some((
            t,
            TelemetryPosition {
                name: row[self.file].trim().to_string(),
                lat: float(self.lat)?,
                lon: float(self.lon)?,
                height: float(self.height)?,
                roll: float(self.roll)?,
                pitch: float(self.pitch)?,
                yaw: float(self.yaw)?,
            },
        ))
    }
}

/// Parsed telemetry log. Entries keep the file order.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    /// Source file
    pub path: PathBuf,

    /// Camera shots, timestamped
    pub entries: Vec<(Epoch, TelemetryPosition)>,
}

impl Telemetry {
    /// Parses a telemetry log. Invalid rows are skipped, with a warning
    /// unless `silently` is set.
    pub fn open(path: &Path, silently: bool) -> Result<Self> {
        let reader = FileDescriptor::lines(path)?;
        let mut telemetry = Self::from_reader(reader, silently)?;
        telemetry.path = path.to_path_buf();
        Ok(telemetry)
    }

    pub fn from_reader<R: BufRead>(reader: R, silently: bool) -> Result<Self> {
        let mut title = None::<Vec<String>>;
        let mut columns = None::<Columns>;
        let mut entries = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;

            if columns.is_none() {
                if line.contains('#') {
                    // last header row defines the columns
                    title = Some(
                        line.split_ascii_whitespace()
                            .skip(1)
                            .map(|s| s.to_string())
                            .collect(),
                    );
                    continue;
                }

                let Some(title) = title.as_ref() else {
                    return Err(InputDataError::Telemetry("missing header".to_string()).into());
                };

                columns = Some(Columns::from_title(title)?);
            }

            let Some(columns) = columns.as_ref() else {
                continue;
            };

            let row = line.split('\t').collect::<Vec<_>>();
            if row.len() != columns.count {
                if !silently && !line.trim().is_empty() {
                    warn!("empty/incorrect line {} in telemetry: {}", index + 1, line);
                }
                continue;
            }

            match columns.parse_row(&row) {
                Some(entry) => entries.push(entry),
                None => {
                    if !silently {
                        warn!("invalid line {} in telemetry: event excluded", index + 1);
                    }
                },
            }
        }

        if columns.is_none() {
            // header only
            match title.as_ref() {
                Some(title) => {
                    Columns::from_title(title)?;
                },
                None => {
                    return Err(InputDataError::Telemetry("missing header".to_string()).into());
                },
            }
        }

        Ok(Self {
            entries,
            path: PathBuf::new(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// First and last shots
    pub fn time_bounds(&self) -> Option<(Epoch, Epoch)> {
        let start = self.entries.iter().map(|(t, _)| *t).min()?;
        let end = self.entries.iter().map(|(t, _)| *t).max()?;
        Some((start, end))
    }
}

/// Time bounds of a telemetry log
pub fn time_bounds(path: &Path) -> Result<(Epoch, Epoch)> {
    let telemetry = Telemetry::open(path, true)?;
    telemetry.time_bounds().ok_or_else(|| {
        Error::TelemetryTime(format!("no valid time in {}", path.display()))
    })
}
