//! Solver ".pos" solutions.
use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

use hifitime::prelude::Epoch;
use log::debug;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    fd::FileDescriptor,
    index::TimeIndex,
    utils::{gregorian, parse_seconds, round_to_millis},
};

/// Fields of a solution line
const POS_FIELDS: usize = 15;

/// Quality flag of a fixed solution
pub const QUALITY_FIXED: u8 = 1;

/// Solved position
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Position {
    /// Latitude (ddeg)
    pub lat: f64,

    /// Longitude (ddeg)
    pub lon: f64,

    /// Height (m)
    pub height: f64,

    /// Quality flag: 1 fixed, 2 float, others are worse
    pub quality: u8,

    /// Standard deviations (north, east, up) in meters
    pub sdn: f64,
    pub sde: f64,
    pub sdu: f64,
}

/// Parses "YYYY/MM/DD" "HH:MM:SS.sss"
fn solution_time(date: &str, time: &str) -> Option<Epoch> {
    let mut date = date.split('/');
    let year = date.next()?.parse::<i32>().ok()?;
    let month = date.next()?.parse::<u8>().ok()?;
    let day = date.next()?.parse::<u8>().ok()?;

    let mut time = time.split(':');
    let hour = time.next()?.parse::<u8>().ok()?;
    let minute = time.next()?.parse::<u8>().ok()?;
    let (seconds, nanos) = parse_seconds(time.next()?)?;

    let t = gregorian(year, month, day, hour, minute, seconds, nanos)?;
    Some(round_to_millis(t))
}

/// Parses one solution line
fn parse_line(line: &str) -> Option<(Epoch, Position)> {
    let fields = line.split_ascii_whitespace().collect::<Vec<_>>();
    if fields.len() != POS_FIELDS {
        return None;
    }

    let t = solution_time(fields[0], fields[1])?;

    let position = Position {
        lat: fields[2].parse().ok()?,
        lon: fields[3].parse().ok()?,
        height: fields[4].parse().ok()?,
        quality: fields[5].parse().ok()?,
        sdn: fields[7].parse().ok()?,
        sde: fields[8].parse().ok()?,
        sdu: fields[9].parse().ok()?,
    };

    Some((t, position))
}

/// Solutions of a ".pos" file
#[derive(Debug, Clone)]
pub struct PosParser {
    /// Source file
    pub path: PathBuf,

    /// Solutions, indexed by time (ms)
    pub positions: TimeIndex<Position>,

    /// Share of fixed solutions (%)
    pub quality: f64,
}

impl PosParser {
    /// Parses a ".pos" file
    pub fn open(path: &Path) -> Result<Self> {
        let reader = FileDescriptor::lines(path)?;
        let mut parser = Self::from_reader(reader)?;
        parser.path = path.to_path_buf();
        debug!(
            "{} - {} solutions, {:.2}% fixed",
            path.display(),
            parser.positions.len(),
            parser.quality
        );
        Ok(parser)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut positions = TimeIndex::default();
        let mut total = 0usize;
        let mut fixed = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.starts_with('%') || line.trim().is_empty() {
                continue;
            }

            match parse_line(&line) {
                Some((t, position)) => {
                    total += 1;
                    if position.quality == QUALITY_FIXED {
                        fixed += 1;
                    }
                    positions.insert(t, position);
                },
                None => {
                    debug!("unexpected solution line: {}", line);
                },
            }
        }

        if total == 0 {
            return Err(Error::IndexErrorInPosFile);
        }

        Ok(Self {
            positions,
            path: PathBuf::new(),
            quality: (fixed * 100) as f64 / total as f64,
        })
    }

    /// Solution at this time, ±1 ms
    pub fn position(&self, t: Epoch) -> Option<&Position> {
        self.positions.get(t)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::t;
    use std::io::Cursor;

    const HEADER: &str = "\
% program   : RTKPOST ver.2.4.3 b34
% inp file  : rover.obs
%  GPST                  latitude(deg) longitude(deg)  height(m)   Q  ns   sdn(m)   sde(m)   sdu(m)  sdne(m)  sdeu(m)  sdun(m) age(s)  ratio
";

    fn solution(second: u32, millis: u32, quality: u8) -> String {
        format!(
            "2020/07/22 10:00:{:02}.{:03}   55.123456789   37.123456789   150.1234   {}   9   0.0100   0.0200   0.0300   0.0000   0.0000   0.0000   0.00    9.9\n",
            second, millis, quality
        )
    }

    #[test]
    fn test_quality() {
        let mut content = HEADER.to_string();
        for i in 0..100 {
            let quality = if i < 73 { 1 } else { 2 };
            content.push_str(&solution(i / 10, (i % 10) * 100, quality));
        }

        let parser = PosParser::from_reader(Cursor::new(content)).unwrap();
        assert_eq!(parser.quality, 73.0);
        assert_eq!(parser.positions.len(), 100);
    }

    #[test]
    fn test_empty_solution() {
        match PosParser::from_reader(Cursor::new(HEADER)) {
            Err(Error::IndexErrorInPosFile) => {},
            other => panic!("unexpected result: {:?}", other.map(|p| p.quality)),
        }
    }

    #[test]
    fn test_unexpected_lines() {
        let mut content = HEADER.to_string();
        content.push_str("2020/07/22 10:00:01.000   55.0   37.0\n");
        content.push_str(&solution(2, 500, 1));

        let parser = PosParser::from_reader(Cursor::new(content)).unwrap();
        assert_eq!(parser.positions.len(), 1);
        assert_eq!(parser.quality, 100.0);

        let position = parser.position(t(10, 0, 2, 500)).unwrap();
        assert_eq!(position.lat, 55.123456789);
        assert_eq!(position.height, 150.1234);
        assert_eq!(position.sdn, 0.01);
        assert_eq!(position.sde, 0.02);
        assert_eq!(position.sdu, 0.03);
    }

    #[test]
    fn test_lookup_tolerance() {
        let content = format!("{}{}", HEADER, solution(30, 50, 1));
        let parser = PosParser::from_reader(Cursor::new(content)).unwrap();

        assert!(parser.position(t(10, 0, 30, 50)).is_some());
        assert!(parser.position(t(10, 0, 30, 49)).is_some());
        assert!(parser.position(t(10, 0, 30, 51)).is_some());
        assert!(parser.position(t(10, 0, 30, 48)).is_none());
        assert!(parser.position(t(10, 0, 30, 52)).is_none());
    }
}
