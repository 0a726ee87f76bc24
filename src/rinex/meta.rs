use std::{
    fs::File,
    io::{BufRead, Read, Seek, SeekFrom},
    path::Path,
};

use hifitime::prelude::Epoch;
use log::debug;

use crate::{
    antenna::AntennaCatalog,
    error::{InputDataError, Result},
    fd::{FileDescriptor, is_gzip},
    rinex::line::{is_moving_antenna, time_from_line},
    utils::{gregorian, parse_seconds},
};

/// Maximal number of lines we expect in a header
const MAX_HEADER_LINES: usize = 250;

/// Number of lines browsed by time bounds probes
const TIME_PROBE_LINES: usize = 150;

/// Tail size browsed when looking for the last timeline
const TAIL_SIZE: u64 = 10_000;

const END_OF_HEADER: &str = "END OF HEADER";

/// Header level description of an observation RINEX
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RinexMeta {
    /// Header lines, verbatim (terminations included)
    pub header: Vec<String>,

    /// First observation: "TIME OF FIRST OBS" or first epoch
    pub time_start: Option<Epoch>,

    /// Last observation: "TIME OF LAST OBS" or last epoch
    pub time_end: Option<Epoch>,

    /// Antenna height (m)
    pub antenna_height: Option<f64>,

    /// Antenna model
    pub antenna_type: Option<String>,

    /// Index of the "END OF HEADER" line
    pub end_header_index: usize,
}

/// Header record label, when this line carries it
fn has_label(line: &str, label: &str) -> bool {
    line.trim_end().ends_with(label)
}

fn header_time(line: &str, label: &str) -> Option<Epoch> {
    if !has_label(line, label) {
        return None;
    }

    let mut tokens = line.split_ascii_whitespace();

    let year = tokens.next()?.parse::<i32>().ok()?;
    let month = tokens.next()?.parse::<u8>().ok()?;
    let day = tokens.next()?.parse::<u8>().ok()?;
    let hour = tokens.next()?.parse::<u8>().ok()?;
    let minute = tokens.next()?.parse::<u8>().ok()?;
    let (seconds, nanos) = parse_seconds(tokens.next()?)?;

    gregorian(year, month, day, hour, minute, seconds, nanos)
}

/// Parses "TIME OF FIRST OBS"
pub fn start_time(line: &str) -> Option<Epoch> {
    header_time(line, "TIME OF FIRST OBS")
}

/// Parses "TIME OF LAST OBS"
pub fn end_time(line: &str) -> Option<Epoch> {
    header_time(line, "TIME OF LAST OBS")
}

/// Parses the antenna height from "ANTENNA: DELTA H/E/N"
pub fn antenna_height(line: &str) -> Option<f64> {
    if !has_label(line, "ANTENNA: DELTA H/E/N") {
        return None;
    }
    line.split_ascii_whitespace().next()?.parse::<f64>().ok()
}

/// Parses the antenna model from "ANT # / TYPE".
/// When a catalog is provided, the first token it knows is retained,
/// otherwise the first token of the antenna type field.
pub fn antenna_type(line: &str, catalog: Option<&AntennaCatalog>) -> Option<String> {
    if !has_label(line, "ANT # / TYPE") {
        return None;
    }

    match catalog {
        Some(catalog) if !catalog.is_empty() => line
            .get(..60)
            .unwrap_or(line)
            .split_ascii_whitespace()
            .find(|token| catalog.contains(token))
            .map(|token| token.to_string()),
        _ => line
            .get(20..40)?
            .split_ascii_whitespace()
            .next()
            .map(|token| token.to_string()),
    }
}

impl RinexMeta {
    /// Builds [RinexMeta] from the complete file content.
    /// Missing time bounds are deduced from the first and last epochs.
    pub fn from_lines(lines: &[String], catalog: Option<&AntennaCatalog>) -> Result<Self> {
        let mut meta = Self::default();
        let mut end_of_header = None;

        for (index, line) in lines.iter().enumerate() {
            meta.header.push(line.clone());

            if let Some(t) = start_time(line) {
                meta.time_start = Some(t);
            }
            if let Some(t) = end_time(line) {
                meta.time_end = Some(t);
            }
            if let Some(height) = antenna_height(line) {
                meta.antenna_height = Some(height);
            }
            if let Some(model) = antenna_type(line, catalog) {
                meta.antenna_type = Some(model);
            }

            if line.contains(END_OF_HEADER) {
                end_of_header = Some(index);
                break;
            }
        }

        meta.end_header_index = end_of_header.ok_or(InputDataError::MissingHeaderDelimiter)?;

        if meta.time_start.is_none() || meta.time_end.is_none() {
            debug!("incomplete header time bounds: using epochs");
            meta.time_bounds_by_epochs(lines);
        }

        Ok(meta)
    }

    /// Deduces missing time bounds from the first and last epoch lines
    pub fn time_bounds_by_epochs(&mut self, lines: &[String]) -> (Option<Epoch>, Option<Epoch>) {
        let body = lines.get(self.end_header_index + 1..).unwrap_or_default();

        if self.time_start.is_none() {
            self.time_start = body.iter().find_map(|line| time_from_line(line));
        }

        if self.time_end.is_none() {
            self.time_end = body.iter().rev().find_map(|line| time_from_line(line));
        }

        (self.time_start, self.time_end)
    }
}

/// Header level summary, obtained without parsing the body
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct HeaderSummary {
    pub time_start: Option<Epoch>,
    pub time_end: Option<Epoch>,

    /// First body record declares a moving antenna
    pub is_rover: bool,
}

/// Reads the antenna height from the header only
pub fn read_antenna_height(path: &Path) -> Result<Option<f64>> {
    let reader = FileDescriptor::lines(path)?;

    for line in reader.lines().take(MAX_HEADER_LINES) {
        let line = line?;
        if let Some(height) = antenna_height(&line) {
            return Ok(Some(height));
        }
        if line.contains(END_OF_HEADER) {
            break;
        }
    }

    Ok(None)
}

/// Reads the antenna model from the header only
pub fn read_antenna_type(path: &Path, catalog: Option<&AntennaCatalog>) -> Result<Option<String>> {
    let reader = FileDescriptor::lines(path)?;

    for line in reader.lines().take(MAX_HEADER_LINES) {
        let line = line?;
        if let Some(model) = antenna_type(&line, catalog) {
            return Ok(Some(model));
        }
        if line.contains(END_OF_HEADER) {
            break;
        }
    }

    Ok(None)
}

/// Time bounds (and rover flag) of a RINEX file, header first.
/// When the header does not define them, the first timeline of the body
/// and the last timeline at the end of the file are used.
pub fn header_time_bounds(path: &Path, identify_rover: bool) -> Result<HeaderSummary> {
    let mut summary = HeaderSummary::default();
    let mut lines = FileDescriptor::lines(path)?.lines();

    for _ in 0..TIME_PROBE_LINES {
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        if let Some(t) = start_time(&line) {
            summary.time_start = Some(t);
        }
        if let Some(t) = end_time(&line) {
            summary.time_end = Some(t);
        }

        if line.contains(END_OF_HEADER) {
            if identify_rover {
                if let Some(next) = lines.next() {
                    summary.is_rover = is_moving_antenna(&next?);
                }
            }
            break;
        }
    }

    if summary.time_start.is_none() {
        for line in lines.by_ref() {
            if let Some(t) = time_from_line(&line?) {
                summary.time_start = Some(t);
                break;
            }
        }
    }

    if summary.time_end.is_none() {
        summary.time_end = last_timeline(path)?;
    }

    Ok(summary)
}

/// Last epoch or event of the file
fn last_timeline(path: &Path) -> Result<Option<Epoch>> {
    if is_gzip(path) {
        let mut last = None;
        for line in FileDescriptor::lines(path)?.lines() {
            if let Some(t) = time_from_line(&line?) {
                last = Some(t);
            }
        }
        return Ok(last);
    }

    let mut fd = File::open(path)?;
    let size = fd.metadata()?.len();
    fd.seek(SeekFrom::Start(size.saturating_sub(TAIL_SIZE)))?;

    let mut tail = Vec::with_capacity(TAIL_SIZE as usize);
    fd.read_to_end(&mut tail)?;

    let tail = String::from_utf8_lossy(&tail);
    Ok(tail.lines().rev().find_map(time_from_line))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::{RinexBuilder, t};
    use std::io::Write;

    #[test]
    fn test_header_records() {
        let line = "  2020     7    22    10     0    0.1000000     GPS         TIME OF FIRST OBS";
        assert_eq!(start_time(line), Some(t(10, 0, 0, 100)));
        assert_eq!(end_time(line), None);

        let line = "        1.5300        0.0000        0.0000                  ANTENNA: DELTA H/E/N";
        assert_eq!(antenna_height(line), Some(1.53));

        let line = format!(
            "{:<20}{:<20}{:<20}{}",
            "1234", "JAVRINGANT_DM   SCIS", "", "ANT # / TYPE"
        );
        let line = line.as_str();
        assert_eq!(antenna_type(line, None), Some("JAVRINGANT_DM".to_string()));

        let catalog = AntennaCatalog {
            antennas: vec!["JAVRINGANT_DM".to_string()],
            modified: 0.0,
        };
        assert_eq!(
            antenna_type(line, Some(&catalog)),
            Some("JAVRINGANT_DM".to_string())
        );

        let catalog = AntennaCatalog {
            antennas: vec!["TRM55971.00".to_string()],
            modified: 0.0,
        };
        assert_eq!(antenna_type(line, Some(&catalog)), None);
    }

    #[test]
    fn test_meta() {
        let lines = RinexBuilder::new()
            .epochs(t(10, 0, 0, 100), 10)
            .event(t(10, 0, 0, 450))
            .lines();

        let meta = RinexMeta::from_lines(&lines, None).unwrap();
        assert_eq!(meta.time_start, Some(t(10, 0, 0, 100)));
        assert_eq!(meta.time_end, Some(t(10, 0, 1, 0)));
        assert_eq!(meta.antenna_height, Some(0.1));
        assert_eq!(meta.antenna_type, Some("JAVRINGANT_DM".to_string()));
        assert_eq!(meta.header.len(), meta.end_header_index + 1);
        assert!(meta.header.last().unwrap().contains("END OF HEADER"));
    }

    #[test]
    fn test_meta_without_time_bounds() {
        let lines = RinexBuilder::new()
            .without_time_bounds()
            .epochs(t(10, 0, 0, 100), 10)
            .lines();

        let meta = RinexMeta::from_lines(&lines, None).unwrap();
        assert_eq!(meta.time_start, Some(t(10, 0, 0, 100)));
        assert_eq!(meta.time_end, Some(t(10, 0, 1, 0)));
    }

    #[test]
    fn test_missing_header_delimiter() {
        let lines = vec!["     2.11           OBSERVATION DATA    G (GPS)             RINEX VERSION / TYPE\n".to_string()];
        assert!(RinexMeta::from_lines(&lines, None).is_err());
    }

    #[test]
    fn test_header_probes() {
        let dir = tempfile::tempdir().unwrap();

        let rover = dir.path().join("rover.20o");
        RinexBuilder::new()
            .rover()
            .without_time_bounds()
            .epochs(t(10, 0, 0, 100), 600)
            .write(&rover);

        let summary = header_time_bounds(&rover, true).unwrap();
        assert!(summary.is_rover);
        assert_eq!(summary.time_start, Some(t(10, 0, 0, 100)));
        assert_eq!(summary.time_end, Some(t(10, 1, 0, 0)));

        assert_eq!(read_antenna_height(&rover).unwrap(), Some(0.1));
        assert_eq!(
            read_antenna_type(&rover, None).unwrap(),
            Some("JAVRINGANT_DM".to_string())
        );

        let base = dir.path().join("base.20o");
        RinexBuilder::new()
            .epochs(t(9, 0, 0, 0), 10)
            .write(&base);

        let summary = header_time_bounds(&base, true).unwrap();
        assert!(!summary.is_rover);
        assert_eq!(summary.time_start, Some(t(9, 0, 0, 0)));
        assert_eq!(summary.time_end, Some(t(9, 0, 0, 900)));

        let mut fd = std::fs::File::create(dir.path().join("empty.20o")).unwrap();
        fd.write_all(b"nothing\n").unwrap();
        let summary = header_time_bounds(&dir.path().join("empty.20o"), true).unwrap();
        assert_eq!(summary, HeaderSummary::default());
    }
}
