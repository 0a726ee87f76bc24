//! Pairs rover RINEX files with telemetry logs.
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
};

use hifitime::prelude::Epoch;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::{
    error::{InputDataError, Result},
    rinex::header_time_bounds,
    telemetry,
    utils::{is_rinex, is_telemetry},
};

mod name;

pub use name::FlightName;

/// RINEX and telemetry files found in a directory tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightsData {
    pub rinex: Vec<PathBuf>,
    pub telemetry: Vec<PathBuf>,
}

/// Recursively collects RINEX observation files and telemetry logs
pub fn find_flights_data(dir: &Path) -> Result<FlightsData> {
    let mut data = FlightsData::default();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let filename = entry.file_name().to_string_lossy();

        if is_telemetry(&filename) {
            data.telemetry.push(entry.path().to_path_buf());
        }
        if is_rinex(&filename) {
            data.rinex.push(entry.path().to_path_buf());
        }
    }

    debug!(
        "{} - {} rinex, {} telemetry",
        dir.display(),
        data.rinex.len(),
        data.telemetry.len()
    );

    Ok(data)
}

/// Any overlap between A and B
pub fn has_time_overlap(a_start: Epoch, a_end: Epoch, b_start: Epoch, b_end: Epoch) -> bool {
    a_start.max(b_start) <= a_end.min(b_end)
}

/// B (telemetry) within A (rover)
pub fn has_time_full_overlap(a_start: Epoch, a_end: Epoch, b_start: Epoch, b_end: Epoch) -> bool {
    let start_in = a_start <= b_start && b_start < a_end;
    let end_in = a_start < b_end && b_end <= a_end;
    start_in && end_in
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    /// Telemetry must be contained by the rover session, otherwise any overlap is enough
    pub strict: bool,

    /// Compare flight descriptions encoded in file names
    pub refine_by_name: bool,

    pub use_date: bool,
    pub use_flight_type: bool,
    pub use_drone_id: bool,
    pub use_flight_id: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            strict: true,
            refine_by_name: true,
            use_date: true,
            use_flight_type: false,
            use_drone_id: true,
            use_flight_id: true,
        }
    }
}

impl MatchSettings {
    /// True if both names may describe the same flight
    fn same_flight(&self, rover: &FlightName, telemetry: &FlightName) -> bool {
        if !self.refine_by_name {
            return true;
        }

        !(self.use_date && rover.day != telemetry.day
            || self.use_flight_type && rover.flight_type != telemetry.flight_type
            || self.use_drone_id && rover.drone_id != telemetry.drone_id
            || self.use_flight_id && rover.flight_id != telemetry.flight_id)
    }
}

/// Rover RINEX and telemetry log of one flight
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Match {
    pub rinex: PathBuf,
    pub telemetry: PathBuf,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MissedReason {
    /// Time bounds could not be determined
    TimeError,
    /// Matched with nothing
    NoOverlap,
    /// Static receiver
    NotRover,
    /// Outside the base station session
    NotForSelectedBase,
}

impl fmt::Display for MissedReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TimeError => write!(f, "time error"),
            Self::NoOverlap => write!(f, "no time overlap or equal name with other files"),
            Self::NotRover => write!(f, "not rover"),
            Self::NotForSelectedBase => write!(f, "not for selected base RINEX"),
        }
    }
}

/// Files left out of the matches, by reason
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissedFiles {
    pub rinex: BTreeMap<MissedReason, Vec<PathBuf>>,
    pub telemetry: BTreeMap<MissedReason, Vec<PathBuf>>,
}

impl MissedFiles {
    fn rinex(&mut self, reason: MissedReason, path: &Path) {
        self.rinex.entry(reason).or_default().push(path.to_path_buf());
    }

    fn telemetry(&mut self, reason: MissedReason, path: &Path) {
        self.telemetry
            .entry(reason)
            .or_default()
            .push(path.to_path_buf());
    }

    pub fn is_empty(&self) -> bool {
        self.rinex.values().all(|files| files.is_empty())
            && self.telemetry.values().all(|files| files.is_empty())
    }

    /// (reason, kind, file) triplets
    pub fn entries(&self) -> impl Iterator<Item = (MissedReason, &'static str, &Path)> {
        let rinex = self
            .rinex
            .iter()
            .flat_map(|(reason, files)| files.iter().map(|f| (*reason, "rinex", f.as_path())));

        let telemetry = self.telemetry.iter().flat_map(|(reason, files)| {
            files.iter().map(|f| (*reason, "telemetry", f.as_path()))
        });

        rinex.chain(telemetry)
    }
}

/// Candidate telemetry log
#[derive(Debug, Clone)]
struct TelemetryCandidate<'a> {
    path: &'a Path,
    start: Epoch,
    end: Epoch,
    name: FlightName,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Pairs each rover RINEX with the telemetry logs recorded during its session.
/// When `base` is given, files outside of the base session are left out.
/// Static sessions, unreadable time bounds and unmatched files are reported
/// in [MissedFiles].
pub fn find_matches_by_time_bounds(
    rinex: &[PathBuf],
    telemetry: &[PathBuf],
    base: Option<&Path>,
    settings: &MatchSettings,
) -> Result<(Vec<Match>, MissedFiles)> {
    let mut matches = Vec::new();
    let mut missed = MissedFiles::default();

    let (base_start, base_end) = match base {
        Some(base) => {
            let summary = header_time_bounds(base, false)?;
            match (summary.time_start, summary.time_end) {
                (Some(start), Some(end)) => (Some(start), Some(end)),
                _ => return Err(InputDataError::NoTimeBounds.into()),
            }
        },
        None => (None, None),
    };

    let before_base = |t: Epoch| base_start.is_some_and(|start| t < start);
    let after_base = |t: Epoch| base_end.is_some_and(|end| t > end);

    let mut candidates = Vec::with_capacity(telemetry.len());

    for path in telemetry.iter() {
        let Ok((start, end)) = telemetry::time_bounds(path) else {
            missed.telemetry(MissedReason::TimeError, path);
            continue;
        };

        if before_base(start) || after_base(end) {
            missed.telemetry(MissedReason::NotForSelectedBase, path);
            continue;
        }

        candidates.push(TelemetryCandidate {
            path,
            start,
            end,
            name: FlightName::parse(&file_name(path)),
        });
    }

    let overlap = if settings.strict {
        has_time_full_overlap
    } else {
        has_time_overlap
    };

    let mut used = BTreeSet::<&Path>::new();

    for path in rinex.iter() {
        let summary = match header_time_bounds(path, true) {
            Ok(summary) => summary,
            Err(e) => {
                debug!("{} - {}", path.display(), e);
                missed.rinex(MissedReason::TimeError, path);
                continue;
            },
        };

        if !summary.is_rover {
            missed.rinex(MissedReason::NotRover, path);
            continue;
        }

        let (Some(start), Some(end)) = (summary.time_start, summary.time_end) else {
            missed.rinex(MissedReason::TimeError, path);
            continue;
        };

        if after_base(start) || before_base(end) {
            missed.rinex(MissedReason::NotForSelectedBase, path);
            continue;
        }

        let name = FlightName::parse(&file_name(path));
        let mut matched = false;

        for candidate in candidates.iter() {
            if !settings.same_flight(&name, &candidate.name) {
                continue;
            }

            if overlap(start, end, candidate.start, candidate.end) {
                matches.push(Match {
                    rinex: path.clone(),
                    telemetry: candidate.path.to_path_buf(),
                });
                used.insert(candidate.path);
                matched = true;
            }
        }

        if !matched {
            missed.rinex(MissedReason::NoOverlap, path);
        }
    }

    for candidate in candidates.iter() {
        if !used.contains(candidate.path) {
            missed.telemetry(MissedReason::NoOverlap, candidate.path);
        }
    }

    info!(
        "{} matches, {} files missed",
        matches.len(),
        missed.entries().count()
    );

    Ok((matches, missed))
}
