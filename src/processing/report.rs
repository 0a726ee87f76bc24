//! Per flight and per run processing reports.
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use itertools::Itertools;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    matching::MissedFiles,
    solver::SolutionType,
};

/// Outcome of the processing of one flight
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlightReport {
    /// Flight identifier: rover and telemetry names
    pub name: String,

    /// Source rover RINEX
    pub rover: PathBuf,

    pub telemetry: Vec<PathBuf>,

    /// Fix quality (%) of each attempted strategy
    pub solutions: BTreeMap<SolutionType, f64>,

    /// Retained strategy
    pub best: Option<SolutionType>,

    /// Fix quality (%) of the retained strategy
    pub quality: Option<f64>,

    /// Time events that could not be attached to an epoch
    pub missed_events: Vec<String>,

    /// Cameras located by telemetry only
    pub navigation_only: Vec<String>,

    pub warnings: Vec<String>,

    /// Produced files
    pub outputs: Vec<PathBuf>,

    pub errors: Vec<String>,
}

impl FlightReport {
    pub fn new(name: &str, rover: &Path, telemetry: &[PathBuf]) -> Self {
        Self {
            name: name.to_string(),
            rover: rover.to_path_buf(),
            telemetry: telemetry.to_vec(),
            ..Default::default()
        }
    }

    /// Records an [Error] as "Name: description"
    pub fn error(&mut self, error: &Error) {
        match error {
            Error::IndexErrorInPosFile => self.errors.push(error.name().to_string()),
            error => self.errors.push(format!("{}: {}", error.name(), error)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.outputs.is_empty()
    }

    fn telemetry_names(&self) -> String {
        self.telemetry
            .iter()
            .map(|path| path.display().to_string())
            .join(", ")
    }

    /// Human readable description
    pub fn description(&self) -> String {
        let mut text = format!(
            "{}\n  rover: {}\n  telemetry: {}\n",
            self.name,
            self.rover.display(),
            self.telemetry_names()
        );

        if !self.solutions.is_empty() {
            let solutions = self
                .solutions
                .iter()
                .map(|(solution, quality)| format!("{} {:.3} %", solution, quality))
                .join(", ");
            text.push_str(&format!("  solutions: {}\n", solutions));
        }

        if let (Some(best), Some(quality)) = (self.best, self.quality) {
            text.push_str(&format!("  best: {} ({:.3} %)\n", best, quality));
        }

        text.push_str(&format!("  missed events: {}\n", self.missed_events.len()));
        for event in self.missed_events.iter() {
            text.push_str(&format!("    {}\n", event.trim_end()));
        }

        if !self.navigation_only.is_empty() {
            text.push_str(&format!(
                "  located by telemetry only: {}\n",
                self.navigation_only.join(" ")
            ));
        }

        for warning in self.warnings.iter() {
            text.push_str(&format!("  warning: {}\n", warning));
        }

        for output in self.outputs.iter() {
            text.push_str(&format!("  output: {}\n", output.display()));
        }

        for error in self.errors.iter() {
            text.push_str(&format!("  error: {}\n", error));
        }

        text
    }
}

/// Outcome of a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Run identifier
    pub run: String,

    pub flights: Vec<FlightReport>,

    /// Files left out of the matches
    pub missed: MissedFiles,

    /// Failures that could not be attributed to a flight
    pub unexpected: Vec<String>,
}

/// Descending quality, flights without solution last
fn by_quality(a: &FlightReport, b: &FlightReport) -> Ordering {
    match (a.quality, b.quality) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl BatchReport {
    pub fn new(run: &str) -> Self {
        Self {
            run: run.to_string(),
            ..Default::default()
        }
    }

    /// Errors and processing description of each flight
    pub fn write_log<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "Processing {}", self.run)?;

        if !self.unexpected.is_empty() {
            writeln!(writer, "\nUnexpected errors:")?;
            for error in self.unexpected.iter() {
                writeln!(writer, "  {}", error)?;
            }
        }

        if !self.missed.is_empty() {
            writeln!(writer, "\nMissed files:")?;
            for (reason, kind, path) in self.missed.entries() {
                writeln!(writer, "  {} {}: {}", kind, path.display(), reason)?;
            }
        }

        for flight in self.flights.iter() {
            writeln!(writer, "\n{}", flight.description().trim_end())?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Tab separated summary, best flights first
    pub fn write_tsv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "quality\tmissed events\ttelemetry\trover\terrors")?;

        for flight in self.flights.iter().sorted_by(|a, b| by_quality(a, b)) {
            let quality = flight
                .quality
                .map(|q| format!("{:.3}", q))
                .unwrap_or_default();

            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                quality,
                flight.missed_events.len(),
                flight.telemetry_names(),
                flight.rover.display(),
                flight.errors.join("; ")
            )?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Writes the processing log, the summary and its JSON dump in `dir`
    pub fn write_all(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let log = dir.join(format!("processing_log_{}.txt", self.run));
        self.write_log(BufWriter::new(File::create(&log)?))?;

        let tsv = dir.join(format!("processing_report_{}.tsv", self.run));
        self.write_tsv(BufWriter::new(File::create(&tsv)?))?;

        let json = dir.join(format!("processing_report_{}.json", self.run));
        let mut writer = BufWriter::new(File::create(&json)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;

        Ok(vec![log, tsv, json])
    }
}
