//! Flight processing: rover preparation, solver strategies,
//! merge with telemetry and reports.
mod report;

pub use report::{BatchReport, FlightReport};

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use hifitime::prelude::{Duration, Epoch};
use log::{debug, error, info, warn};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    antenna::AntennaCatalog,
    error::{Error, InputDataError, Result},
    matching::{Match, MissedFiles},
    merge::{PositionMerger, write_merged_txt, write_merged_xml},
    pos::PosParser,
    rinex::{
        EventRecord, RinexParser, copy_rinex, header_time_bounds, read_antenna_height,
        read_antenna_type,
    },
    runtime::Runtime,
    settings::Settings,
    solver::{
        CONFIG_FILE, EVENTS_FILE, ProcessingParameters, SolutionType, Solver, SolverJob,
        TRACK_FILE, create_configuration_file,
    },
    telemetry::{self, Telemetry},
    utils::{clock_time, file_stem, merged_output_name},
};

/// Base station files and solver parameters, shared by all flights
#[derive(Debug, Clone)]
struct BaseInputs {
    obs: PathBuf,
    nav: PathBuf,
    gnav: Option<PathBuf>,
    parameters: ProcessingParameters,
}

/// Rover RINEX rewritten around its time events
#[derive(Debug, Clone)]
struct UpgradedRover {
    obs: PathBuf,
    start: Epoch,
    end: Epoch,
    missed_events: Vec<String>,
}

/// Flight identifier: rover and telemetry names
pub fn flight_name(rover: &Path, telemetry: &Path) -> String {
    format!("{}_{}", file_stem(rover), file_stem(telemetry))
}

/// File name up to its first dot
fn short_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    name.split('.').next().unwrap_or_default().to_string()
}

fn round_decimals(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Compares the rover session with the base session and the telemetry logs.
/// Telemetry entirely outside of the rover session is an error,
/// partial overlaps only produce warnings.
pub fn check_time_bounds(
    rover: (Epoch, Epoch),
    base: (Epoch, Epoch),
    telemetry: &[(PathBuf, (Epoch, Epoch))],
) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if rover.0 < base.0 {
        warnings.push(format!(
            "rover RINEX starts before base RINEX (rover: {}, base: {})",
            clock_time(rover.0),
            clock_time(base.0)
        ));
    }

    if rover.1 > base.1 {
        warnings.push(format!(
            "rover RINEX ends after base RINEX (rover: {}, base: {})",
            clock_time(rover.1),
            clock_time(base.1)
        ));
    }

    for (path, (start, end)) in telemetry.iter() {
        if *start > rover.1 {
            return Err(InputDataError::Telemetry(format!(
                "first event of {} is later than the last rover observation",
                path.display()
            ))
            .into());
        }

        if *end < rover.0 {
            return Err(InputDataError::Telemetry(format!(
                "last event of {} is earlier than the first rover observation",
                path.display()
            ))
            .into());
        }

        if *start < rover.0 {
            warnings.push(format!(
                "first event of {} is earlier than the first rover observation",
                path.display()
            ));
        }

        if *end > rover.1 {
            warnings.push(format!(
                "last event of {} is later than the last rover observation",
                path.display()
            ));
        }
    }

    Ok(warnings)
}

fn header_bounds(path: &Path) -> Result<(Epoch, Epoch)> {
    let summary = header_time_bounds(path, false)?;
    match (summary.time_start, summary.time_end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(InputDataError::NoTimeBounds.into()),
    }
}

/// Shrunk rover RINEX
#[derive(Debug, Clone)]
pub struct ShrinkOutput {
    pub rinex: PathBuf,

    /// Sibling files (navigation...) copied next to the result
    pub siblings: Vec<PathBuf>,

    pub missed_events: Vec<EventRecord>,
}

/// Rewrites a rover RINEX keeping `epochs_per_event` epochs around each event,
/// and copies its sibling files (same name, other extension) next to `output`.
pub fn shrink(
    rover: &Path,
    output: &Path,
    epochs_per_event: usize,
    obs_frequency: Duration,
    catalog: Option<&AntennaCatalog>,
) -> Result<ShrinkOutput> {
    let mut parser = RinexParser::open(rover, obs_frequency, catalog)?;
    parser.make_obs_rinex(output, Some(epochs_per_event / 2))?;

    let rover_stem = rover.file_stem().map(|s| s.to_os_string());
    let rover_ext = rover.extension().map(|s| s.to_os_string());

    let output_stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let output_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let rover_dir = match rover.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut siblings = Vec::new();

    let mut entries = std::fs::read_dir(&rover_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();

    entries.sort();

    for entry in entries {
        if entry.file_stem().map(|s| s.to_os_string()) != rover_stem {
            continue;
        }

        let Some(extension) = entry.extension() else {
            continue;
        };

        if Some(extension.to_os_string()) == rover_ext {
            continue;
        }

        let target = output_dir.join(format!(
            "{}.{}",
            output_stem,
            extension.to_string_lossy()
        ));

        std::fs::copy(&entry, &target)?;
        debug!("{} copied to {}", entry.display(), target.display());
        siblings.push(target);
    }

    Ok(ShrinkOutput {
        rinex: output.to_path_buf(),
        siblings,
        missed_events: parser.missed_events().to_vec(),
    })
}

/// Flight processor, against one base station
pub struct Processor {
    settings: Settings,
    solver: Solver,
    template: PathBuf,
    catalog: Option<AntennaCatalog>,
    runtime: Arc<Runtime>,
}

impl Processor {
    pub fn new(settings: Settings, runtime: Arc<Runtime>) -> Result<Self> {
        settings.validate()?;

        let template = settings
            .template
            .clone()
            .ok_or_else(|| Error::Config("solver configuration template is missing".to_string()))?;

        let catalog = match &settings.antenna_calibration {
            Some(antex) => match AntennaCatalog::load(antex) {
                Ok(catalog) => Some(catalog),
                Err(e) => {
                    warn!("{} - antenna catalog unavailable: {}", antex.display(), e);
                    None
                },
            },
            None => None,
        };

        Ok(Self {
            solver: Solver::new(&settings.solver),
            settings,
            template,
            catalog,
            runtime,
        })
    }

    /// Per run scratch directory, removed when dropped
    fn temp_root(&self) -> Result<tempfile::TempDir> {
        let root = tempfile::Builder::new()
            .prefix(&format!("gnss_temp_{}_", self.runtime.run_name()))
            .tempdir()?;

        debug!("{} - scratch directory", root.path().display());
        Ok(root)
    }

    /// Copies the base station files and prepares the solver parameters
    fn prepare_base(&self, base: &Path, root: &Path) -> Result<BaseInputs> {
        let dir = root.join("base_st");
        std::fs::create_dir_all(&dir)?;

        // glonass navigation is only copied when used
        let exclude: &[&str] = if self.settings.glonass { &[] } else { &["g"] };
        let copies = copy_rinex(base, &dir, exclude)?;

        let obs = copies.obs.ok_or_else(|| {
            InputDataError::InvalidValue(format!("{}: base observations not found", base.display()))
        })?;

        let nav = copies.nav.ok_or_else(|| {
            InputDataError::InvalidValue(format!(
                "{}: base navigation file not found",
                base.display()
            ))
        })?;

        if self.settings.glonass && copies.gnav.is_none() {
            warn!("{}: no glonass navigation file", base.display());
        }

        let station = self.settings.base_station(
            read_antenna_height(&obs)?,
            read_antenna_type(&obs, self.catalog.as_ref())?,
        )?;

        let parameters = self.settings.processing_parameters(&station)?;

        info!(
            "base station: lat {} lon {} height {} ({})",
            parameters.base.y, parameters.base.x, parameters.base.z, parameters.antenna_type
        );

        Ok(BaseInputs {
            obs,
            nav,
            gnav: copies.gnav,
            parameters,
        })
    }

    /// Rewrites the rover RINEX in the flight directory
    fn upgrade_rover(&self, rover: &Path, dir: &Path) -> Result<UpgradedRover> {
        let mut parser =
            RinexParser::open(rover, self.settings.obs_frequency(), self.catalog.as_ref())?;

        let obs = dir.join(format!("{}.obs", short_name(rover)));
        parser.make_obs_rinex(&obs, self.settings.epochs_buffer)?;

        let (Some(start), Some(end)) = (parser.meta.time_start, parser.meta.time_end) else {
            return Err(InputDataError::NoTimeBounds.into());
        };

        debug!(
            "{} - antenna {} ({} m)",
            rover.display(),
            parser.meta.antenna_type.as_deref().unwrap_or("unknown"),
            parser.meta.antenna_height.unwrap_or_default()
        );

        Ok(UpgradedRover {
            obs,
            start,
            end,
            missed_events: parser
                .missed_events()
                .iter()
                .map(|event| event.data.trim_end().to_string())
                .collect(),
        })
    }

    /// Runs all strategies concurrently. Remaining runs are aborted
    /// once one of them exceeds the quality threshold.
    /// Returns the best strategy, its solutions and quality.
    async fn solve(
        &self,
        report: &mut FlightReport,
        rover: &UpgradedRover,
        base: &BaseInputs,
        dir: &Path,
    ) -> Result<Option<(SolutionType, PathBuf, f64)>> {
        let mut tasks = JoinSet::new();

        for solution in SolutionType::ALL {
            let solution_dir = dir.join(solution.name());
            std::fs::create_dir_all(&solution_dir)?;

            let config = solution_dir.join(CONFIG_FILE);
            create_configuration_file(
                &self.template,
                &config,
                solution,
                &base.parameters,
                self.settings.antenna_calibration.as_deref(),
            )?;

            let job = SolverJob {
                config,
                dir: solution_dir,
                rover: rover.obs.clone(),
                base: base.obs.clone(),
                nav: base.nav.clone(),
                gnav: base.gnav.clone(),
                start: rover.start,
                end: rover.end,
            };

            let solver = self.solver.clone();
            let shutdown = self.runtime.shutdown_receiver();

            tasks.spawn(async move {
                let quality = match solver.run(&job, shutdown).await {
                    Ok(events) => PosParser::open(&events).map(|pos| pos.quality),
                    Err(e) => Err(e),
                };
                (solution, job.dir, quality)
            });
        }

        let mut best = None::<(SolutionType, PathBuf, f64)>;
        let mut failures = Vec::<Error>::new();

        while let Some(joined) = tasks.join_next().await {
            let (solution, solution_dir, quality) = match joined {
                Ok(output) => output,
                Err(e) => {
                    report.errors.push(format!("solver task: {}", e));
                    continue;
                },
            };

            match quality {
                Ok(quality) => {
                    info!("{} - {}: {:.3} % fixed", report.name, solution, quality);
                    report.solutions.insert(solution, round_decimals(quality, 3));

                    let better = best.as_ref().is_none_or(|(retained, _, q)| {
                        quality > *q || (quality == *q && solution < *retained)
                    });

                    if better {
                        best = Some((solution, solution_dir.join(EVENTS_FILE), quality));
                    }

                    if quality > self.settings.quality_threshold {
                        debug!("{} - {} exceeds threshold", report.name, solution);
                        tasks.abort_all();
                        break;
                    }
                },
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("{} - {}: {}", report.name, solution, e);
                    failures.push(e);
                },
            }
        }

        if best.is_none() {
            for failure in failures.iter() {
                report.error(failure);
            }
        }

        Ok(best)
    }

    /// Merges the solutions with each telemetry log, writes products in `export`
    fn merge(&self, report: &mut FlightReport, events: &Path, export: &Path) -> Result<()> {
        let solutions = PosParser::open(events)?;
        let merger = PositionMerger::new(self.settings.merge_options());

        for path in report.telemetry.clone() {
            let telemetry = Telemetry::open(&path, true)?;
            if telemetry.is_empty() {
                return Err(Error::TelemetryTime(format!(
                    "no valid row in {}",
                    path.display()
                )));
            }

            let merged = merger.merge(&solutions, &telemetry, true)?;

            report.navigation_only.extend(
                merged
                    .navigation_only()
                    .into_iter()
                    .map(|name| name.to_string()),
            );

            let name = merged_output_name(&path);

            let xml = export.join(format!("{}.xml", name));
            write_merged_xml(&merged, &xml)?;

            let txt = export.join(format!("{}.txt", name));
            write_merged_txt(&merged, &txt)?;

            info!(
                "{} - {} cameras ({} located by telemetry only)",
                xml.display(),
                merged.records.len(),
                merged.navigation_only().len()
            );

            report.outputs.push(xml);
            report.outputs.push(txt);
        }

        if let Some(solution_dir) = events.parent() {
            for file in [EVENTS_FILE, TRACK_FILE] {
                let source = solution_dir.join(file);
                if source.exists() {
                    let target = export.join(format!("{}_{}", report.name, file));
                    std::fs::copy(&source, &target)?;
                    report.outputs.push(target);
                }
            }
        }

        Ok(())
    }

    async fn process_steps(
        &self,
        report: &mut FlightReport,
        base: &BaseInputs,
        dir: &Path,
        export: &Path,
    ) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let rover = self.upgrade_rover(&report.rover.clone(), dir)?;
        report.missed_events = rover.missed_events.clone();

        if !rover.missed_events.is_empty() {
            warn!(
                "{} - {} missed events",
                report.name,
                rover.missed_events.len()
            );
        }

        let Some((best, events, quality)) = self.solve(report, &rover, base, dir).await? else {
            return Ok(());
        };

        info!("{} - retained {} solution ({:.3} %)", report.name, best, quality);
        report.best = Some(best);
        report.quality = Some(round_decimals(quality, 3));

        self.merge(report, &events, export)
    }

    /// Processes one flight in `root/name`. Errors are captured in the report.
    async fn process_flight(
        &self,
        name: &str,
        rover: &Path,
        telemetry: &[PathBuf],
        base: &BaseInputs,
        root: &Path,
        export: &Path,
    ) -> FlightReport {
        let mut report = FlightReport::new(name, rover, telemetry);
        let dir = root.join(name);

        if let Err(e) = self.process_steps(&mut report, base, &dir, export).await {
            if e.is_input_data_error() {
                warn!("{} - {}", name, e);
            } else {
                error!("{} - {}", name, e);
            }
            report.error(&e);
        }

        if dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                debug!("{} - failed to remove: {}", dir.display(), e);
            }
        }

        report
    }

    /// Processes all matches against one base station, writes merged products
    /// and run reports in `export`.
    pub async fn run_batch(
        self: Arc<Self>,
        matches: Vec<Match>,
        missed: MissedFiles,
        base: &Path,
        export: &Path,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::new(&self.runtime.run_name());
        report.missed = missed;

        std::fs::create_dir_all(export)?;

        let root = self.temp_root()?;
        let base = Arc::new(self.prepare_base(base, root.path())?);

        let semaphore = Arc::new(Semaphore::new(self.settings.workers()));
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();

        for flight in matches {
            let name = flight_name(&flight.rinex, &flight.telemetry);
            let telemetry = vec![flight.telemetry.clone()];

            pending.insert(
                name.clone(),
                FlightReport::new(&name, &flight.rinex, &telemetry),
            );

            let this = Arc::clone(&self);
            let base = Arc::clone(&base);
            let semaphore = Arc::clone(&semaphore);
            let root = root.path().to_path_buf();
            let export = export.to_path_buf();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    let mut report = FlightReport::new(&name, &flight.rinex, &telemetry);
                    report.error(&Error::Cancelled);
                    return report;
                };

                if this.runtime.is_shutdown() {
                    let mut report = FlightReport::new(&name, &flight.rinex, &telemetry);
                    report.error(&Error::Cancelled);
                    return report;
                }

                this.process_flight(&name, &flight.rinex, &telemetry, &base, &root, &export)
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(flight) => {
                    pending.remove(&flight.name);
                    info!(
                        "{} - completed ({})",
                        flight.name,
                        flight
                            .quality
                            .map(|q| format!("{:.3} %", q))
                            .unwrap_or_else(|| "no solution".to_string())
                    );
                    report.flights.push(flight);
                },
                Err(e) => {
                    error!("flight task failure: {}", e);
                    report.unexpected.push(e.to_string());
                },
            }
        }

        // flights whose task failed
        for (_, mut flight) in pending.into_iter() {
            flight.errors.push("unexpected failure".to_string());
            report.flights.push(flight);
        }

        report.flights.sort_by(|a, b| a.name.cmp(&b.name));

        for file in report.write_all(export)? {
            info!("{} - report written", file.display());
        }

        Ok(report)
    }

    /// Processes one flight (one or two telemetry logs) against one base station
    pub async fn run_single(
        &self,
        rover: &Path,
        base: &Path,
        telemetry: &[PathBuf],
        export: &Path,
    ) -> Result<FlightReport> {
        let first = match telemetry {
            [first] | [first, _] => first,
            _ => {
                return Err(Error::Config(
                    "one or two telemetry files are expected".to_string(),
                ));
            },
        };

        std::fs::create_dir_all(export)?;

        let rover_bounds = header_bounds(rover)?;
        let base_bounds = header_bounds(base)?;

        let telemetry_bounds = telemetry
            .iter()
            .map(|path| telemetry::time_bounds(path).map(|bounds| (path.clone(), bounds)))
            .collect::<Result<Vec<_>>>()?;

        let warnings = check_time_bounds(rover_bounds, base_bounds, &telemetry_bounds)?;
        for warning in warnings.iter() {
            warn!("{}", warning);
        }

        let root = self.temp_root()?;
        let base = self.prepare_base(base, root.path())?;

        let name = flight_name(rover, first);
        let mut report = self
            .process_flight(&name, rover, telemetry, &base, root.path(), export)
            .await;

        report.warnings.splice(0..0, warnings);
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::{RinexBuilder, t, write_nav};

    #[test]
    fn test_flight_name() {
        assert_eq!(
            flight_name(
                Path::new("/data/rover.20o"),
                Path::new("/data/2020_07_22_f077_telemetry.txt")
            ),
            "rover_2020_07_22_f077_telemetry"
        );
        assert_eq!(short_name(Path::new("/data/rover.20o.gz")), "rover");
    }

    #[test]
    fn test_time_bounds_checks() {
        let rover = (t(10, 0, 0, 0), t(11, 0, 0, 0));
        let base = (t(9, 0, 0, 0), t(12, 0, 0, 0));
        let inside = (PathBuf::from("inside.txt"), (t(10, 10, 0, 0), t(10, 50, 0, 0)));

        assert!(check_time_bounds(rover, base, &[inside.clone()]).unwrap().is_empty());

        let late_base = (t(10, 30, 0, 0), t(10, 40, 0, 0));
        assert_eq!(
            check_time_bounds(rover, late_base, &[inside.clone()])
                .unwrap()
                .len(),
            2
        );

        let partial = (PathBuf::from("partial.txt"), (t(9, 50, 0, 0), t(11, 10, 0, 0)));
        assert_eq!(
            check_time_bounds(rover, base, &[inside, partial]).unwrap().len(),
            2
        );

        let after = (PathBuf::from("after.txt"), (t(11, 10, 0, 0), t(11, 20, 0, 0)));
        assert!(matches!(
            check_time_bounds(rover, base, &[after]),
            Err(Error::InputData(InputDataError::Telemetry(_)))
        ));

        let before = (PathBuf::from("before.txt"), (t(9, 10, 0, 0), t(9, 20, 0, 0)));
        assert!(check_time_bounds(rover, base, &[before]).is_err());
    }

    #[test]
    fn test_shrink() {
        let dir = tempfile::tempdir().unwrap();
        let rover = dir.path().join("rover.20o");
        write_nav(&dir.path().join("rover.20n"));

        RinexBuilder::new()
            .rover()
            .epochs(t(10, 0, 0, 0), 100)
            .event(t(10, 0, 5, 0))
            .write(&rover);

        let output_dir = dir.path().join("shrunk");
        std::fs::create_dir_all(&output_dir).unwrap();
        let output = output_dir.join("short.20o");

        let shrunk = shrink(
            &rover,
            &output,
            4,
            Duration::from_milliseconds(100.0),
            None,
        )
        .unwrap();

        assert!(shrunk.missed_events.is_empty());
        assert_eq!(shrunk.siblings, vec![output_dir.join("short.20n")]);
        assert!(output_dir.join("short.20n").exists());

        let content = std::fs::read_to_string(&output).unwrap();
        let events = content.lines().filter(|line| line.ends_with("  5  0")).count();
        assert_eq!(events, 1);

        // event epoch, 2 before and 2 after
        let epochs = content.lines().filter(|line| line.contains("G01G02")).count();
        assert_eq!(epochs, 5);
    }
}
