use std::{path::PathBuf, str::FromStr};

use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command, value_parser};
use hifitime::prelude::Epoch;

use crate::{
    error::{Error, Result},
    reproject::Crs,
    settings::Settings,
};

/// Operating mode, selected by subcommand
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// Discover and pair flight files
    Match {
        dir: PathBuf,
        base: Option<PathBuf>,
    },
    /// Process all flights of a directory against one base
    Batch {
        dir: PathBuf,
        base: PathBuf,
        export: PathBuf,
    },
    /// Process one flight
    Single {
        rover: PathBuf,
        base: PathBuf,
        telemetry: Vec<PathBuf>,
        export: PathBuf,
    },
    /// Shrink a rover RINEX around its events
    Shrink {
        rover: PathBuf,
        output: PathBuf,
        epochs: usize,
    },
    /// Cut a rover RINEX to a time window
    Cut {
        rover: PathBuf,
        output: PathBuf,
        start: Epoch,
        end: Epoch,
    },
}

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

fn base_arg(required: bool) -> Arg {
    Arg::new("base")
        .short('b')
        .long("base")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .required(required)
        .help("Base station observation RINEX. Navigation files sharing its name are used too.")
}

fn export_arg() -> Arg {
    Arg::new("export")
        .short('e')
        .long("export")
        .value_name("DIR")
        .value_parser(value_parser!(PathBuf))
        .required(true)
        .help("Output directory of merged references and reports")
}

fn rover_arg() -> Arg {
    Arg::new("rover")
        .short('r')
        .long("rover")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .required(true)
        .help("Rover observation RINEX, time events included. Gzip files must be terminated with '.gz'")
}

fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .required(true)
}

/// "2020-07-22T10:00:00 UTC"
fn parse_epoch(value: &str) -> std::result::Result<Epoch, String> {
    Epoch::from_str(value.trim()).map_err(|e| e.to_string())
}

fn time_arg(id: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .value_name("DATETIME")
        .value_parser(parse_epoch)
        .required(true)
}

fn dir_arg() -> Arg {
    Arg::new("dir")
        .value_name("DIR")
        .value_parser(value_parser!(PathBuf))
        .required(true)
        .help("Directory searched (recursively) for rover RINEX and telemetry logs")
}

impl Cli {
    /// Build new command line interface
    pub fn new() -> Self {
        Self {
            matches: Self::command().get_matches(),
        }
    }

    /// Command line interface from given arguments
    #[cfg(test)]
    pub fn from_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self {
            matches: Self::command().try_get_matches_from(args)?,
        })
    }

    fn command() -> Command {
        Command::new("ppk2ref")
            .version(env!("CARGO_PKG_VERSION"))
            .about("GNSS post processing of drone flights: camera reference from rover/base RINEX and telemetry")
            .color(ColorChoice::Always)
            .arg_required_else_help(true)
            .subcommand_required(true)
            .next_help_heading("Configuration")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .global(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("JSON settings file. Command line options override its content."),
            )
            .arg(
                Arg::new("quiet")
                    .short('q')
                    .long("quiet")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Only report warnings and errors"),
            )
            .next_help_heading("Solver")
            .arg(
                Arg::new("solver")
                    .long("solver")
                    .value_name("FILE")
                    .global(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("Solver executable. Default is \"rnx2rtkp\""),
            )
            .arg(
                Arg::new("template")
                    .short('t')
                    .long("template")
                    .value_name("FILE")
                    .global(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("Solver configuration template"),
            )
            .arg(
                Arg::new("antex")
                    .long("antex")
                    .value_name("FILE")
                    .global(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("IGS antenna calibration file (ANTEX)"),
            )
            .next_help_heading("Base station")
            .arg(
                Arg::new("base-position")
                    .long("base-position")
                    .value_name("N,E,H")
                    .global(true)
                    .allow_negative_numbers(true)
                    .value_delimiter(',')
                    .value_parser(value_parser!(f64))
                    .help("Base marker position: latitude, longitude (ddeg) and height (m),
or X, Y, Z (m) when --base-crs is geocentric"),
            )
            .arg(
                Arg::new("base-crs")
                    .long("base-crs")
                    .value_name("CRS")
                    .global(true)
                    .help("Coordinate system of the base position: EPSG::4326 (default) or EPSG::4978"),
            )
            .arg(
                Arg::new("antenna-height")
                    .long("antenna-height")
                    .value_name("METERS")
                    .global(true)
                    .allow_negative_numbers(true)
                    .value_parser(value_parser!(f64))
                    .help("Base antenna height. Read from the base RINEX header by default"),
            )
            .arg(
                Arg::new("antenna-type")
                    .long("antenna-type")
                    .value_name("MODEL")
                    .global(true)
                    .help("Base antenna model. Read from the base RINEX header by default"),
            )
            .next_help_heading("Processing")
            .arg(
                Arg::new("elevation-mask")
                    .long("elevation-mask")
                    .value_name("DEGREES")
                    .global(true)
                    .value_parser(value_parser!(f64))
                    .help("Elevation mask. Default is 15°"),
            )
            .arg(
                Arg::new("glonass")
                    .long("glonass")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Use Glonass on top of GPS"),
            )
            .arg(
                Arg::new("exclude")
                    .long("exclude")
                    .value_name("SV")
                    .global(true)
                    .help("Excluded satellites, for example \"G01,R05\""),
            )
            .arg(
                Arg::new("obs-frequency")
                    .long("obs-frequency")
                    .value_name("SECONDS")
                    .global(true)
                    .value_parser(value_parser!(f64))
                    .help("Rover observation period. Default is 0.1 s"),
            )
            .arg(
                Arg::new("epochs-buffer")
                    .long("epochs-buffer")
                    .value_name("N")
                    .global(true)
                    .value_parser(value_parser!(usize))
                    .help("Only keep N epochs before and after each event in the rover RINEX"),
            )
            .arg(
                Arg::new("threshold")
                    .long("threshold")
                    .value_name("PERCENT")
                    .global(true)
                    .value_parser(value_parser!(f64))
                    .help("Fix quality that stops the search for a better strategy. Default is 95 %"),
            )
            .arg(
                Arg::new("workers")
                    .short('j')
                    .long("workers")
                    .value_name("N")
                    .global(true)
                    .value_parser(value_parser!(usize))
                    .help("Concurrent flights. Default is the number of cores"),
            )
            .next_help_heading("Merged references")
            .arg(
                Arg::new("no-telemetry-coordinates")
                    .long("no-telemetry-coordinates")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Drop cameras without solution, instead of using their telemetry coordinates"),
            )
            .arg(
                Arg::new("keep-extension")
                    .long("keep-extension")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Keep image file extensions in camera labels"),
            )
            .arg(
                Arg::new("crs")
                    .long("crs")
                    .value_name("CRS")
                    .global(true)
                    .help("Coordinate system of merged references: EPSG::4326 (default) or EPSG::4978"),
            )
            .next_help_heading("Matching")
            .arg(
                Arg::new("loose")
                    .long("loose")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Any time overlap pairs a telemetry log with a rover session,
instead of full containment"),
            )
            .arg(
                Arg::new("ignore-names")
                    .long("ignore-names")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Do not compare flight descriptions encoded in file names"),
            )
            .subcommand(
                Command::new("match")
                    .about("Pair rover RINEX and telemetry logs, report missed files")
                    .arg(dir_arg())
                    .arg(base_arg(false)),
            )
            .subcommand(
                Command::new("batch")
                    .about("Process all flights of a directory against one base station")
                    .arg(dir_arg())
                    .arg(base_arg(true))
                    .arg(export_arg()),
            )
            .subcommand(
                Command::new("single")
                    .about("Process one flight")
                    .arg(rover_arg())
                    .arg(base_arg(true))
                    .arg(
                        Arg::new("telemetry")
                            .long("telemetry")
                            .value_name("FILE")
                            .action(ArgAction::Append)
                            .value_parser(value_parser!(PathBuf))
                            .required(true)
                            .help("Telemetry log. Use twice for two cameras sharing one flight."),
                    )
                    .arg(export_arg()),
            )
            .subcommand(
                Command::new("shrink")
                    .about("Shrink a rover RINEX around its time events")
                    .arg(rover_arg())
                    .arg(
                        output_arg()
                            .help("Shrunk RINEX. Sibling navigation files are copied next to it."),
                    )
                    .arg(
                        Arg::new("epochs")
                            .long("epochs")
                            .value_name("N")
                            .value_parser(value_parser!(usize))
                            .default_value("10")
                            .help("Epochs kept per event"),
                    ),
            )
            .subcommand(
                Command::new("cut")
                    .about("Cut a rover RINEX to a time window, time events included")
                    .arg(rover_arg())
                    .arg(output_arg().help("Cut RINEX"))
                    .arg(time_arg("start").help("First epoch kept, like \"2020-07-22T10:00:00 UTC\""))
                    .arg(time_arg("end").help("Last epoch kept")),
            )
    }

    pub fn quiet(&self) -> bool {
        self.matches.get_flag("quiet")
    }

    fn path(matches: &ArgMatches, id: &str) -> Result<PathBuf> {
        matches
            .get_one::<PathBuf>(id)
            .cloned()
            .ok_or_else(|| Error::Config(format!("missing \"{}\"", id)))
    }

    /// Selected [Mode]
    pub fn mode(&self) -> Result<Mode> {
        match self.matches.subcommand() {
            Some(("match", matches)) => Ok(Mode::Match {
                dir: Self::path(matches, "dir")?,
                base: matches.get_one::<PathBuf>("base").cloned(),
            }),
            Some(("batch", matches)) => Ok(Mode::Batch {
                dir: Self::path(matches, "dir")?,
                base: Self::path(matches, "base")?,
                export: Self::path(matches, "export")?,
            }),
            Some(("single", matches)) => {
                let telemetry = matches
                    .get_many::<PathBuf>("telemetry")
                    .map(|paths| paths.cloned().collect::<Vec<_>>())
                    .unwrap_or_default();

                if telemetry.len() > 2 {
                    return Err(Error::Config(
                        "at most two telemetry files are supported".to_string(),
                    ));
                }

                Ok(Mode::Single {
                    rover: Self::path(matches, "rover")?,
                    base: Self::path(matches, "base")?,
                    export: Self::path(matches, "export")?,
                    telemetry,
                })
            },
            Some(("shrink", matches)) => Ok(Mode::Shrink {
                rover: Self::path(matches, "rover")?,
                output: Self::path(matches, "output")?,
                epochs: matches.get_one::<usize>("epochs").copied().unwrap_or(10),
            }),
            Some(("cut", matches)) => {
                let time = |id: &str| {
                    matches
                        .get_one::<Epoch>(id)
                        .copied()
                        .ok_or_else(|| Error::Config(format!("missing \"{}\"", id)))
                };

                let (start, end) = (time("start")?, time("end")?);
                if start > end {
                    return Err(Error::Config("time window ends before it starts".to_string()));
                }

                Ok(Mode::Cut {
                    rover: Self::path(matches, "rover")?,
                    output: Self::path(matches, "output")?,
                    start,
                    end,
                })
            },
            _ => Err(Error::Config("unknown command".to_string())),
        }
    }

    /// Subcommand arguments, where global options are stored
    fn active(&self) -> &ArgMatches {
        self.matches
            .subcommand()
            .map(|(_, matches)| matches)
            .unwrap_or(&self.matches)
    }

    /// [Settings] from the configuration file (if any), overridden by the command line
    pub fn settings(&self) -> Result<Settings> {
        let matches = self.active();

        let mut settings = match matches.get_one::<PathBuf>("config") {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        if let Some(solver) = matches.get_one::<PathBuf>("solver") {
            settings.solver = solver.clone();
        }
        if let Some(template) = matches.get_one::<PathBuf>("template") {
            settings.template = Some(template.clone());
        }
        if let Some(antex) = matches.get_one::<PathBuf>("antex") {
            settings.antenna_calibration = Some(antex.clone());
        }

        if let Some(position) = matches.get_many::<f64>("base-position") {
            let position = position.copied().collect::<Vec<_>>();
            let [north, east, height] = position[..] else {
                return Err(Error::Config(format!(
                    "base position requires 3 coordinates, got {}",
                    position.len()
                )));
            };
            settings.base_position = Some([north, east, height]);
        }
        if let Some(crs) = matches.get_one::<String>("base-crs") {
            settings.base_crs = Crs::from_str(crs)?;
        }
        if let Some(height) = matches.get_one::<f64>("antenna-height") {
            settings.antenna_height = Some(*height);
        }
        if let Some(model) = matches.get_one::<String>("antenna-type") {
            settings.antenna_type = Some(model.clone());
        }

        if let Some(mask) = matches.get_one::<f64>("elevation-mask") {
            settings.elevation_mask = *mask;
        }
        if matches.get_flag("glonass") {
            settings.glonass = true;
        }
        if let Some(excluded) = matches.get_one::<String>("exclude") {
            settings.excluded_sats = excluded.clone();
        }
        if let Some(frequency) = matches.get_one::<f64>("obs-frequency") {
            settings.obs_frequency = *frequency;
        }
        if let Some(buffer) = matches.get_one::<usize>("epochs-buffer") {
            settings.epochs_buffer = Some(*buffer);
        }
        if let Some(threshold) = matches.get_one::<f64>("threshold") {
            settings.quality_threshold = *threshold;
        }
        if let Some(workers) = matches.get_one::<usize>("workers") {
            settings.workers = Some(*workers);
        }

        if matches.get_flag("no-telemetry-coordinates") {
            settings.use_telemetry_coordinates = false;
        }
        if matches.get_flag("keep-extension") {
            settings.keep_extension = true;
        }
        if let Some(crs) = matches.get_one::<String>("crs") {
            settings.crs = Crs::from_str(crs)?;
        }

        if matches.get_flag("loose") {
            settings.matching.strict = false;
        }
        if matches.get_flag("ignore-names") {
            settings.matching.refine_by_name = false;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_modes() {
        let cli = Cli::from_args(["ppk2ref", "match", "/data", "--base", "/data/base.20o"]).unwrap();
        assert_eq!(
            cli.mode().unwrap(),
            Mode::Match {
                dir: PathBuf::from("/data"),
                base: Some(PathBuf::from("/data/base.20o")),
            }
        );

        let cli = Cli::from_args([
            "ppk2ref",
            "single",
            "-r",
            "rover.20o",
            "-b",
            "base.20o",
            "--telemetry",
            "a_telemetry.txt",
            "--telemetry",
            "b_telemetry.txt",
            "-e",
            "export",
        ])
        .unwrap();

        match cli.mode().unwrap() {
            Mode::Single { telemetry, .. } => assert_eq!(telemetry.len(), 2),
            mode => panic!("unexpected mode {:?}", mode),
        }

        let cli = Cli::from_args(["ppk2ref", "shrink", "-r", "rover.20o", "-o", "short.20o"]).unwrap();
        assert_eq!(
            cli.mode().unwrap(),
            Mode::Shrink {
                rover: PathBuf::from("rover.20o"),
                output: PathBuf::from("short.20o"),
                epochs: 10,
            }
        );

        let cli = Cli::from_args([
            "ppk2ref",
            "cut",
            "-r",
            "rover.20o",
            "-o",
            "cut.20o",
            "--start",
            "2020-07-22T10:00:00 UTC",
            "--end",
            "2020-07-22T10:30:00 UTC",
        ])
        .unwrap();

        match cli.mode().unwrap() {
            Mode::Cut { start, end, .. } => {
                assert_eq!(start, Epoch::from_gregorian_utc_hms(2020, 7, 22, 10, 0, 0));
                assert_eq!(end, Epoch::from_gregorian_utc_hms(2020, 7, 22, 10, 30, 0));
            },
            mode => panic!("unexpected mode {:?}", mode),
        }

        assert!(Cli::from_args(["ppk2ref", "batch", "/data"]).is_err());
        assert!(
            Cli::from_args([
                "ppk2ref", "cut", "-r", "rover.20o", "-o", "cut.20o", "--start", "noon", "--end",
                "2020-07-22T10:30:00 UTC",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_settings_overrides() {
        let cli = Cli::from_args([
            "ppk2ref",
            "batch",
            "/data",
            "-b",
            "base.20o",
            "-e",
            "export",
            "--base-position",
            "55.5,-37.25,150.0",
            "--antenna-height",
            "1.5",
            "--glonass",
            "--exclude",
            "G01,R05",
            "--crs",
            "EPSG::4978",
            "--loose",
            "-j",
            "2",
        ])
        .unwrap();

        let settings = cli.settings().unwrap();
        assert_eq!(settings.base_position, Some([55.5, -37.25, 150.0]));
        assert_eq!(settings.antenna_height, Some(1.5));
        assert!(settings.glonass);
        assert_eq!(settings.excluded_sats().unwrap().len(), 2);
        assert_eq!(settings.crs, Crs::Ecef);
        assert!(!settings.matching.strict);
        assert_eq!(settings.workers, Some(2));

        let cli = Cli::from_args([
            "ppk2ref",
            "shrink",
            "-r",
            "rover.20o",
            "-o",
            "short.20o",
            "--base-position",
            "55.5,37.25",
        ])
        .unwrap();
        assert!(cli.settings().is_err());
    }
}
