//! Solver configuration, rewritten from a template for each run.
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    str::FromStr,
    sync::LazyLock,
};

use gnss::prelude::{Constellation, SV};
use itertools::Itertools;
use log::debug;
use regex::Regex;

use crate::{
    error::{InputDataError, Result},
    reproject::{Crs, Point, Reproject},
    solver::SolutionType,
};

static ANY_VALUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"=.*").unwrap());

static NON_EMPTY_VALUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"=.+").unwrap());

static NUMERIC_VALUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"=\d+").unwrap());

/// Navigation system mask: GPS
const NAVSYS_GPS: u8 = 1;

/// Navigation system mask: Glonass
const NAVSYS_GLONASS: u8 = 4;

/// Base station, as described by the user
#[derive(Debug, Clone, PartialEq)]
pub struct BaseStation {
    /// Marker position (north, east, height) in `crs`
    pub position: Point,

    pub crs: Crs,

    /// Antenna height above the marker (m)
    pub antenna_height: f64,

    /// Antenna model
    pub antenna_type: String,
}

impl BaseStation {
    /// WGS84 antenna position: reprojected marker, raised by the antenna height
    pub fn antenna_position<R: Reproject>(&self, reprojector: &R) -> Result<Point> {
        let mut point = reprojector.reproject(self.position, self.crs, Crs::Wgs84)?;
        point.z += self.antenna_height;
        Ok(point)
    }
}

/// Parses a list of excluded satellites, like "G01, R05 G12".
/// Only GPS and Glonass vehicles are supported.
pub fn parse_excluded_sats(list: &str) -> Result<Vec<SV>> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(|item| {
            let invalid = || InputDataError::ExcludedSatellite(item.to_string());

            if !item.is_ascii() || item.len() < 2 {
                return Err(invalid().into());
            }

            let sv = SV::from_str(item).map_err(|_| invalid())?;

            match sv.constellation {
                Constellation::GPS | Constellation::Glonass => Ok(sv),
                _ => Err(invalid().into()),
            }
        })
        .collect()
}

/// Options written into the solver configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingParameters {
    /// WGS84 base antenna position
    pub base: Point,

    /// Base antenna model
    pub antenna_type: String,

    /// Elevation mask (degrees)
    pub elevation_mask: f64,

    /// Use Glonass on top of GPS
    pub glonass: bool,

    pub excluded_sats: Vec<SV>,
}

impl ProcessingParameters {
    fn navsys(&self) -> u8 {
        if self.glonass {
            NAVSYS_GPS + NAVSYS_GLONASS
        } else {
            NAVSYS_GPS
        }
    }

    fn excluded_sats(&self) -> String {
        self.excluded_sats.iter().map(|sv| sv.to_string()).join(" ")
    }

    /// Rewrites one template line
    fn rewrite(&self, line: &str, solution: SolutionType, antex: Option<&Path>) -> String {
        let set = |re: &Regex, value: &str| re.replace(line, format!("={}", value)).to_string();

        if line.contains("pos1-soltype") {
            solution.config_line()
        } else if line.contains("pos1-elmask") {
            set(&NON_EMPTY_VALUE, &self.elevation_mask.to_string())
        } else if line.contains("pos1-navsys") {
            set(&NUMERIC_VALUE, &self.navsys().to_string())
        } else if line.contains("pos1-exclsats") {
            set(&ANY_VALUE, &self.excluded_sats())
        } else if line.contains("ant2-pos1") {
            set(&ANY_VALUE, &self.base.y.to_string())
        } else if line.contains("ant2-pos2") {
            set(&ANY_VALUE, &self.base.x.to_string())
        } else if line.contains("ant2-pos3") {
            set(&ANY_VALUE, &self.base.z.to_string())
        } else if line.contains("ant2-antdelu") {
            set(&ANY_VALUE, "0")
        } else if line.contains("ant2-anttype") {
            set(&ANY_VALUE, &self.antenna_type)
        } else if line.contains("file-rcvantfile") {
            match antex {
                Some(antex) => format!("file-rcvantfile    ={}\n", antex.display()),
                None => line.to_string(),
            }
        } else {
            line.to_string()
        }
    }
}

/// Writes a solver configuration from a template, for one solution strategy
pub fn create_configuration_file(
    template: &Path,
    output: &Path,
    solution: SolutionType,
    parameters: &ProcessingParameters,
    antex: Option<&Path>,
) -> Result<()> {
    let mut reader = BufReader::new(File::open(template)?);
    let mut writer = BufWriter::new(File::create(output)?);

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }

        let (content, ending) = match line.strip_suffix('\n') {
            Some(content) => (content, "\n"),
            None => (line.as_str(), ""),
        };

        let rewritten = parameters.rewrite(content, solution, antex);
        writer.write_all(rewritten.as_bytes())?;

        if !rewritten.ends_with('\n') {
            writer.write_all(ending.as_bytes())?;
        }
    }

    writer.flush()?;
    debug!("{} - {} configuration", output.display(), solution);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reproject::Geodetic;

    const TEMPLATE: &str = "\
# rtkpost options
pos1-posmode       =kinematic  # (0:single,1:dgps,2:kinematic)
pos1-soltype       =forward    # (0:forward,1:backward,2:combined)
pos1-elmask        =10         # (deg)
pos1-navsys        =1          # (1:gps+2:sbas+4:glo)
pos1-exclsats      =           # (prn ...)
ant2-postype       =llh
ant2-pos1          =0          # (deg|m)
ant2-pos2          =0          # (deg|m)
ant2-pos3          =0          # (m|m)
ant2-anttype       =
ant2-antdelu       =0.5        # (m)
file-rcvantfile    =
";

    fn parameters() -> ProcessingParameters {
        ProcessingParameters {
            base: Point::geographic(55.5, 37.25, 151.5),
            antenna_type: "JAVRINGANT_DM".to_string(),
            elevation_mask: 15.0,
            glonass: true,
            excluded_sats: parse_excluded_sats("G01, R05").unwrap(),
        }
    }

    #[test]
    fn test_excluded_sats() {
        let sats = parse_excluded_sats("G01,R05 G12").unwrap();
        assert_eq!(
            sats,
            vec![
                SV::new(Constellation::GPS, 1),
                SV::new(Constellation::Glonass, 5),
                SV::new(Constellation::GPS, 12)
            ]
        );

        assert!(parse_excluded_sats("").unwrap().is_empty());
        assert!(parse_excluded_sats("E01").is_err());
        assert!(parse_excluded_sats("G").is_err());
        assert!(parse_excluded_sats("Gxx").is_err());
    }

    #[test]
    fn test_base_station() {
        let base = BaseStation {
            position: Point::geographic(55.5, 37.25, 150.0),
            crs: Crs::Wgs84,
            antenna_height: 1.5,
            antenna_type: "JAVRINGANT_DM".to_string(),
        };

        let position = base.antenna_position(&Geodetic).unwrap();
        assert_eq!(position, Point::geographic(55.5, 37.25, 151.5));
    }

    #[test]
    fn test_configuration_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.conf");
        let output = dir.path().join("backward.conf");
        std::fs::write(&template, TEMPLATE).unwrap();

        create_configuration_file(
            &template,
            &output,
            SolutionType::Backward,
            &parameters(),
            Some(Path::new("/data/igs14.atx")),
        )
        .unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        let lines = content.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), TEMPLATE.lines().count());
        assert_eq!(lines[0], "# rtkpost options");
        assert_eq!(lines[1], "pos1-posmode       =kinematic  # (0:single,1:dgps,2:kinematic)");
        assert_eq!(lines[2], "pos1-soltype       =backward");
        assert_eq!(lines[3], "pos1-elmask        =15");
        assert_eq!(lines[4], "pos1-navsys        =5          # (1:gps+2:sbas+4:glo)");
        assert_eq!(lines[5], "pos1-exclsats      =G01 R05");
        assert_eq!(lines[7], "ant2-pos1          =55.5");
        assert_eq!(lines[8], "ant2-pos2          =37.25");
        assert_eq!(lines[9], "ant2-pos3          =151.5");
        assert_eq!(lines[10], "ant2-anttype       =JAVRINGANT_DM");
        assert_eq!(lines[11], "ant2-antdelu       =0");
        assert_eq!(lines[12], "file-rcvantfile    =/data/igs14.atx");
    }
}
