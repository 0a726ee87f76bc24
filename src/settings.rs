use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use gnss::prelude::SV;
use hifitime::prelude::Duration;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, InputDataError, Result},
    matching::MatchSettings,
    merge::MergeOptions,
    reproject::{Crs, Geodetic, Point},
    solver::{BaseStation, ProcessingParameters, parse_excluded_sats},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Solver executable
    pub solver: PathBuf,

    /// Solver configuration template
    pub template: Option<PathBuf>,

    /// IGS antenna calibration (ANTEX) file
    pub antenna_calibration: Option<PathBuf>,

    /// Base marker position in `base_crs`:
    /// north, east, height for geographic systems, X, Y, Z for geocentric ones.
    pub base_position: Option<[f64; 3]>,

    pub base_crs: Crs,

    /// Base antenna height (m), read from the base RINEX when missing
    pub antenna_height: Option<f64>,

    /// Base antenna model, read from the base RINEX when missing
    pub antenna_type: Option<String>,

    /// Elevation mask (degrees)
    pub elevation_mask: f64,

    /// Use Glonass on top of GPS
    pub glonass: bool,

    /// Excluded satellites, like "G01, R05"
    pub excluded_sats: String,

    /// Rover observation period (s)
    pub obs_frequency: f64,

    /// Number of epochs kept around each event.
    /// The whole rover session is kept when None.
    pub epochs_buffer: Option<usize>,

    /// Fix quality (%) that stops the search for a better strategy
    pub quality_threshold: f64,

    /// Concurrent flights, defaults to the number of cores
    pub workers: Option<usize>,

    /// Use telemetry coordinates when no solution is found
    pub use_telemetry_coordinates: bool,

    /// Keep the image file extension in camera labels
    pub keep_extension: bool,

    /// Coordinate system of the merged products
    pub crs: Crs,

    pub matching: MatchSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            solver: PathBuf::from("rnx2rtkp"),
            template: None,
            antenna_calibration: None,
            base_position: None,
            base_crs: Crs::Wgs84,
            antenna_height: None,
            antenna_type: None,
            elevation_mask: 15.0,
            glonass: false,
            excluded_sats: String::new(),
            obs_frequency: 0.1,
            epochs_buffer: None,
            quality_threshold: 95.0,
            workers: None,
            use_telemetry_coordinates: true,
            keep_extension: false,
            crs: Crs::Wgs84,
            matching: MatchSettings::default(),
        }
    }
}

impl Settings {
    /// Loads [Settings] from a JSON file. Missing fields take default values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let fd = File::open(path)?;
        let settings: Self = serde_json::from_reader(BufReader::new(fd))?;
        debug!("{} - settings loaded", path.display());
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects inconsistent values
    pub fn validate(&self) -> Result<()> {
        if !(self.obs_frequency > 0.0 && self.obs_frequency.is_finite()) {
            return Err(Error::Config(format!(
                "invalid observation frequency {}",
                self.obs_frequency
            )));
        }

        if !(0.0..=100.0).contains(&self.quality_threshold) {
            return Err(Error::Config(format!(
                "invalid quality threshold {}",
                self.quality_threshold
            )));
        }

        if !(0.0..90.0).contains(&self.elevation_mask) {
            return Err(Error::Config(format!(
                "invalid elevation mask {}",
                self.elevation_mask
            )));
        }

        if self.workers == Some(0) {
            return Err(Error::Config("at least one worker is required".to_string()));
        }

        self.excluded_sats()?;
        Ok(())
    }

    pub fn obs_frequency(&self) -> Duration {
        Duration::from_seconds(self.obs_frequency)
    }

    pub fn excluded_sats(&self) -> Result<Vec<SV>> {
        parse_excluded_sats(&self.excluded_sats)
    }

    /// Number of concurrent flights
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Base station description. Antenna height and model fall back
    /// to the values found in the base RINEX header.
    pub fn base_station(
        &self,
        header_height: Option<f64>,
        header_type: Option<String>,
    ) -> Result<BaseStation> {
        let [north, east, height] = self.base_position.ok_or_else(|| {
            InputDataError::InvalidValue("base station position is missing".to_string())
        })?;

        let position = match self.base_crs {
            Crs::Wgs84 => Point::geographic(north, east, height),
            Crs::Ecef => Point::new(north, east, height),
        };

        let antenna_height = self.antenna_height.or(header_height).ok_or_else(|| {
            InputDataError::InvalidValue("base antenna height is missing".to_string())
        })?;

        if !antenna_height.is_finite() {
            return Err(InputDataError::InvalidValue(format!(
                "base antenna height {}",
                antenna_height
            ))
            .into());
        }

        Ok(BaseStation {
            position,
            crs: self.base_crs,
            antenna_height,
            antenna_type: self
                .antenna_type
                .clone()
                .or(header_type)
                .unwrap_or_default(),
        })
    }

    /// Options written into the solver configuration
    pub fn processing_parameters(&self, base: &BaseStation) -> Result<ProcessingParameters> {
        Ok(ProcessingParameters {
            base: base.antenna_position(&Geodetic)?,
            antenna_type: base.antenna_type.clone(),
            elevation_mask: self.elevation_mask,
            glonass: self.glonass,
            excluded_sats: self.excluded_sats()?,
        })
    }

    /// Solutions are expressed in WGS84 and reprojected to `crs`
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            use_telemetry_coordinates: self.use_telemetry_coordinates,
            keep_extension: self.keep_extension,
            reprojection: Some((Crs::Wgs84, self.crs)),
            obs_frequency: self.obs_frequency(),
        }
    }
}
