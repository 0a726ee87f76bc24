//! Merges solved positions with telemetry logs.
use hifitime::prelude::{Duration, Epoch};
use log::{debug, warn};
use serde::Serialize;

use crate::{
    error::Result,
    index::TimeIndex,
    pos::{PosParser, Position},
    reproject::{Crs, Geodetic, Point, Reproject},
    rinex::default_obs_frequency,
    telemetry::{Telemetry, TelemetryPosition},
    utils::floor_to_grid,
};

mod output;

pub use output::{write_merged_txt, write_merged_xml};

/// Origin of the coordinates of a [MergedRecord]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Source {
    /// Solution at the event time
    Solution,
    /// Interpolated between the two solutions surrounding the event
    Interpolation,
    /// Navigation grade telemetry coordinates
    Telemetry,
}

/// Solution accuracy of a [MergedRecord]
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Accuracy {
    pub quality: u8,
    pub sdn: f64,
    pub sde: f64,
    pub sdu: f64,
}

impl From<&Position> for Accuracy {
    fn from(position: &Position) -> Self {
        Self {
            quality: position.quality,
            sdn: position.sdn,
            sde: position.sde,
            sdu: position.sdu,
        }
    }
}

/// One camera of the reference file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    /// Camera label
    pub name: String,

    /// Coordinates, in the target CRS
    pub point: Point,

    /// Attitude, from telemetry
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,

    /// None for telemetry coordinates
    pub accuracy: Option<Accuracy>,

    /// Camera event time
    pub time: Epoch,

    pub source: Source,
}

impl MergedRecord {
    /// True when coordinates do not come from a solution
    pub fn is_navigation_only(&self) -> bool {
        self.source == Source::Telemetry
    }
}

/// Merge result
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergedReference {
    /// One record per retained telemetry entry, in telemetry order
    pub records: Vec<MergedRecord>,

    /// Share of fixed solutions (%)
    pub quality: f64,

    /// CRS of the coordinates, when reprojected
    pub crs: Option<Crs>,
}

impl MergedReference {
    /// Labels of cameras using telemetry coordinates
    pub fn navigation_only(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|rec| rec.is_navigation_only())
            .map(|rec| rec.name.as_str())
            .collect()
    }
}

#[derive(Debug, Copy, Clone)]
pub struct MergeOptions {
    /// Use telemetry coordinates when no solution is found
    pub use_telemetry_coordinates: bool,

    /// Keep the image file extension in camera labels
    pub keep_extension: bool,

    /// (source, target) reprojection
    pub reprojection: Option<(Crs, Crs)>,

    /// Solution grid period, used for interpolation
    pub obs_frequency: Duration,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            use_telemetry_coordinates: true,
            keep_extension: false,
            reprojection: None,
            obs_frequency: default_obs_frequency(),
        }
    }
}

fn round_decimals(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Linear interpolation between the grid solutions surrounding `t`.
/// Accuracy is the worst of both.
pub fn interpolate_position(
    solutions: &TimeIndex<Position>,
    t: Epoch,
    step: Duration,
) -> Option<Position> {
    let before_t = floor_to_grid(t, step);
    let after_t = before_t + step;

    let before = solutions.get(before_t)?;
    let after = solutions.get(after_t)?;

    let weight = (t - before_t).to_seconds() / step.to_seconds();
    let lerp = |a: f64, b: f64| a + (b - a) * weight;

    Some(Position {
        lat: round_decimals(lerp(before.lat, after.lat), 9),
        lon: round_decimals(lerp(before.lon, after.lon), 9),
        height: round_decimals(lerp(before.height, after.height), 3),
        quality: before.quality.max(after.quality),
        sdn: before.sdn.max(after.sdn),
        sde: before.sde.max(after.sde),
        sdu: before.sdu.max(after.sdu),
    })
}

/// Joins solutions and telemetry, telemetry being the driving sequence.
pub struct PositionMerger<R: Reproject = Geodetic> {
    options: MergeOptions,
    reprojector: R,
}

impl PositionMerger<Geodetic> {
    /// Builds new [PositionMerger] using [Geodetic] reprojections
    pub fn new(options: MergeOptions) -> Self {
        Self::with_reprojector(options, Geodetic)
    }
}

impl<R: Reproject> PositionMerger<R> {
    pub fn with_reprojector(options: MergeOptions, reprojector: R) -> Self {
        Self {
            options,
            reprojector,
        }
    }

    fn point(&self, lat: f64, lon: f64, height: f64) -> Result<Point> {
        let point = Point::geographic(lat, lon, height);
        match self.options.reprojection {
            Some((source, target)) => self.reprojector.reproject(point, source, target),
            None => Ok(point),
        }
    }

    fn label(&self, entry: &TelemetryPosition) -> String {
        if self.options.keep_extension {
            entry.name.clone()
        } else {
            entry.name.split('.').next().unwrap_or_default().to_string()
        }
    }

    /// Merges one solution with one telemetry log.
    /// Each entry is resolved in order: exact solution (±1 ms), interpolation,
    /// telemetry coordinates (when allowed), or dropped.
    pub fn merge(
        &self,
        solutions: &PosParser,
        telemetry: &Telemetry,
        silently: bool,
    ) -> Result<MergedReference> {
        let mut records = Vec::with_capacity(telemetry.len());

        for (t, entry) in telemetry.entries.iter() {
            let name = self.label(entry);

            let resolved = match solutions.position(*t) {
                Some(position) => Some((*position, Source::Solution)),
                None => interpolate_position(&solutions.positions, *t, self.options.obs_frequency)
                    .map(|position| (position, Source::Interpolation)),
            };

            let (point, accuracy, source) = match resolved {
                Some((position, source)) => (
                    self.point(position.lat, position.lon, position.height),
                    Some(Accuracy::from(&position)),
                    source,
                ),
                None if self.options.use_telemetry_coordinates => {
                    if !silently {
                        warn!(
                            "{}: no solution, navigation coordinates used in merged file",
                            name
                        );
                    }
                    (
                        self.point(entry.lat, entry.lon, entry.height),
                        None,
                        Source::Telemetry,
                    )
                },
                None => {
                    if !silently {
                        warn!("{}: no solution, camera excluded", name);
                    }
                    continue;
                },
            };

            let point = match point {
                Ok(point) => point,
                Err(e) => {
                    warn!("{}: {}, camera excluded", name, e);
                    continue;
                },
            };

            records.push(MergedRecord {
                point,
                accuracy,
                roll: entry.roll,
                pitch: entry.pitch,
                yaw: entry.yaw,
                time: *t,
                source,
                name,
            });
        }

        debug!(
            "{} - {} cameras merged",
            telemetry.path.display(),
            records.len()
        );

        Ok(MergedReference {
            records,
            quality: solutions.quality,
            crs: self.options.reprojection.map(|(_, target)| target),
        })
    }
}
