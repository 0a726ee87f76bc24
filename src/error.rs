use thiserror::Error;

/// Errors related to the content of user input files.
/// They are fatal for the pipeline of the file they concern, never for a whole batch.
#[derive(Debug, Error)]
pub enum InputDataError {
    #[error("no time events in rover RINEX")]
    NoEvents,
    #[error("no epochs in rover RINEX")]
    NoEpochs,
    #[error("missing END OF HEADER")]
    MissingHeaderDelimiter,
    #[error("no time of first or last observation in RINEX")]
    NoTimeBounds,
    #[error("telemetry: {0}")]
    Telemetry(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("unknown satellite \"{0}\" in excluded satellites. Supported systems: GPS (G), Glonass (R)")]
    ExcludedSatellite(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("input data error: {0}")]
    InputData(#[from] InputDataError),
    #[error("pos file with computed result is empty")]
    IndexErrorInPosFile,
    #[error("telemetry time error: {0}")]
    TelemetryTime(String),
    #[error("solver failure: {0}")]
    Solver(String),
    #[error("solver did not produce \"{0}\"")]
    MissingSolution(String),
    #[error("reprojection error: {0}")]
    Reprojection(String),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("processing cancelled")]
    Cancelled,
}

impl InputDataError {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoEvents => "NoEvents",
            Self::NoEpochs => "NoEpochs",
            Self::MissingHeaderDelimiter
            | Self::NoTimeBounds
            | Self::Telemetry(_)
            | Self::InvalidValue(_)
            | Self::ExcludedSatellite(_) => "InputDataError",
        }
    }
}

impl Error {
    /// True when this [Error] is due to the user input data
    pub fn is_input_data_error(&self) -> bool {
        matches!(self, Self::InputData(_) | Self::TelemetryTime(_))
    }

    /// Short error name, as written in processing reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::Io(_) => "IoError",
            Self::InputData(e) => e.name(),
            Self::IndexErrorInPosFile => "IndexErrorInPosFile",
            Self::TelemetryTime(_) => "TelemetryTimeError",
            Self::Solver(_) => "SolverError",
            Self::MissingSolution(_) => "MissingSolution",
            Self::Reprojection(_) => "ReprojectionError",
            Self::Xml(_) => "XmlError",
            Self::Json(_) => "JsonError",
            Self::WalkDir(_) => "WalkDirError",
            Self::Config(_) => "ConfigError",
            Self::Cancelled => "Cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
