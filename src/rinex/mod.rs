//! Observation RINEX handling: line grammar, header, body and sibling files.
//! Content is processed line by line and copied verbatim, never reformatted.
mod files;
mod line;
mod meta;
mod parser;

pub use files::copy_rinex;
pub use meta::{header_time_bounds, read_antenna_height, read_antenna_type};
pub use parser::{EventRecord, RinexParser, default_obs_frequency};
