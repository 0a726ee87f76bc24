use std::sync::LazyLock;

use regex::Regex;

static DAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^20\d{2}_\d{2}_\d{2}_").unwrap());

static SHORT_DAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6,8}_").unwrap());

static FLIGHT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)_f[0-9]+(_|.)").unwrap());

static DRONE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_g((101)|(201)|(401))b\d{5}_").unwrap());

/// Flight description encoded in file names, like
/// "2016_09_15_Nadir_g101b10108_f001_1266.IMG":
/// date "2016_09_15", type "Nadir", drone "g101b10108", flight "f001".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FlightName {
    pub day: Option<String>,
    pub flight_type: Option<String>,
    pub drone_id: Option<String>,
    pub flight_id: Option<String>,
}

/// Drops the first and last characters of a match (delimiters)
fn inner(matched: &str) -> Option<String> {
    let mut chars = matched.chars();
    chars.next()?;
    chars.next_back()?;
    Some(chars.as_str().to_string())
}

impl FlightName {
    /// Parses a file name. Fields that cannot be identified are None.
    pub fn parse(name: &str) -> Self {
        let drone_id = DRONE_ID.find(name).and_then(|m| inner(m.as_str()));

        let day = DAY
            .find(name)
            .map(|m| m.as_str().trim_end_matches('_').to_string());

        let flight_type = match (&day, &drone_id) {
            (Some(day), Some(drone)) => {
                let pattern = format!("{}_(.+)_{}", regex::escape(day), regex::escape(drone));
                Regex::new(&pattern)
                    .ok()
                    .and_then(|re| {
                        re.captures(name)
                            .and_then(|caps| caps.get(1))
                            .map(|m| m.as_str().to_string())
                    })
                    .map(|flight_type| flight_type.trim_end_matches('_').to_string())
            },
            _ => None,
        };

        let day = day.or_else(|| {
            SHORT_DAY
                .find(name)
                .map(|m| m.as_str().trim_end_matches('_').to_string())
        });

        let flight_id = FLIGHT_NUMBER.find(name).and_then(|m| inner(m.as_str()));

        Self {
            day,
            flight_type,
            drone_id,
            flight_id,
        }
    }
}

#[cfg(test)]
mod test {
    use super::FlightName;

    #[test]
    fn test_camera_name() {
        let name = FlightName::parse("2016_09_15_Nadir_g101b10108_f001_1266.IMG");
        assert_eq!(name.day.as_deref(), Some("2016_09_15"));
        assert_eq!(name.flight_type.as_deref(), Some("Nadir"));
        assert_eq!(name.drone_id.as_deref(), Some("g101b10108"));
        assert_eq!(name.flight_id.as_deref(), Some("f001"));
    }

    #[test]
    fn test_telemetry_name() {
        let name = FlightName::parse("2020_07_22_reg36_g201b20395_F077_telemetry.txt");
        assert_eq!(name.day.as_deref(), Some("2020_07_22"));
        assert_eq!(name.flight_type.as_deref(), Some("reg36"));
        assert_eq!(name.drone_id.as_deref(), Some("g201b20395"));
        assert_eq!(name.flight_id.as_deref(), Some("F077"));

        let name = FlightName::parse("2020_07_22_reg36_g201b20395_f077.20o");
        assert_eq!(name.flight_id.as_deref(), Some("f077"));
    }

    #[test]
    fn test_partial_names() {
        let name = FlightName::parse("200722_flight_f12.txt");
        assert_eq!(name.day.as_deref(), Some("200722"));
        assert_eq!(name.flight_type, None);
        assert_eq!(name.drone_id, None);
        assert_eq!(name.flight_id.as_deref(), Some("f12"));

        assert_eq!(FlightName::parse("rover.20o"), FlightName::default());
    }
}
