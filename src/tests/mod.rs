//! Synthetic flight data shared by unit tests
use std::path::Path;

use hifitime::prelude::{Duration, Epoch};

mod pipeline;

/// 2020-07-22 at given time of day
pub fn t(hour: u8, minute: u8, second: u8, millis: u32) -> Epoch {
    Epoch::from_gregorian_utc(2020, 7, 22, hour, minute, second, millis * 1_000_000)
}

fn seconds(t: Epoch) -> (i32, u8, u8, u8, u8, f64) {
    let (y, m, d, hh, mm, ss, ns) = t.to_gregorian_utc();
    (y, m, d, hh, mm, ss as f64 + ns as f64 * 1.0E-9)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Record {
    Epoch(Epoch),
    Event(Epoch),
}

impl Record {
    fn time(&self) -> Epoch {
        match self {
            Self::Epoch(t) | Self::Event(t) => *t,
        }
    }
}

/// Observation RINEX V2 generator
#[derive(Debug, Clone)]
pub struct RinexBuilder {
    rover: bool,
    time_bounds: bool,
    records: Vec<Record>,
}

impl RinexBuilder {
    pub fn new() -> Self {
        Self {
            rover: false,
            time_bounds: true,
            records: Vec::new(),
        }
    }

    /// Declares a kinematic session (first record flag 2)
    pub fn rover(mut self) -> Self {
        self.rover = true;
        self
    }

    pub fn without_time_bounds(mut self) -> Self {
        self.time_bounds = false;
        self
    }

    /// Adds `count` epochs at 10 Hz
    pub fn epochs(mut self, start: Epoch, count: usize) -> Self {
        for i in 0..count {
            let t = start + Duration::from_milliseconds(100.0 * i as f64);
            self.records.push(Record::Epoch(t));
        }
        self
    }

    pub fn epoch(mut self, t: Epoch) -> Self {
        self.records.push(Record::Epoch(t));
        self
    }

    pub fn event(mut self, t: Epoch) -> Self {
        self.records.push(Record::Event(t));
        self
    }

    fn sorted(&self) -> Vec<Record> {
        let mut records = self.records.clone();
        // events come first on equal time
        records.sort_by_key(|r| (r.time(), matches!(r, Record::Epoch(_))));
        records
    }

    pub fn lines(&self) -> Vec<String> {
        let records = self.sorted();
        let mut lines = Vec::new();

        lines.push(format!(
            "{:>9}{:11}{:<20}{:<20}{}\n",
            "2.11", "", "OBSERVATION DATA", "G (GPS)", "RINEX VERSION / TYPE"
        ));
        lines.push(format!("{:<60}{}\n", "synthetic flight", "COMMENT"));
        lines.push(format!(
            "{:<20}{:<20}{:<20}{}\n",
            "1234", "JAVRINGANT_DM   SCIS", "", "ANT # / TYPE"
        ));
        lines.push(format!(
            "{:>14.4}{:>14.4}{:>14.4}{:18}{}\n",
            0.1, 0.0, 0.0, "", "ANTENNA: DELTA H/E/N"
        ));
        lines.push(format!(
            "{:>6}{:>6}{:>6}{:42}{}\n",
            2, "C1", "L1", "", "# / TYPES OF OBSERV"
        ));

        if self.time_bounds {
            let epochs = records
                .iter()
                .filter_map(|r| match r {
                    Record::Epoch(t) => Some(*t),
                    _ => None,
                })
                .collect::<Vec<_>>();

            for (t, label) in [
                (epochs.first(), "TIME OF FIRST OBS"),
                (epochs.last(), "TIME OF LAST OBS"),
            ] {
                if let Some(t) = t {
                    let (y, m, d, hh, mm, ss) = seconds(*t);
                    lines.push(format!(
                        "{:>6}{:>6}{:>6}{:>6}{:>6}{:>13.7}{:5}{:<3}{:9}{}\n",
                        y, m, d, hh, mm, ss, "", "GPS", "", label
                    ));
                }
            }
        }

        lines.push(format!("{:60}{}\n", "", "END OF HEADER"));

        if self.rover {
            lines.push(format!("{:28}  2  0\n", ""));
        }

        for record in records {
            let (y, m, d, hh, mm, ss) = seconds(record.time());
            let date = format!(
                " {:02} {:>2} {:>2} {:>2} {:>2}{:>11.7}",
                y - 2000,
                m,
                d,
                hh,
                mm,
                ss
            );
            match record {
                Record::Epoch(_) => {
                    lines.push(format!("{}  0  2G01G02\n", date));
                    lines.push("  20000000.000 7  20000001.000 7\n".to_string());
                    lines.push("  21000000.000 7  21000001.000 7\n".to_string());
                },
                Record::Event(_) => {
                    lines.push(format!("{}  5  0\n", date));
                },
            }
        }

        lines
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.lines().concat()).unwrap();
    }
}

/// Writes a navigation file next to an observation file
pub fn write_nav(path: &Path) {
    std::fs::write(
        path,
        format!(
            "{:>9}{:11}{:<20}{:<20}{}\n{:60}{}\n",
            "2.11", "", "N: GPS NAV DATA", "", "RINEX VERSION / TYPE", "", "END OF HEADER"
        ),
    )
    .unwrap();
}

/// Writes a telemetry log with one image per event time
pub fn write_telemetry(path: &Path, events: &[Epoch]) {
    let mut content = String::from(
        "# Geoscan telemetry\n# file\tlat\tlon\taltGPS\troll\tpitch\tyaw\ttime\n",
    );

    for (i, t) in events.iter().enumerate() {
        let (y, m, d, hh, mm, ss, ns) = t.to_gregorian_utc();
        content.push_str(&format!(
            "IMG_{:04}.JPG\t55.{:06}\t37.{:06}\t{:.2}\t0.5\t-1.5\t{:.1}\t{:04}.{:02}.{:02} {:02}:{:02}:{:02}.{:03}\n",
            i + 1,
            100 + i,
            200 + i,
            150.0 + i as f64,
            90.0,
            y,
            m,
            d,
            hh,
            mm,
            ss,
            ns / 1_000_000
        ));
    }

    std::fs::write(path, content).unwrap();
}
