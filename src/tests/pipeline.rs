//! Rover and base RINEX, telemetry and a stand-in solver, end to end
#![cfg(unix)]

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    matching::{MatchSettings, find_flights_data, find_matches_by_time_bounds},
    processing::Processor,
    runtime::Runtime,
    settings::Settings,
    tests::{RinexBuilder, t, write_nav, write_telemetry},
};

/// Writes one fixed solution per time event found in the rover file (11th argument)
const SOLVER: &str = r#"#!/bin/sh
out="$4"
events="${out%.pos}_events.pos"
echo "% program   : stand-in solver" > "$out"
echo "% program   : stand-in solver" > "$events"
awk '$7 == 5 && NF == 8 {
    printf "20%s/%02d/%02d %02d:%02d:%06.3f %14.9f %14.9f %10.4f %3d %3d %8.4f %8.4f %8.4f %8.4f %8.4f %8.4f %6.2f %6.1f\n",
        $1, $2, $3, $4, $5, $6, 55.5, 37.25, 150.0, 1, 8, 0.01, 0.02, 0.03, 0, 0, 0, 0.0, 999.9
}' "${11}" >> "$events"
cat "$events" >> "$out"
"#;

const TEMPLATE: &str = "\
pos1-posmode       =kinematic
pos1-soltype       =forward
pos1-elmask        =10
pos1-navsys        =1
pos1-exclsats      =
ant2-pos1          =0
ant2-pos2          =0
ant2-pos3          =0
ant2-anttype       =
ant2-antdelu       =0
";

struct Flight {
    _dir: tempfile::TempDir,
    data: PathBuf,
    rover: PathBuf,
    base: PathBuf,
    telemetry: PathBuf,
    export: PathBuf,
    settings: Settings,
}

fn flight() -> Flight {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let data = root.join("data");
    let base_dir = root.join("base");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::create_dir_all(&base_dir).unwrap();

    let events = [t(10, 0, 10, 0), t(10, 0, 30, 50), t(10, 0, 59, 990)];

    let rover = data.join("rover.20o");
    let mut builder = RinexBuilder::new().rover().epochs(t(10, 0, 0, 100), 600);
    for event in events {
        builder = builder.event(event);
    }
    builder.write(&rover);

    let base = base_dir.join("base.20o");
    RinexBuilder::new()
        .epochs(t(10, 0, 0, 0), 700)
        .write(&base);
    write_nav(&base_dir.join("base.20n"));

    let telemetry = data.join("flight_telemetry.txt");
    write_telemetry(&telemetry, &events);

    let solver = root.join("solver.sh");
    std::fs::write(&solver, SOLVER).unwrap();
    std::fs::set_permissions(&solver, std::fs::Permissions::from_mode(0o755)).unwrap();

    let template = root.join("template.conf");
    std::fs::write(&template, TEMPLATE).unwrap();

    let settings = Settings {
        solver,
        template: Some(template),
        base_position: Some([55.5, 37.25, 150.0]),
        workers: Some(2),
        ..Default::default()
    };

    Flight {
        export: root.join("export"),
        _dir: dir,
        data,
        rover,
        base,
        telemetry,
        settings,
    }
}

fn runtime() -> Arc<Runtime> {
    Arc::new(Runtime::deployed_at(t(12, 0, 0, 0)))
}

/// Data rows of a merged text reference
fn merged_rows(path: &Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| line.split('\t').map(|s| s.to_string()).collect())
        .collect()
}

#[tokio::test]
async fn test_single_flight() {
    let flight = flight();
    let processor = Processor::new(flight.settings.clone(), runtime()).unwrap();

    let report = processor
        .run_single(
            &flight.rover,
            &flight.base,
            &[flight.telemetry.clone()],
            &flight.export,
        )
        .await
        .unwrap();

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert!(report.missed_events.is_empty());
    assert_eq!(report.quality, Some(100.0));
    assert!(report.navigation_only.is_empty());

    let txt = flight.export.join("flight_GNSS.txt");
    assert!(flight.export.join("flight_GNSS.xml").exists());
    assert!(report.outputs.contains(&txt));

    let rows = merged_rows(&txt);
    assert_eq!(rows.len(), 3);

    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), 12);
        assert_eq!(row[0], format!("IMG_{:04}", i + 1));
        assert_eq!(row[1], "55.5");
        assert_eq!(row[2], "37.25");
        assert_eq!(row[7], "1");
    }

    assert_eq!(rows[1][11], "2020.07.22 10:00:30.050");
    assert_eq!(rows[2][11], "2020.07.22 10:00:59.990");
}

#[tokio::test]
async fn test_batch() {
    let flight = flight();

    let data = find_flights_data(&flight.data).unwrap();
    let (matches, missed) = find_matches_by_time_bounds(
        &data.rinex,
        &data.telemetry,
        Some(&flight.base),
        &MatchSettings::default(),
    )
    .unwrap();

    assert_eq!(matches.len(), 1);
    assert!(missed.is_empty());

    let processor = Arc::new(Processor::new(flight.settings.clone(), runtime()).unwrap());
    let report = processor
        .run_batch(matches, missed, &flight.base, &flight.export)
        .await
        .unwrap();

    assert_eq!(report.run, "2020_07_22_12_00_00");
    assert!(report.unexpected.is_empty());
    assert_eq!(report.flights.len(), 1);

    let flight_report = &report.flights[0];
    assert_eq!(flight_report.name, "rover_flight_telemetry");
    assert!(flight_report.is_success(), "{:?}", flight_report.errors);
    assert_eq!(flight_report.quality, Some(100.0));
    assert!(!flight_report.solutions.is_empty());

    assert_eq!(merged_rows(&flight.export.join("flight_GNSS.txt")).len(), 3);
    assert!(
        flight
            .export
            .join("rover_flight_telemetry_ppk_track_events.pos")
            .exists()
    );

    for file in [
        "processing_log_2020_07_22_12_00_00.txt",
        "processing_report_2020_07_22_12_00_00.tsv",
        "processing_report_2020_07_22_12_00_00.json",
    ] {
        assert!(flight.export.join(file).exists(), "{}", file);
    }
}

#[tokio::test]
async fn test_missing_base_navigation() {
    let flight = flight();
    std::fs::remove_file(flight.base.with_extension("20n")).unwrap();

    let processor = Processor::new(flight.settings.clone(), runtime()).unwrap();
    let result = processor
        .run_single(
            &flight.rover,
            &flight.base,
            &[flight.telemetry.clone()],
            &flight.export,
        )
        .await;

    assert!(result.is_err());
}
