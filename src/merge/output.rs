use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use hifitime::prelude::Epoch;
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{
    error::Result,
    merge::{MergedRecord, MergedReference},
    utils::merged_datetime,
};

/// Reference file settings: (property, value)
const XML_SETTINGS: [(&str, &str); 6] = [
    ("accuracy_tiepoints", "1"),
    ("accuracy_cameras", "10"),
    ("accuracy_cameras_ypr", "10"),
    ("accuracy_markers", "0.005"),
    ("accuracy_scalebars", "0.001"),
    ("accuracy_projections", "0.5"),
];

const TXT_COLUMNS: &str =
    "# file\t lat\t lon\t height\t roll\t pitch\t yaw\t quality\t sdn\t sde\t sdu\t time\n";

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn processing_time() -> String {
    match Epoch::now() {
        Ok(now) => {
            let (y, m, d, hh, mm, ss, _) = now.to_gregorian_utc();
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                y, m, d, hh, mm, ss
            )
        },
        Err(_) => "unknown".to_string(),
    }
}

fn txt_row(record: &MergedRecord) -> String {
    let accuracy = match &record.accuracy {
        Some(acc) => format!("{}\t{}\t{}\t{}", acc.quality, acc.sdn, acc.sde, acc.sdu),
        None => "\t\t\t".to_string(),
    };

    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
        record.name,
        record.point.y,
        record.point.x,
        record.point.z,
        record.roll,
        record.pitch,
        record.yaw,
        accuracy,
        merged_datetime(record.time)
    )
}

/// Tab separated reference: comment header then one camera per line
pub fn write_txt<W: Write>(
    merged: &MergedReference,
    mut writer: W,
    time: &str,
    user: &str,
) -> Result<()> {
    write!(
        writer,
        "# Processed by {} v{}.\n# Time: {}.\n# User: {}.\n# Fixed: {:.1} %.\n{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        time,
        user,
        merged.quality,
        TXT_COLUMNS
    )?;

    for record in merged.records.iter() {
        writer.write_all(txt_row(record).as_bytes())?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes the merged reference as a tab separated text file
pub fn write_merged_txt(merged: &MergedReference, path: &Path) -> Result<()> {
    let fd = File::create(path)?;
    write_txt(
        merged,
        BufWriter::new(fd),
        &processing_time(),
        &current_user(),
    )
}

fn camera_reference(record: &MergedRecord) -> BytesStart<'static> {
    let mut reference = BytesStart::new("reference");

    for (key, value) in [
        ("x", record.point.x),
        ("y", record.point.y),
        ("z", record.point.z),
        ("roll", record.roll),
        ("pitch", record.pitch),
        ("yaw", record.yaw),
    ] {
        reference.push_attribute((key, value.to_string().as_str()));
    }

    reference.push_attribute(("sypr", "10"));

    match &record.accuracy {
        Some(acc) if !record.is_navigation_only() => {
            reference.push_attribute(("sx", acc.sde.to_string().as_str()));
            reference.push_attribute(("sy", acc.sdn.to_string().as_str()));
            reference.push_attribute(("sz", acc.sdu.to_string().as_str()));
            reference.push_attribute(("enabled", "true"));
        },
        _ => {
            reference.push_attribute(("enabled", "false"));
        },
    }

    reference
}

/// Camera reference XML, as imported by photogrammetry suites
pub fn write_xml<W: Write>(merged: &MergedReference, writer: W) -> Result<()> {
    let mut writer = Writer::new_with_indent(writer, b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("reference");
    root.push_attribute(("version", "1.2.0"));
    writer.write_event(Event::Start(root))?;

    writer.write_event(Event::Start(BytesStart::new("cameras")))?;

    for record in merged.records.iter() {
        let mut camera = BytesStart::new("camera");
        camera.push_attribute(("label", record.name.as_str()));
        writer.write_event(Event::Start(camera))?;
        writer.write_event(Event::Empty(camera_reference(record)))?;
        writer.write_event(Event::End(BytesEnd::new("camera")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("cameras")))?;

    if let Some(crs) = merged.crs {
        writer.write_event(Event::Start(BytesStart::new("reference")))?;
        writer.write_event(Event::Text(BytesText::new(crs.code())))?;
        writer.write_event(Event::End(BytesEnd::new("reference")))?;
    }

    writer.write_event(Event::Start(BytesStart::new("settings")))?;
    for (name, value) in XML_SETTINGS {
        let mut property = BytesStart::new("property");
        property.push_attribute(("name", name));
        property.push_attribute(("value", value));
        writer.write_event(Event::Empty(property))?;
    }
    writer.write_event(Event::End(BytesEnd::new("settings")))?;

    writer.write_event(Event::End(BytesEnd::new("reference")))?;

    let mut inner = writer.into_inner();
    inner.write_all(b"\n")?;
    inner.flush()?;
    Ok(())
}

/// Writes the merged reference as an XML reference file
pub fn write_merged_xml(merged: &MergedReference, path: &Path) -> Result<()> {
    let fd = File::create(path)?;
    write_xml(merged, BufWriter::new(fd))
}
