//! CSV output for point sets and sampled records.

use csv::{StringRecord, Writer, WriterBuilder};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;
use crate::points::PointRecord;
use crate::sampling::SampledRecord;

/// Columns shared by every output file, in order.
pub const POINT_COLUMNS: [&str; 7] = ["X", "Y", "Latitude", "Longitude", "Month", "Year", "Fire"];

fn create_writer(path: &Path) -> Result<Writer<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Writer::from_writer(File::create(path)?))
}

/// Writes `header` up front; rows are serialized after it without one.
fn create_row_writer(path: &Path, header: &[&str]) -> Result<Writer<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(File::create(path)?);
    writer.write_record(header)?;
    Ok(writer)
}

/// Writes a random or merged point set.
pub fn write_points_csv(path: &Path, points: &[PointRecord]) -> Result<()> {
    let mut writer = create_row_writer(path, &POINT_COLUMNS)?;
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    info!("Saved {} points to {:?}", points.len(), path);
    Ok(())
}

/// Writes sampled records; `field_names` fixes the column order after the
/// point columns. Missing values are left empty.
pub fn write_sampled_csv(path: &Path, field_names: &[String], records: &[SampledRecord]) -> Result<()> {
    let mut header: Vec<&str> = POINT_COLUMNS.to_vec();
    header.extend(field_names.iter().map(String::as_str));
    let mut writer = create_row_writer(path, &header)?;

    for record in records {
        let values: Vec<String> = field_names
            .iter()
            .map(|name| {
                record
                    .field(name)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            })
            .collect();
        writer.serialize((&record.point, values))?;
    }
    writer.flush()?;
    info!("Saved {} records to {:?}", records.len(), path);
    Ok(())
}

/// Concatenates monthly CSVs in order, writing the first file's header once.
///
/// Missing inputs are skipped. Inputs whose header differs from the first
/// are skipped with a warning. Returns the number of data rows written.
pub fn combine_csv(inputs: &[PathBuf], output: &Path) -> Result<usize> {
    let mut writer: Option<Writer<File>> = None;
    let mut header: Option<StringRecord> = None;
    let mut rows = 0;

    for input in inputs {
        if !input.exists() {
            continue;
        }
        let mut reader = csv::Reader::from_path(input)?;
        let input_header = reader.headers()?.clone();

        match &header {
            Some(expected) if *expected != input_header => {
                warn!("Skipping {:?}: columns differ from the combined file", input);
                continue;
            }
            Some(_) => {}
            None => {
                let mut created = create_writer(output)?;
                created.write_record(&input_header)?;
                writer = Some(created);
                header = Some(input_header);
            }
        }

        if let Some(writer) = writer.as_mut() {
            for record in reader.records() {
                writer.write_record(&record?)?;
                rows += 1;
            }
        }
    }

    match writer.as_mut() {
        Some(writer) => {
            writer.flush()?;
            info!("Combined {} rows into {:?}", rows, output);
        }
        None => warn!("No monthly CSV files found; {:?} not written", output),
    }
    Ok(rows)
}
