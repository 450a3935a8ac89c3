//! Output formatting and persistence for snapshots and cycle statistics.
//!
//! Supports pretty JSON, CSV export of a snapshot, and CSV append of
//! per-cycle statistics.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::snapshot::Snapshot;
use crate::stats::CycleStats;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

#[derive(Serialize)]
struct VehicleRow<'a> {
    id: &'a str,
    lat: f64,
    lon: f64,
    route_id: &'a str,
    display_name: &'a str,
    description: &'a str,
    fleet_category: &'a str,
    color: &'a str,
}

/// Logs a snapshot as pretty-printed JSON.
pub fn print_json(snapshot: &Snapshot) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}

/// Writes a snapshot to `path` as pretty-printed JSON.
pub fn write_json(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, snapshot)?;
    debug!(path = %path.display(), vehicles = snapshot.len(), "Snapshot JSON written");
    Ok(())
}

/// Writes the vehicles of a snapshot to `path` as CSV, replacing the file.
pub fn write_vehicles_csv(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    for v in &snapshot.vehicles {
        writer.serialize(VehicleRow {
            id: v.id(),
            lat: v.lat(),
            lon: v.lon(),
            route_id: v.route_id(),
            display_name: v.display_name(),
            description: v.description(),
            fleet_category: v.fleet_category().as_str(),
            color: v.color(),
        })?;
    }
    writer.flush()?;
    debug!(path = %path.display(), vehicles = snapshot.len(), "Snapshot CSV written");
    Ok(())
}

/// Appends a [`CycleStats`] record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &Path, stats: &CycleStats) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(stats)?;
    writer.flush()?;

    Ok(())
}
