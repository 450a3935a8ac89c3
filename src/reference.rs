//! Route and stop reference tables, loaded once at startup.
//!
//! Loading never fails: a table that cannot be read is left empty and flagged
//! unavailable in [`ReferenceStatus`], and enrichment then shows raw route ids.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ReferenceLoadError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMeta {
    pub route_id: String,
    pub short_name: String,
    pub long_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopMeta {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Availability and row accounting for the two tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceStatus {
    pub routes_available: bool,
    pub stops_available: bool,
    pub route_count: usize,
    pub stop_count: usize,
    pub duplicate_routes: usize,
    pub skipped_route_rows: usize,
    pub skipped_stop_rows: usize,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    route_id: String,
    #[serde(default)]
    route_short_name: String,
    #[serde(default)]
    route_long_name: String,
}

#[derive(Debug, Deserialize)]
struct StopRow {
    #[serde(default)]
    stop_name: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    stop_lat: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    stop_lon: Option<f64>,
}

/// Canonical string form of a join key.
///
/// Both sides of the route join pass through here. Surrounding whitespace is
/// removed and an integral value written with a zero fraction (`"534.0"`, as
/// produced by exporters that type the column as a float) collapses to its
/// integer text. Leading zeros are kept: `"0534"` and `"534"` are different
/// routes.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some((int, frac)) = trimmed.split_once('.') {
        let integral = !int.is_empty() && int.bytes().all(|b| b.is_ascii_digit());
        let zero_fraction = !frac.is_empty() && frac.bytes().all(|b| b == b'0');
        if integral && zero_fraction {
            return int.to_string();
        }
    }
    trimmed.to_string()
}

/// Immutable reference store shared with the enrichment engine.
#[derive(Debug, Default)]
pub struct ReferenceMetadata {
    routes: HashMap<String, RouteMeta>,
    stops: Vec<StopMeta>,
    status: ReferenceStatus,
}

struct RouteTable {
    routes: HashMap<String, RouteMeta>,
    duplicates: usize,
    skipped: usize,
}

struct StopTable {
    stops: Vec<StopMeta>,
    skipped: usize,
}

impl ReferenceMetadata {
    /// Loads both tables. Failures are logged and reflected in [`status`](Self::status).
    #[tracing::instrument(skip_all, fields(routes = %routes_path.display(), stops = %stops_path.display()))]
    pub fn load(routes_path: &Path, stops_path: &Path) -> Self {
        let mut status = ReferenceStatus::default();

        let routes = match load_routes(routes_path) {
            Ok(table) => {
                status.routes_available = true;
                status.duplicate_routes = table.duplicates;
                status.skipped_route_rows = table.skipped;
                table.routes
            }
            Err(e) => {
                warn!(error = %e, "Route table unavailable, showing raw route ids");
                HashMap::new()
            }
        };

        let stops = match load_stops(stops_path) {
            Ok(table) => {
                status.stops_available = true;
                status.skipped_stop_rows = table.skipped;
                table.stops
            }
            Err(e) => {
                warn!(error = %e, "Stop table unavailable");
                Vec::new()
            }
        };

        status.route_count = routes.len();
        status.stop_count = stops.len();

        info!(
            routes = status.route_count,
            stops = status.stop_count,
            duplicate_routes = status.duplicate_routes,
            skipped_route_rows = status.skipped_route_rows,
            skipped_stop_rows = status.skipped_stop_rows,
            "Reference metadata loaded"
        );

        Self {
            routes,
            stops,
            status,
        }
    }

    /// Builds a store from in-memory rows, applying the same key
    /// normalization and first-wins deduplication as [`load`](Self::load).
    pub fn from_parts(routes: Vec<RouteMeta>, stops: Vec<StopMeta>) -> Self {
        let mut table = HashMap::with_capacity(routes.len());
        let mut duplicates = 0;
        for mut route in routes {
            route.route_id = normalize_key(&route.route_id);
            if insert_first(&mut table, route) {
                duplicates += 1;
            }
        }
        let stops: Vec<StopMeta> = stops
            .into_iter()
            .filter(|s| s.lat.is_finite() && s.lon.is_finite())
            .collect();

        let status = ReferenceStatus {
            routes_available: true,
            stops_available: true,
            route_count: table.len(),
            stop_count: stops.len(),
            duplicate_routes: duplicates,
            ..Default::default()
        };

        Self {
            routes: table,
            stops,
            status,
        }
    }

    /// Looks up a route by its already-normalized id.
    pub fn route(&self, route_id: &str) -> Option<&RouteMeta> {
        self.routes.get(route_id)
    }

    pub fn stops(&self) -> &[StopMeta] {
        &self.stops
    }

    pub fn status(&self) -> &ReferenceStatus {
        &self.status
    }

    pub fn routes_available(&self) -> bool {
        self.status.routes_available
    }

    pub fn stops_available(&self) -> bool {
        self.status.stops_available
    }
}

/// Inserts unless the key is already present. Returns `true` for a duplicate.
fn insert_first(table: &mut HashMap<String, RouteMeta>, route: RouteMeta) -> bool {
    if table.contains_key(&route.route_id) {
        return true;
    }
    table.insert(route.route_id.clone(), route);
    false
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>, ReferenceLoadError> {
    let file = File::open(path).map_err(|source| ReferenceLoadError::SourceMissing {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file))
}

fn require_columns(
    reader: &mut csv::Reader<File>,
    path: &Path,
    required: &[&str],
) -> Result<(), ReferenceLoadError> {
    let headers = reader
        .headers()
        .map_err(|e| ReferenceLoadError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(ReferenceLoadError::ParseError {
                path: path.to_path_buf(),
                reason: format!("missing column {column:?}"),
            });
        }
    }
    Ok(())
}

fn load_routes(path: &Path) -> Result<RouteTable, ReferenceLoadError> {
    let mut reader = open_reader(path)?;
    require_columns(&mut reader, path, &["route_id"])?;

    let mut routes = HashMap::new();
    let mut duplicates = 0;
    let mut skipped = 0;

    for (line, result) in reader.deserialize::<RouteRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                debug!(line = line + 2, error = %e, "Skipping unreadable route row");
                skipped += 1;
                continue;
            }
        };
        let route_id = normalize_key(&row.route_id);
        if route_id.is_empty() {
            skipped += 1;
            continue;
        }
        let route = RouteMeta {
            route_id,
            short_name: row.route_short_name,
            long_name: row.route_long_name,
        };
        if insert_first(&mut routes, route) {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        debug!(duplicates, "Duplicate route ids ignored, first occurrence kept");
    }

    Ok(RouteTable {
        routes,
        duplicates,
        skipped,
    })
}

fn load_stops(path: &Path) -> Result<StopTable, ReferenceLoadError> {
    let mut reader = open_reader(path)?;
    require_columns(&mut reader, path, &["stop_lat", "stop_lon"])?;

    let mut stops = Vec::new();
    let mut skipped = 0;

    for result in reader.deserialize::<StopRow>() {
        match result {
            Ok(StopRow {
                stop_name,
                stop_lat: Some(lat),
                stop_lon: Some(lon),
            }) if lat.is_finite() && lon.is_finite() => stops.push(StopMeta {
                name: stop_name,
                lat,
                lon,
            }),
            _ => skipped += 1,
        }
    }

    Ok(StopTable { stops, skipped })
}
