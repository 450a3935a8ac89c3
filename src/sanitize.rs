//! Columnar sanitization of decoded feed entities.
//!
//! Entities are spread into pre-sized parallel columns in one pass, then
//! filtered: first rows with a missing or non-finite coordinate, then rows
//! outside the geofence. Survivors keep their input order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::{Field, RawEntity};
use crate::reference::normalize_key;
use crate::snapshot::UNKNOWN;

/// Inclusive latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Default for BoundingBox {
    /// Mainland India. Far looser than a city fence; deployments should narrow it.
    fn default() -> Self {
        Self {
            min_lat: 10.0,
            max_lat: 40.0,
            min_lon: 60.0,
            max_lon: 90.0,
        }
    }
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }

    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
    }
}

/// A validated row: both coordinates finite and inside the geofence.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedRecord {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub route_id: String,
}

impl From<&SanitizedRecord> for RawEntity {
    fn from(record: &SanitizedRecord) -> Self {
        RawEntity {
            vehicle_id: Field::Present(record.id.clone()),
            lat: Field::Present(record.lat),
            lon: Field::Present(record.lon),
            route_id: Field::Present(record.route_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeReport {
    pub input: usize,
    pub missing_coordinates: usize,
    pub out_of_bounds: usize,
    pub kept: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub records: Vec<SanitizedRecord>,
    pub report: SanitizeReport,
}

/// Parallel columns, allocated once for the whole batch.
struct Columns {
    ids: Vec<String>,
    lats: Vec<Option<f64>>,
    lons: Vec<Option<f64>>,
    route_ids: Vec<String>,
}

impl Columns {
    fn with_capacity(n: usize) -> Self {
        Self {
            ids: Vec::with_capacity(n),
            lats: Vec::with_capacity(n),
            lons: Vec::with_capacity(n),
            route_ids: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, entity: &RawEntity) {
        self.ids.push(text_or_unknown(&entity.vehicle_id, |s| s.to_string()));
        self.lats.push(coordinate(&entity.lat));
        self.lons.push(coordinate(&entity.lon));
        self.route_ids.push(text_or_unknown(&entity.route_id, normalize_key));
    }
}

fn text_or_unknown(field: &Field<String>, convert: impl Fn(&str) -> String) -> String {
    match field {
        Field::Present(s) => {
            let value = convert(s);
            if value.is_empty() {
                UNKNOWN.to_string()
            } else {
                value
            }
        }
        Field::Absent | Field::Malformed => UNKNOWN.to_string(),
    }
}

fn coordinate(field: &Field<f64>) -> Option<f64> {
    match field {
        Field::Present(v) if v.is_finite() => Some(*v),
        _ => None,
    }
}

/// Coerces, validates and geofences `entities`.
pub fn sanitize(entities: &[RawEntity], bbox: &BoundingBox) -> Sanitized {
    let n = entities.len();
    let mut columns = Columns::with_capacity(n);
    for entity in entities {
        columns.push(entity);
    }

    let mut report = SanitizeReport {
        input: n,
        ..Default::default()
    };
    let mut keep = Vec::with_capacity(n);
    for (lat, lon) in columns.lats.iter().zip(&columns.lons) {
        let row = match (lat, lon) {
            (Some(lat), Some(lon)) => Some((*lat, *lon)),
            _ => {
                report.missing_coordinates += 1;
                None
            }
        };
        let row = row.filter(|(lat, lon)| {
            let inside = bbox.contains(*lat, *lon);
            if !inside {
                report.out_of_bounds += 1;
            }
            inside
        });
        keep.push(row);
    }

    let kept = keep.iter().filter(|row| row.is_some()).count();
    let mut records = Vec::with_capacity(kept);
    let rows = columns.ids.into_iter().zip(columns.route_ids).zip(keep);
    for ((id, route_id), row) in rows {
        if let Some((lat, lon)) = row {
            records.push(SanitizedRecord {
                id,
                lat,
                lon,
                route_id,
            });
        }
    }
    report.kept = records.len();

    debug!(
        input = report.input,
        kept = report.kept,
        missing_coordinates = report.missing_coordinates,
        out_of_bounds = report.out_of_bounds,
        "Entities sanitized"
    );

    Sanitized { records, report }
}
