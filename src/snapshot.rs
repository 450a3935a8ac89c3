//! Enriched vehicles and the immutable per-cycle snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fleet::FleetCategory;

/// Placeholder for identifiers the feed did not carry.
pub const UNKNOWN: &str = "Unknown";

/// A sanitized, enriched vehicle. Fields are private so a vehicle cannot be
/// altered once the enrichment engine has built it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vehicle {
    id: String,
    lat: f64,
    lon: f64,
    route_id: String,
    display_name: String,
    description: String,
    fleet_category: FleetCategory,
    color: String,
}

impl Vehicle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        lat: f64,
        lon: f64,
        route_id: String,
        display_name: String,
        description: String,
        fleet_category: FleetCategory,
        color: String,
    ) -> Self {
        Self {
            id,
            lat,
            lon,
            route_id,
            display_name,
            description,
            fleet_category,
            color,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn fleet_category(&self) -> FleetCategory {
        self.fleet_category
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    /// Human-readable popup text for the renderer.
    pub fn summary(&self) -> String {
        let mut out = format!("Route: {}", self.display_name);
        if !self.description.is_empty() {
            out.push('\n');
            out.push_str(&self.description);
        }
        out.push_str(&format!(
            "\nVehicle: {}\nFleet: {}",
            self.id, self.fleet_category
        ));
        out
    }
}

/// One fully processed poll cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Publish counter; 0 is the placeholder served before the first publish.
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    /// Producer timestamp from the feed header, when the feed sets one.
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub vehicles: Vec<Vehicle>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            sequence: 0,
            captured_at: DateTime::<Utc>::UNIX_EPOCH,
            feed_timestamp: None,
            vehicles: Vec::new(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.sequence > 0
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(description: &str) -> Vehicle {
        Vehicle::new(
            "DL1PC1234".to_string(),
            28.61,
            77.21,
            "534".to_string(),
            "534".to_string(),
            description.to_string(),
            FleetCategory::Dimts,
            "orange".to_string(),
        )
    }

    #[test]
    fn test_summary_includes_description() {
        let summary = vehicle("Anand Vihar ISBT - Mehrauli").summary();
        assert_eq!(
            summary,
            "Route: 534\nAnand Vihar ISBT - Mehrauli\nVehicle: DL1PC1234\nFleet: DIMTS"
        );
    }

    #[test]
    fn test_summary_skips_empty_description() {
        let summary = vehicle("").summary();
        assert_eq!(summary, "Route: 534\nVehicle: DL1PC1234\nFleet: DIMTS");
    }

    #[test]
    fn test_empty_snapshot_is_unpublished() {
        let snapshot = Snapshot::empty();
        assert!(!snapshot.is_published());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
    }
}
