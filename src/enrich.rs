//! Joins sanitized records with reference routes and classifies the fleet.

use tracing::debug;

use crate::fleet::FleetRules;
use crate::reference::ReferenceMetadata;
use crate::sanitize::SanitizedRecord;
use crate::snapshot::Vehicle;

/// Builds one [`Vehicle`] per record; never drops rows.
///
/// Route ids are matched exactly against the reference table. Records whose
/// route is unknown (or whose table failed to load) show the raw route id.
pub fn enrich(
    records: Vec<SanitizedRecord>,
    reference: &ReferenceMetadata,
    fleet: &FleetRules,
) -> Vec<Vehicle> {
    let mut matched = 0usize;
    let mut vehicles = Vec::with_capacity(records.len());

    for record in records {
        let (display_name, description) = match reference.route(&record.route_id) {
            Some(route) => {
                matched += 1;
                let display_name = if route.short_name.is_empty() {
                    record.route_id.clone()
                } else {
                    route.short_name.clone()
                };
                (display_name, route.long_name.clone())
            }
            None => (record.route_id.clone(), String::new()),
        };

        let category = fleet.classify(&record.id);
        let color = fleet.color(category).to_string();

        vehicles.push(Vehicle::new(
            record.id,
            record.lat,
            record.lon,
            record.route_id,
            display_name,
            description,
            category,
            color,
        ));
    }

    debug!(
        vehicles = vehicles.len(),
        matched_routes = matched,
        routes_available = reference.routes_available(),
        "Vehicles enriched"
    );

    vehicles
}
