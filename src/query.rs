//! Read-only queries over the last published snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::fleet::FleetCategory;
use crate::publisher::SnapshotReader;
use crate::snapshot::{Snapshot, Vehicle};

/// Vehicles whose display name starts with `query`, ignoring case.
///
/// The match is anchored: `"534"` finds `"534"` and `"534STL"` but not
/// `"1534"`. A blank query matches everything.
pub fn search_by_route<'a>(snapshot: &'a Snapshot, query: &str) -> Vec<&'a Vehicle> {
    let needle = query.trim().to_lowercase();
    snapshot
        .vehicles
        .iter()
        .filter(|v| v.display_name().to_lowercase().starts_with(&needle))
        .collect()
}

/// Vehicles whose id contains `query` anywhere, ignoring case.
pub fn search_by_vehicle_id<'a>(snapshot: &'a Snapshot, query: &str) -> Vec<&'a Vehicle> {
    let needle = query.trim().to_lowercase();
    snapshot
        .vehicles
        .iter()
        .filter(|v| v.id().to_lowercase().contains(&needle))
        .collect()
}

/// Vehicle count per fleet category; every category is present.
pub fn fleet_stats(snapshot: &Snapshot) -> BTreeMap<FleetCategory, usize> {
    let mut counts: BTreeMap<FleetCategory, usize> =
        FleetCategory::ALL.iter().map(|c| (*c, 0)).collect();
    for vehicle in &snapshot.vehicles {
        *counts.entry(vehicle.fleet_category()).or_default() += 1;
    }
    counts
}

/// Query handle bound to the publisher's snapshot channel.
///
/// Each call pins the current snapshot once, so a publish that lands midway
/// through a query is not observed by it.
#[derive(Clone)]
pub struct QueryEngine {
    reader: SnapshotReader,
}

impl QueryEngine {
    pub fn new(reader: SnapshotReader) -> Self {
        Self { reader }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.reader.current()
    }

    pub fn search_by_route(&self, query: &str) -> Vec<Vehicle> {
        let snapshot = self.snapshot();
        search_by_route(&snapshot, query).into_iter().cloned().collect()
    }

    pub fn search_by_vehicle_id(&self, query: &str) -> Vec<Vehicle> {
        let snapshot = self.snapshot();
        search_by_vehicle_id(&snapshot, query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn fleet_stats(&self) -> BTreeMap<FleetCategory, usize> {
        fleet_stats(&self.snapshot())
    }
}
