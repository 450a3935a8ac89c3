use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::PipelineError;
use crate::fleet::FleetCategory;
use crate::publisher::CycleReport;
use crate::query::fleet_stats;

/// One row of per-cycle statistics.
#[derive(Debug, Default, Serialize)]
pub struct CycleStats {
    pub timestamp: DateTime<Utc>,
    pub sequence: Option<u64>,
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub total_entities: usize,
    pub vehicle_entities: usize,
    pub malformed_entities: usize,
    pub salvaged: bool,

    // sanitizer
    pub missing_coordinates: usize,
    pub out_of_bounds: usize,
    pub published: usize,

    // fleet breakdown
    pub dtc: usize,
    pub dimts: usize,
    pub electric: usize,

    pub elapsed_ms: u64,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl CycleStats {
    pub fn from_report(report: &CycleReport) -> Self {
        let fleet = fleet_stats(&report.snapshot);
        let count = |c: FleetCategory| fleet.get(&c).copied().unwrap_or_default();

        CycleStats {
            timestamp: report.snapshot.captured_at,
            sequence: Some(report.snapshot.sequence),
            feed_timestamp: report.snapshot.feed_timestamp,
            total_entities: report.total_entities,
            vehicle_entities: report.vehicle_entities,
            malformed_entities: report.malformed_entities,
            salvaged: report.salvaged,
            missing_coordinates: report.sanitize.missing_coordinates,
            out_of_bounds: report.sanitize.out_of_bounds,
            published: report.snapshot.len(),
            dtc: count(FleetCategory::Dtc),
            dimts: count(FleetCategory::Dimts),
            electric: count(FleetCategory::Electric),
            elapsed_ms: report.elapsed.as_millis() as u64,
            error_type: None,
            error_message: None,
        }
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(err: &PipelineError) -> Self {
        CycleStats {
            timestamp: Utc::now(),
            error_type: Some(err.kind().to_string()),
            error_message: Some(err.to_string()),
            ..Default::default()
        }
    }

    pub fn from_outcome(outcome: &Result<CycleReport, PipelineError>) -> Self {
        match outcome {
            Ok(report) => Self::from_report(report),
            Err(err) => Self::from_error(err),
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of vehicle entities that made it into the snapshot.
    pub fn published_pct(&self) -> f64 {
        Self::pct(self.published, self.vehicle_entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fleet::FleetRules;
    use crate::reference::ReferenceMetadata;
    use crate::sanitize::{SanitizeReport, SanitizedRecord};
    use crate::snapshot::Snapshot;
    use std::sync::Arc;
    use std::time::Duration;

    fn report() -> CycleReport {
        let records = ["DL1PC0001", "DL1PC0002", "DL51EV003", "DL1PD0004"]
            .iter()
            .map(|id| SanitizedRecord {
                id: id.to_string(),
                lat: 28.6,
                lon: 77.2,
                route_id: "534".to_string(),
            })
            .collect();
        let vehicles =
            crate::enrich::enrich(records, &ReferenceMetadata::default(), &FleetRules::default());
        CycleReport {
            snapshot: Arc::new(Snapshot {
                sequence: 7,
                vehicles,
                ..Snapshot::empty()
            }),
            total_entities: 6,
            vehicle_entities: 5,
            malformed_entities: 0,
            salvaged: false,
            sanitize: SanitizeReport {
                input: 5,
                missing_coordinates: 1,
                out_of_bounds: 0,
                kept: 4,
            },
            elapsed: Duration::from_millis(42),
        }
    }

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(CycleStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(CycleStats::pct(50, 100), 50.0);
        assert_eq!(CycleStats::pct(1, 4), 25.0);
    }

    #[test]
    fn test_from_report() {
        let stats = CycleStats::from_report(&report());

        assert_eq!(stats.sequence, Some(7));
        assert_eq!(stats.published, 4);
        assert_eq!(stats.missing_coordinates, 1);
        assert_eq!(stats.dimts, 2);
        assert_eq!(stats.electric, 1);
        assert_eq!(stats.dtc, 1);
        assert_eq!(stats.elapsed_ms, 42);
        assert_eq!(stats.published_pct(), 80.0);
        assert!(stats.error_type.is_none());
    }

    #[test]
    fn test_from_error() {
        let err = PipelineError::Fetch(FetchError::HttpStatus(503));
        let stats = CycleStats::from_outcome(&Err(err));

        assert_eq!(stats.error_type.as_deref(), Some("http_status"));
        assert!(stats.error_message.unwrap().contains("503"));
        assert_eq!(stats.published, 0);
        assert_eq!(stats.sequence, None);
    }
}
