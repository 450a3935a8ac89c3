//! Poll cycle orchestration and atomic snapshot publication.
//!
//! A cycle moves through `Fetching → Decoding → Sanitizing → Enriching` and
//! ends `Published` or `Failed`. A failed cycle leaves the previous snapshot in
//! place. Snapshots are swapped as whole `Arc`s through a `watch` channel, so
//! readers see either the old or the new snapshot and never a partial one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::enrich::enrich;
use crate::error::PipelineError;
use crate::fetch::FeedSource;
use crate::fleet::FleetRules;
use crate::parser::FeedDecoder;
use crate::reference::ReferenceMetadata;
use crate::sanitize::{BoundingBox, SanitizeReport, sanitize};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    #[default]
    Idle,
    Fetching,
    Decoding,
    Sanitizing,
    Enriching,
    Published,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleFailure {
    pub at: DateTime<Utc>,
    pub stage: CycleStage,
    pub kind: String,
    pub reason: String,
}

/// Publisher health, for status indicators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleStatus {
    pub stage: CycleStage,
    pub cycles_run: u64,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure: Option<CycleFailure>,
}

impl CycleStatus {
    /// True when the most recent cycle failed and readers are being served
    /// an older snapshot.
    pub fn is_stale(&self) -> bool {
        self.consecutive_failures > 0
    }
}

/// What a successful cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub snapshot: Arc<Snapshot>,
    pub total_entities: usize,
    pub vehicle_entities: usize,
    pub malformed_entities: usize,
    pub salvaged: bool,
    pub sanitize: SanitizeReport,
    pub elapsed: Duration,
}

/// Read side of the publisher. Cheap to clone; never blocks the publisher.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    snapshot: watch::Receiver<Arc<Snapshot>>,
    status: watch::Receiver<CycleStatus>,
}

impl SnapshotReader {
    /// The last fully published snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> CycleStatus {
        self.status.borrow().clone()
    }

    /// Waits for the next publish. Returns `false` once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }
}

pub struct SnapshotPublisher<S> {
    source: S,
    decoder: FeedDecoder,
    reference: Arc<ReferenceMetadata>,
    bbox: BoundingBox,
    fleet: FleetRules,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    status_tx: watch::Sender<CycleStatus>,
    in_flight: Mutex<()>,
}

impl<S: FeedSource> SnapshotPublisher<S> {
    pub fn new(
        source: S,
        decoder: FeedDecoder,
        reference: Arc<ReferenceMetadata>,
        bbox: BoundingBox,
        fleet: FleetRules,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::empty()));
        let (status_tx, _) = watch::channel(CycleStatus::default());
        Self {
            source,
            decoder,
            reference,
            bbox,
            fleet,
            snapshot_tx,
            status_tx,
            in_flight: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> SnapshotReader {
        SnapshotReader {
            snapshot: self.snapshot_tx.subscribe(),
            status: self.status_tx.subscribe(),
        }
    }

    /// Runs cycles every `period` until `shutdown` flips to `true`.
    ///
    /// Only an explicit `true` stops the loop. If every sender is dropped the
    /// loop keeps polling and stops watching for shutdown.
    ///
    /// The first cycle starts immediately. Ticks that come due while a cycle
    /// is still running are skipped, not queued. `on_cycle` sees every
    /// outcome, after the snapshot and status have been updated.
    pub async fn run<F>(&self, period: Duration, mut shutdown: watch::Receiver<bool>, mut on_cycle: F)
    where
        F: FnMut(&Result<CycleReport, PipelineError>),
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            source = %self.source.describe(),
            period_secs = period.as_secs_f64(),
            "Snapshot publisher started"
        );

        let mut watching = true;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.run_cycle().await;
                    on_cycle(&result);
                }
                changed = shutdown.changed(), if watching => {
                    if changed.is_err() {
                        warn!("Shutdown signal sender dropped, polling continues");
                        watching = false;
                    } else if *shutdown.borrow() {
                        info!("Shutdown requested, stopping snapshot publisher");
                        break;
                    }
                }
            }
        }
    }

    /// Runs one fetch → decode → sanitize → enrich cycle and publishes the
    /// result. On failure the current snapshot is kept and the failure is
    /// recorded in the status channel. Either way the stage returns to
    /// `Idle` once the outcome is recorded.
    ///
    /// Returns [`PipelineError::CycleInFlight`] without touching any state if
    /// another cycle is running.
    #[tracing::instrument(skip(self), fields(source = %self.source.describe()))]
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Cycle already in flight, skipping");
            return Err(PipelineError::CycleInFlight);
        };

        let started = Instant::now();
        let result = self.execute(started).await;
        match &result {
            Ok(report) => self.record_success(report),
            Err(e) => self.record_failure(e),
        }
        self.set_stage(CycleStage::Idle);
        result
    }

    async fn execute(&self, started: Instant) -> Result<CycleReport, PipelineError> {
        self.set_stage(CycleStage::Fetching);
        let bytes = self.source.fetch().await?;

        self.set_stage(CycleStage::Decoding);
        let decoded = self.decoder.decode(&bytes)?;

        self.set_stage(CycleStage::Sanitizing);
        let sanitized = sanitize(&decoded.entities, &self.bbox);
        if sanitized.records.is_empty() {
            return Err(PipelineError::EmptyCycle {
                entities: decoded.entities.len(),
            });
        }

        self.set_stage(CycleStage::Enriching);
        let vehicles = enrich(sanitized.records, &self.reference, &self.fleet);

        let sequence = self.snapshot_tx.borrow().sequence + 1;
        let snapshot = Arc::new(Snapshot {
            sequence,
            captured_at: Utc::now(),
            feed_timestamp: decoded.feed_timestamp,
            vehicles,
        });
        self.snapshot_tx.send_replace(Arc::clone(&snapshot));

        Ok(CycleReport {
            snapshot,
            total_entities: decoded.total_entities,
            vehicle_entities: decoded.entities.len(),
            malformed_entities: decoded.malformed_entities,
            salvaged: decoded.salvaged,
            sanitize: sanitized.report,
            elapsed: started.elapsed(),
        })
    }

    fn set_stage(&self, stage: CycleStage) {
        self.status_tx.send_modify(|s| s.stage = stage);
    }

    fn record_success(&self, report: &CycleReport) {
        self.status_tx.send_modify(|s| {
            s.stage = CycleStage::Published;
            s.cycles_run += 1;
            s.consecutive_failures = 0;
            s.last_success_at = Some(report.snapshot.captured_at);
        });

        info!(
            sequence = report.snapshot.sequence,
            vehicles = report.snapshot.len(),
            entities = report.total_entities,
            missing_coordinates = report.sanitize.missing_coordinates,
            out_of_bounds = report.sanitize.out_of_bounds,
            salvaged = report.salvaged,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Snapshot published"
        );
    }

    fn record_failure(&self, err: &PipelineError) {
        let failure = CycleFailure {
            at: Utc::now(),
            stage: err.stage(),
            kind: err.kind().to_string(),
            reason: err.to_string(),
        };
        let mut consecutive = 0;
        self.status_tx.send_modify(|s| {
            s.stage = CycleStage::Failed;
            s.cycles_run += 1;
            s.consecutive_failures += 1;
            consecutive = s.consecutive_failures;
            s.last_failure = Some(failure);
        });

        warn!(
            stage = ?err.stage(),
            kind = err.kind(),
            error = %err,
            consecutive_failures = consecutive,
            "Cycle failed, keeping previous snapshot"
        );
    }
}
