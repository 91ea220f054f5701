// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pass orchestration.
//!
//! A pass visits every ordered pair of distinct stores:
//!
//! ```text
//! for src in stores:                 (config order)
//!     schema = introspect(src)       (once per source)
//!     for dst in stores, dst != src:
//!         replicate(schema, src, dst)
//! ```
//!
//! Pairs run one at a time; each holds its destination's only connection for
//! the length of its transaction. Repeating passes converges the stores toward
//! the union of their rows.
//!
//! # Failures
//!
//! - A catalog error ends the pass: there is nothing to reconcile without a schema.
//! - A pair error is recorded in the [`RunReport`], then the pass either stops
//!   (`on_pair_error: abort`, the default) or moves on (`continue`).

mod types;

pub use types::{OrchestratorState, PairOutcome, PairReport, RunReport};

use crate::config::{PairErrorPolicy, ReplicatorConfig};
use crate::engine::ReplicationEngine;
use crate::error::{ReplicatorError, Result};
use crate::ledger::RowLedger;
use crate::metrics;
use crate::schema;
use crate::store::Store;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Runs replication passes over a set of stores.
pub struct Orchestrator {
    /// Configuration, fixed for the orchestrator's lifetime
    config: ReplicatorConfig,

    /// Optional replicated-row ledger
    ledger: Option<RowLedger>,

    /// State (broadcast to watchers)
    state_tx: watch::Sender<OrchestratorState>,

    /// State receiver (for internal use)
    state_rx: watch::Receiver<OrchestratorState>,

    /// Passes completed since creation
    passes: u64,
}

impl Orchestrator {
    /// Create an orchestrator in the `Idle` state.
    pub fn new(config: ReplicatorConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(OrchestratorState::Idle);
        metrics::set_orchestrator_state("Idle");
        Self {
            config,
            ledger: None,
            state_tx,
            state_rx,
            passes: 0,
        }
    }

    /// Attach a replicated-row ledger.
    pub fn with_ledger(mut self, ledger: RowLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    pub fn ledger(&self) -> Option<&RowLedger> {
        self.ledger.as_ref()
    }

    /// Get current state.
    pub fn state(&self) -> OrchestratorState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<OrchestratorState> {
        self.state_rx.clone()
    }

    /// Passes completed since creation.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    fn set_state(&self, state: OrchestratorState) {
        let _ = self.state_tx.send(state);
        metrics::set_orchestrator_state(&state.to_string());
    }

    fn expect_idle(&self) -> Result<()> {
        if self.state() != OrchestratorState::Idle {
            return Err(ReplicatorError::InvalidState {
                expected: OrchestratorState::Idle.to_string(),
                actual: self.state().to_string(),
            });
        }
        Ok(())
    }

    /// Run a single pass and return to `Idle`.
    pub async fn run_pass(&mut self, stores: &[Store]) -> Result<RunReport> {
        self.expect_idle()?;
        self.set_state(OrchestratorState::Running);

        match self.pass(stores).await {
            Ok(report) => {
                self.set_state(OrchestratorState::Idle);
                Ok(report)
            }
            Err(e) => {
                self.set_state(OrchestratorState::Failed);
                Err(e)
            }
        }
    }

    /// Run passes until `shutdown` flips to `true`.
    ///
    /// Without a configured interval this runs exactly one pass. A pass in
    /// progress always runs to completion; shutdown is observed between
    /// passes. Returns the number of passes completed.
    pub async fn run(
        &mut self,
        stores: &[Store],
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<u64> {
        self.expect_idle()?;
        let interval = self.config.settings.interval_duration()?;

        info!(
            stores = stores.len(),
            interval = ?interval,
            policy = ?self.config.settings.on_pair_error,
            ledger = self.ledger.is_some(),
            "Starting orchestrator"
        );
        self.set_state(OrchestratorState::Running);

        let mut completed = 0u64;
        loop {
            if *shutdown.borrow() {
                debug!("Shutdown requested before pass");
                break;
            }

            if let Err(e) = self.pass(stores).await {
                self.set_state(OrchestratorState::Failed);
                return Err(e);
            }
            completed += 1;

            let Some(interval) = interval else {
                break;
            };

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Shutdown requested while waiting for next pass");
                        break;
                    }
                }
            }
        }

        self.set_state(OrchestratorState::Stopped);
        info!(passes = completed, "Orchestrator stopped");
        Ok(completed)
    }

    async fn pass(&mut self, stores: &[Store]) -> Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::default();
        let engine = ReplicationEngine::new().with_ledger(self.ledger.as_ref());

        for source in stores {
            let schema = match schema::introspect(source).await {
                Ok(schema) => schema,
                Err(e) => {
                    error!(store = %source.name(), error = %e, "Schema introspection failed, aborting pass");
                    return Err(e);
                }
            };

            for destination in stores.iter().filter(|d| d.name() != source.name()) {
                let pair_start = Instant::now();
                let outcome = engine.replicate(&schema, source, destination).await;
                let elapsed = pair_start.elapsed();

                match outcome {
                    Ok(result) => {
                        metrics::record_pair(
                            source.name(),
                            destination.name(),
                            result.inserted,
                            result.skipped + result.ledger_skipped,
                            elapsed,
                        );
                        info!(
                            source = %source.name(),
                            destination = %destination.name(),
                            tables = result.tables,
                            inserted = result.inserted,
                            skipped = result.skipped + result.ledger_skipped,
                            elapsed = ?elapsed,
                            "Replicated pair"
                        );
                        report.pairs.push(PairReport {
                            source: source.name().to_string(),
                            destination: destination.name().to_string(),
                            tables: result.tables,
                            inserted: result.inserted,
                            skipped: result.skipped + result.ledger_skipped,
                            elapsed,
                            outcome: PairOutcome::Succeeded,
                        });
                    }
                    Err(e) => {
                        if let Some(committed) = e.committed() {
                            // The rows landed; the run stops because the ledger lags.
                            metrics::record_pair(
                                source.name(),
                                destination.name(),
                                committed.inserted,
                                committed.skipped + committed.ledger_skipped,
                                elapsed,
                            );
                            error!(
                                source = %source.name(),
                                destination = %destination.name(),
                                inserted = committed.inserted,
                                error = %e,
                                "Pair committed, ledger not updated"
                            );
                            return Err(e);
                        }

                        metrics::record_pair_failure(source.name(), destination.name(), e.kind());
                        error!(
                            source = %source.name(),
                            destination = %destination.name(),
                            elapsed = ?elapsed,
                            error = %e,
                            "Pair failed, transaction discarded"
                        );
                        report.pairs.push(PairReport {
                            source: source.name().to_string(),
                            destination: destination.name().to_string(),
                            tables: schema.len(),
                            inserted: 0,
                            skipped: 0,
                            elapsed,
                            outcome: PairOutcome::Failed(e.to_string()),
                        });

                        if e.aborts_run() || self.config.settings.on_pair_error == PairErrorPolicy::Abort {
                            return Err(e);
                        }
                        warn!(
                            source = %source.name(),
                            destination = %destination.name(),
                            "Continuing with remaining pairs"
                        );
                    }
                }
            }
        }

        report.elapsed = start.elapsed();
        let failed = report.failed_pairs().count();
        metrics::record_pass(report.pairs.len(), failed, report.elapsed);
        self.passes += 1;
        info!(
            pairs = report.pairs.len(),
            failed,
            inserted = report.total_inserted(),
            elapsed = ?report.elapsed,
            "Pass complete"
        );
        Ok(report)
    }

    /// Close the ledger, if any. Stores belong to the caller.
    pub async fn close(&self) {
        if let Some(ledger) = &self.ledger {
            ledger.close().await;
        }
    }
}
