//! Orchestrator state and pass reports.
//!
//! # State Transitions
//!
//! ```text
//!          run() / run_pass()
//! Idle ─────────────────────────→ Running
//!   ↑                               │
//!   │ (run_pass() done)             │ shutdown / single pass done
//!   └───────────────────────────────┤
//!                                   ├──────────→ Stopped
//!                                   │ (error)
//!                                   └──────────→ Failed
//! ```
//!
//! - **Idle**: Created, or between standalone `run_pass()` calls.
//! - **Running**: A pass (or the pass loop) is in progress.
//! - **Stopped**: `run()` returned after shutdown or its final pass.
//! - **Failed**: A pass ended with an error. No further passes are accepted.

use std::fmt;
use std::time::Duration;

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Running,
    Stopped,
    Failed,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Idle => write!(f, "Idle"),
            OrchestratorState::Running => write!(f, "Running"),
            OrchestratorState::Stopped => write!(f, "Stopped"),
            OrchestratorState::Failed => write!(f, "Failed"),
        }
    }
}

/// How a pair ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Succeeded,
    /// The pair's transaction was discarded; carries the error message.
    Failed(String),
}

/// Per-pair summary.
#[derive(Debug, Clone)]
pub struct PairReport {
    pub source: String,
    pub destination: String,
    /// Tables considered.
    pub tables: usize,
    /// Rows inserted (0 when the pair failed).
    pub inserted: usize,
    /// Rows skipped by lookup or ledger.
    pub skipped: usize,
    /// Wall-clock time spent on the pair.
    pub elapsed: Duration,
    pub outcome: PairOutcome,
}

impl PairReport {
    pub fn is_success(&self) -> bool {
        self.outcome == PairOutcome::Succeeded
    }
}

/// Summary of one full pass over every ordered pair.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Pairs in the order they ran.
    pub pairs: Vec<PairReport>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Rows inserted across all pairs.
    pub fn total_inserted(&self) -> usize {
        self.pairs.iter().map(|p| p.inserted).sum()
    }

    /// Pairs that did not commit.
    pub fn failed_pairs(&self) -> impl Iterator<Item = &PairReport> + '_ {
        self.pairs.iter().filter(|p| !p.is_success())
    }

    /// Whether every pair committed.
    pub fn is_success(&self) -> bool {
        self.pairs.iter().all(PairReport::is_success)
    }

    /// Look up a pair's report.
    pub fn pair(&self, source: &str, destination: &str) -> Option<&PairReport> {
        self.pairs
            .iter()
            .find(|p| p.source == source && p.destination == destination)
    }
}
