//! # Simple Replicator
//!
//! Reconciles N independently writable SQLite stores so that, after a pass,
//! every store holds the union of the rows present across all stores for each
//! shared table.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                           simple-replicator                               │
//! │                                                                           │
//! │  ┌──────────────┐  per source  ┌────────────┐                             │
//! │  │ Orchestrator │─────────────►│ introspect │──► Schema                   │
//! │  │ (N×(N-1))    │              └────────────┘      │                      │
//! │  └──────────────┘                                  ▼                      │
//! │         │ per pair        ┌───────────────────────────────────────────┐   │
//! │         └────────────────►│ ReplicationEngine                         │   │
//! │                           │  codec (Row, predicate) + matcher         │   │
//! │                           │  one destination transaction per pair     │   │
//! │                           └───────────────────────────────────────────┘   │
//! │                                            │                              │
//! │                                            ▼                              │
//! │                                   ┌─────────────────┐                     │
//! │                                   │ RowLedger       │ (optional)          │
//! │                                   │ (SQLite)        │                     │
//! │                                   └─────────────────┘                     │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only missing rows are inserted. Nothing is updated or deleted, and a row is
//! "missing" when no destination row matches it on every non-empty column.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use simple_replicator::{Orchestrator, ReplicatorConfig, Store};
//!
//! #[tokio::main]
//! async fn main() -> simple_replicator::Result<()> {
//!     let config = ReplicatorConfig::for_testing(&["a.db", "b.db"]);
//!     let mut stores = Vec::new();
//!     for db in &config.databases {
//!         stores.push(Store::connect(db, config.driver_for(db), &config.settings).await?);
//!     }
//!
//!     let mut orchestrator = Orchestrator::new(config);
//!     let report = orchestrator.run_pass(&stores).await?;
//!     println!("inserted {} rows", report.total_inserted());
//!
//!     for store in &stores {
//!         store.close().await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod matcher;
pub mod metrics;
pub mod orchestrator;
pub mod schema;
pub mod store;

// Re-exports for convenience
pub use codec::{CellValue, EqualityPredicate, Row};
pub use config::{Driver, LedgerConfig, PairErrorPolicy, ReplicationSettings, ReplicatorConfig, StoreConfig};
pub use engine::{ReplicationEngine, ReplicationResult};
pub use error::{ReplicatorError, Result};
pub use ledger::RowLedger;
pub use orchestrator::{Orchestrator, OrchestratorState, PairOutcome, PairReport, RunReport};
pub use schema::{Column, Schema, Table};
pub use store::Store;
