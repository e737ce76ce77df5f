// Roster Sync - Core Library
// CSV records -> calculated columns -> batched upserts -> complement deactivation

pub mod error;
pub mod value;
pub mod columns;
pub mod rules;
pub mod calculated;
pub mod source;
pub mod remote;
pub mod client;
pub mod sync;
pub mod reconcile;
pub mod import;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{ErrorKind, ImportError, Result};
pub use value::Value;
pub use columns::{ColumnManifest, ColumnRegistry, ColumnSpec};
pub use rules::{KeyedRecord, Operator, PositionalRecord, Rule, RuleSet, ValueSource};
pub use calculated::{derive_all, CalculatedColumn, Condition};
pub use source::{CsvRecordSource, MemorySource, RecordSource};
pub use remote::{DeactivateResult, GroupingRecord, MissingRecords, RemoteService, UpsertResult};
pub use client::HttpRemote;
pub use sync::{BatchSynchronizer, RecordObserver, SyncResult};
pub use reconcile::{DeactivationOutcome, DeactivationReconciler, DeactivationSet};
pub use import::{Credentials, ImportPlan, ImportRun, RunSummary};
pub use config::ImportConfig;
pub use logging::Reporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
