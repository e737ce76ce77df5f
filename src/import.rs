// 🚚 Import Run - one end-to-end synchronization
//
// authenticate -> (fetch groupings) -> batch sync -> (reconcile) -> summary
//
// All run state lives in this module's locals and is returned in the
// summary; nothing survives the run.

use crate::calculated::CalculatedColumn;
use crate::columns::{ColumnManifest, ColumnSpec};
use crate::error::Result;
use crate::logging::Reporter;
use crate::reconcile::DeactivationReconciler;
use crate::remote::{MissingRecords, RemoteService};
use crate::source::RecordSource;
use crate::sync::{BatchSynchronizer, NoObserver};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

/// Everything a run needs, fixed for its whole duration
#[derive(Clone)]
pub struct ImportPlan {
    pub credentials: Credentials,
    pub columns: Vec<ColumnSpec>,
    pub calculated: Vec<CalculatedColumn>,
    pub batch_size: usize,
    pub deactivate_missing: bool,
    pub params: Map<String, JsonValue>,
}

// ============================================================================
// RUN SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub operation_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub updated: u64,
    pub skipped: u64,
    pub deactivated: u64,
    pub batches: usize,
    pub records: usize,
    pub missing_records: MissingRecords,
}

impl RunSummary {
    /// Human-readable report lines
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Records updated: {}", self.updated),
            format!("Records skipped: {}", self.skipped),
            format!("Records deactivated: {}", self.deactivated),
        ];

        if !self.missing_records.is_empty() {
            lines.push("Missing records:".to_string());
            for (model, conditions) in &self.missing_records {
                let conditions = conditions
                    .iter()
                    .map(|(field, value)| match value {
                        JsonValue::String(s) => format!("{} = '{}'", field, s),
                        other => format!("{} = '{}'", field, other),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                lines.push(format!("  {}: {}", model, conditions));
            }
        }

        lines
    }
}

// ============================================================================
// IMPORT RUN
// ============================================================================

pub struct ImportRun {
    operation_id: Uuid,
    plan: ImportPlan,
}

impl ImportRun {
    pub fn new(plan: ImportPlan) -> Self {
        ImportRun {
            operation_id: Uuid::new_v4(),
            plan,
        }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn execute(
        self,
        source: &mut dyn RecordSource,
        remote: &mut dyn RemoteService,
        reporter: &Reporter,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let plan = self.plan;

        remote.authenticate(&plan.credentials.key, &plan.credentials.secret)?;
        info!("authenticated");

        let header = source.header()?;
        let manifest = ColumnManifest::new(plan.columns, plan.calculated, header.as_deref());

        let mut reconciler = if plan.deactivate_missing {
            let groupings = remote.list_groupings(true, true)?;
            info!(groupings = groupings.len(), "deactivation scope loaded");
            Some(DeactivationReconciler::new(&manifest.all_columns(), groupings))
        } else {
            None
        };

        let sync = BatchSynchronizer::new(&manifest, plan.batch_size)?
            .with_params(plan.params)
            .with_reporter(reporter);

        let result = match reconciler.as_mut() {
            Some(reconciler) => sync.run(source, remote, reconciler)?,
            None => sync.run(source, remote, &mut NoObserver)?,
        };

        let deactivation = match reconciler {
            Some(reconciler) => reconciler.reconcile(remote, Some(reporter))?,
            None => Default::default(),
        };

        Ok(RunSummary {
            operation_id: self.operation_id,
            started_at,
            finished_at: Utc::now(),
            updated: result.updated,
            skipped: result.skipped,
            deactivated: deactivation.deactivated,
            batches: result.batches,
            records: result.records,
            missing_records: result.missing_records,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
