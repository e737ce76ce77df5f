// 🔄 Batch Synchronizer - pull, enrich, filter, upsert
//
// Records are pulled from the source in groups of `batch_size`. Each group is
// sent as soon as it is full; a short group means the source is exhausted.
// Batches are independent: a failure on batch N leaves batches 1..N-1 applied
// on the remote side and nothing is rolled back.

use crate::calculated::derive_all;
use crate::columns::ColumnManifest;
use crate::error::{ImportError, Result};
use crate::logging::Reporter;
use crate::remote::{MissingRecords, RemoteService, UpsertResult, WireRow};
use crate::rules::PositionalRecord;
use crate::source::RecordSource;
use crate::value::Value;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};

pub const DEFAULT_BATCH_SIZE: usize = 10;

// ============================================================================
// OBSERVER
// ============================================================================

/// Sees every enriched record (calculated columns appended, nothing filtered
/// or trimmed yet) exactly once, in source order.
pub trait RecordObserver {
    fn observe(&mut self, record: &[Value]);
}

/// Observer for runs that do not watch the stream
pub struct NoObserver;

impl RecordObserver for NoObserver {
    fn observe(&mut self, _record: &[Value]) {}
}

// ============================================================================
// SYNC RESULT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncResult {
    pub updated: u64,
    pub skipped: u64,
    pub missing_records: MissingRecords,
    pub batches: usize,
    pub records: usize,
}

impl SyncResult {
    /// Fold one batch reply in. A model reported again replaces the earlier
    /// entry for that model.
    pub fn absorb(&mut self, reply: UpsertResult) {
        self.updated += reply.updated;
        self.skipped += reply.skipped;
        self.missing_records.extend(reply.missing_records);
    }
}

// ============================================================================
// SYNCHRONIZER
// ============================================================================

pub struct BatchSynchronizer<'a> {
    manifest: &'a ColumnManifest,
    batch_size: usize,
    params: Map<String, JsonValue>,
    reporter: Option<&'a Reporter>,
}

impl<'a> BatchSynchronizer<'a> {
    pub fn new(manifest: &'a ColumnManifest, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(ImportError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(BatchSynchronizer {
            manifest,
            batch_size,
            params: Map::new(),
            reporter: None,
        })
    }

    /// Static parameters sent along with every batch
    pub fn with_params(mut self, params: Map<String, JsonValue>) -> Self {
        self.params = params;
        self
    }

    pub fn with_reporter(mut self, reporter: &'a Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn run(
        &self,
        source: &mut dyn RecordSource,
        remote: &mut dyn RemoteService,
        observer: &mut dyn RecordObserver,
    ) -> Result<SyncResult> {
        let columns = self.manifest.filtered_columns();
        let mut result = SyncResult::default();
        let mut pulled = 0;

        loop {
            let mut batch: Vec<WireRow> = Vec::with_capacity(self.batch_size);

            while batch.len() < self.batch_size {
                let Some(raw) = source.next_record()? else {
                    break;
                };
                pulled += 1;

                let record = self.enrich(raw, pulled)?;
                observer.observe(&record);
                batch.push(self.to_row(&record));
            }

            let exhausted = batch.len() < self.batch_size;

            // a source that ends on a batch boundary leaves an empty batch; it is not sent
            if !batch.is_empty() {
                result.batches += 1;
                let message = format!(
                    "saving batch {} records {} - {}",
                    result.batches,
                    result.records + 1,
                    result.records + batch.len()
                );
                match self.reporter {
                    Some(reporter) => reporter.line(&message),
                    None => info!("{}", message),
                }

                let reply = remote.upsert_batch(&columns, &batch, &self.params)?;
                debug!(
                    updated = reply.updated,
                    skipped = reply.skipped,
                    missing = reply.missing_records.len(),
                    "batch reply"
                );
                result.records += batch.len();
                result.absorb(reply);
            }

            if exhausted {
                break;
            }
        }

        Ok(result)
    }

    /// Check the record's shape and append calculated columns.
    ///
    /// `index` is the 1-based position of the record in the whole run.
    pub fn enrich(&self, raw: Vec<String>, index: usize) -> Result<Vec<Value>> {
        let expected = self.manifest.declared_len();
        if raw.len() != expected {
            return Err(ImportError::RecordLength {
                record: index,
                expected,
                found: raw.len(),
            });
        }

        let mut record: Vec<Value> = raw.into_iter().map(Value::Text).collect();
        let derived = {
            let source = PositionalRecord::new(self.manifest.registry(), &record);
            derive_all(&source, self.manifest.calculated())?
        };
        record.extend(derived);
        Ok(record)
    }

    /// Wire form of an enriched record: ignored columns dropped, scalars
    /// rendered as trimmed text.
    pub fn to_row(&self, record: &[Value]) -> WireRow {
        self.manifest
            .filter_record(record)
            .iter()
            .map(Value::to_wire)
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculated::CalculatedColumn;
    use crate::columns::ColumnSpec;
    use crate::remote::testing::RecordingRemote;
    use crate::source::MemorySource;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn manifest() -> ColumnManifest {
        let declared = vec![
            ColumnSpec::named("id").with_field("externalId"),
            ColumnSpec::named("last"),
            ColumnSpec::named("notes").ignored(),
        ];
        let calculated: Vec<CalculatedColumn> = serde_json::from_value(json!([
            {"map": {"name": "label"}, "default": "Resident ${last}"},
            {"map": {"name": "scratch", "ignore": true}, "default": "x"}
        ]))
        .unwrap();
        ColumnManifest::new(declared, calculated, None)
    }

    fn rows(n: usize) -> MemorySource {
        MemorySource::new((1..=n).map(|i| vec![i.to_string(), format!("Name{}", i), String::new()]))
    }

    struct Collect(Vec<Vec<Value>>);

    impl RecordObserver for Collect {
        fn observe(&mut self, record: &[Value]) {
            self.0.push(record.to_vec());
        }
    }

    #[test]
    fn test_short_batch_ends_the_run() {
        let manifest = manifest();
        let sync = BatchSynchronizer::new(&manifest, 5).unwrap();
        let mut remote = RecordingRemote::new();
        let mut source = rows(9);

        let result = sync.run(&mut source, &mut remote, &mut NoObserver).unwrap();

        assert_eq!(remote.upserts.len(), 2, "2*batch_size - 1 records take two calls");
        assert_eq!(remote.upserts[0].rows.len(), 5);
        assert_eq!(remote.upserts[1].rows.len(), 4);
        assert_eq!(result.batches, 2);
        assert_eq!(result.records, 9);
        assert_eq!(result.updated, 9);
    }

    #[test]
    fn test_full_final_batch_sends_no_empty_call() {
        let manifest = manifest();
        let sync = BatchSynchronizer::new(&manifest, 3).unwrap();
        let mut remote = RecordingRemote::new();

        sync.run(&mut rows(6), &mut remote, &mut NoObserver).unwrap();
        assert_eq!(remote.upserts.len(), 2);

        let mut remote = RecordingRemote::new();
        sync.run(&mut rows(0), &mut remote, &mut NoObserver).unwrap();
        assert!(remote.upserts.is_empty());
    }

    #[test]
    fn test_append_then_filter() {
        let manifest = manifest();
        let sync = BatchSynchronizer::new(&manifest, 10).unwrap();
        let mut remote = RecordingRemote::new();
        let mut source = MemorySource::new(vec![vec!["7  ", "Smith ", "call daughter"]]);
        let mut seen = Collect(Vec::new());

        sync.run(&mut source, &mut remote, &mut seen).unwrap();

        // observer sees M + N cells, untrimmed
        assert_eq!(seen.0[0].len(), 5);
        assert_eq!(seen.0[0][0], Value::text("7  "));
        assert_eq!(seen.0[0][3], Value::text("Resident Smith "));

        // remote sees ignored positions dropped, order kept, text trimmed
        let call = &remote.upserts[0];
        assert_eq!(
            call.rows[0],
            vec![
                Some("7".to_string()),
                Some("Smith".to_string()),
                Some("Resident Smith".to_string())
            ]
        );
        let names: Vec<_> = call.columns.iter().map(|c| c.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["id", "last", "label"]);
    }

    #[test]
    fn test_length_mismatch_cites_run_wide_index() {
        let manifest = manifest();
        let sync = BatchSynchronizer::new(&manifest, 2).unwrap();
        let mut remote = RecordingRemote::new();
        let mut source = MemorySource::new(vec![
            vec!["1", "A", ""],
            vec!["2", "B", ""],
            vec!["3", "C", ""],
            vec!["4", "D"],
        ]);

        let err = sync.run(&mut source, &mut remote, &mut NoObserver).unwrap_err();
        assert!(matches!(
            err,
            ImportError::RecordLength { record: 4, expected: 3, found: 2 }
        ));
        // first batch already went out; nothing is rolled back
        assert_eq!(remote.upserts.len(), 1);
    }

    #[test]
    fn test_missing_records_overwrite_per_model() {
        let manifest = manifest();
        let sync = BatchSynchronizer::new(&manifest, 1).unwrap();

        let first: BTreeMap<String, JsonValue> = [("externalId".to_string(), json!("1"))].into();
        let second: BTreeMap<String, JsonValue> = [("externalId".to_string(), json!("2"))].into();
        let room: BTreeMap<String, JsonValue> = [("number".to_string(), json!("9Z"))].into();

        let mut remote = RecordingRemote::new()
            .reply(UpsertResult {
                updated: 0,
                skipped: 1,
                missing_records: [
                    ("Resident".to_string(), first),
                    ("Room".to_string(), room.clone()),
                ]
                .into(),
            })
            .reply(UpsertResult {
                updated: 0,
                skipped: 1,
                missing_records: [("Resident".to_string(), second.clone())].into(),
            });

        let result = sync.run(&mut rows(2), &mut remote, &mut NoObserver).unwrap();

        assert_eq!(result.skipped, 2);
        assert_eq!(result.missing_records.len(), 2);
        assert_eq!(result.missing_records["Resident"], second);
        assert_eq!(result.missing_records["Room"], room);
    }

    #[test]
    fn test_remote_failure_stops_pulling() {
        let manifest = manifest();
        let sync = BatchSynchronizer::new(&manifest, 2).unwrap();
        let mut remote = RecordingRemote::new();
        remote.fail_upsert_on_call = Some(1);
        let mut source = rows(5);

        let err = sync.run(&mut source, &mut remote, &mut NoObserver).unwrap_err();
        assert_eq!(err.response_body(), Some("<html>502 Bad Gateway</html>"));
        assert_eq!(source.remaining(), 3);
    }

    #[test]
    fn test_params_are_forwarded() {
        let manifest = manifest();
        let mut params = Map::new();
        params.insert("source".to_string(), json!("nightly"));
        let sync = BatchSynchronizer::new(&manifest, 10).unwrap().with_params(params);
        let mut remote = RecordingRemote::new();

        sync.run(&mut rows(1), &mut remote, &mut NoObserver).unwrap();
        assert_eq!(remote.upserts[0].params["source"], json!("nightly"));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let manifest = manifest();
        assert!(BatchSynchronizer::new(&manifest, 0).is_err());
    }
}
