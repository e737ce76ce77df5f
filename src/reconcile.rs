// ⚖️ Deactivation Reconciler - deactivate what the run did not see
//
// While records stream past, the reconciler notes which external ids showed
// up for which grouping. Afterwards each grouping that saw at least one id
// gets a single complement call: "these ids stay active, deactivate the rest".
// A grouping that saw nothing is left alone.

use crate::columns::{ColumnSpec, EXTERNAL_ID_FIELD, ID_NAME, INSTANCE_FIELD};
use crate::error::Result;
use crate::logging::Reporter;
use crate::remote::{GroupingRecord, RemoteService};
use crate::sync::RecordObserver;
use crate::value::Value;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

// ============================================================================
// DEACTIVATION SET
// ============================================================================

/// Grouping id -> external ids observed for it in this run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeactivationSet {
    ids: BTreeMap<String, BTreeSet<String>>,
}

impl DeactivationSet {
    pub fn record(&mut self, grouping_id: &str, external_id: &str) {
        self.ids
            .entry(grouping_id.to_string())
            .or_default()
            .insert(external_id.to_string());
    }

    pub fn survivors(&self, grouping_id: &str) -> Option<&BTreeSet<String>> {
        self.ids.get(grouping_id)
    }

    pub fn grouping_count(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeactivationOutcome {
    /// Sum of `updated` over all complement calls
    pub deactivated: u64,

    /// Complement calls issued
    pub calls: usize,

    /// Groupings skipped because the run saw none of their records
    pub skipped_groupings: usize,
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct DeactivationReconciler {
    groupings: Vec<GroupingRecord>,
    external_id_position: Option<usize>,
    instance_lookups: Vec<(usize, String)>,
    set: DeactivationSet,
}

impl DeactivationReconciler {
    /// `columns` is the full enriched layout: declared columns followed by
    /// calculated ones.
    pub fn new(columns: &[ColumnSpec], groupings: Vec<GroupingRecord>) -> Self {
        let external_id_position = columns
            .iter()
            .position(|c| c.has_field(EXTERNAL_ID_FIELD))
            .or_else(|| columns.iter().position(|c| c.has_name(ID_NAME)));

        let instance_lookups = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.has_field(INSTANCE_FIELD))
            .filter_map(|(i, c)| c.lookup_key.clone().map(|key| (i, key)))
            .collect();

        DeactivationReconciler {
            groupings,
            external_id_position,
            instance_lookups,
            set: DeactivationSet::default(),
        }
    }

    pub fn deactivation_set(&self) -> &DeactivationSet {
        &self.set
    }

    fn external_id(&self, record: &[Value]) -> Option<String> {
        let position = self.external_id_position?;
        record
            .get(position)
            .and_then(Value::to_wire)
            .filter(|id| !id.is_empty())
    }

    fn grouping_id(&self, record: &[Value]) -> Option<String> {
        for (position, key) in &self.instance_lookups {
            let Some(cell) = record.get(*position).and_then(Value::to_wire) else {
                continue;
            };
            let cell = Value::Text(cell);
            let found = self
                .groupings
                .iter()
                .find(|g| g.id.is_some() && g.matches(key, &cell));
            if let Some(grouping) = found {
                return grouping.id.clone();
            }
        }
        None
    }

    /// Issue one complement call per grouping that saw records in this run
    pub fn reconcile(
        self,
        remote: &mut dyn RemoteService,
        reporter: Option<&Reporter>,
    ) -> Result<DeactivationOutcome> {
        let mut outcome = DeactivationOutcome::default();

        for grouping in &self.groupings {
            let survivors = grouping
                .id
                .as_deref()
                .and_then(|id| self.set.survivors(id))
                .filter(|ids| !ids.is_empty());

            let Some(survivors) = survivors else {
                debug!(grouping = ?grouping.id, "no records seen, skipping deactivation");
                outcome.skipped_groupings += 1;
                continue;
            };

            let message = format!("deactivating records for {}", grouping.describe());
            match reporter {
                Some(reporter) => reporter.line(&message),
                None => info!("{}", message),
            }

            let survivors: Vec<String> = survivors.iter().cloned().collect();
            let reply = remote.deactivate_complement(&grouping.fields, &survivors)?;
            outcome.deactivated += reply.updated;
            outcome.calls += 1;
        }

        Ok(outcome)
    }
}

impl RecordObserver for DeactivationReconciler {
    fn observe(&mut self, record: &[Value]) {
        if let (Some(external_id), Some(grouping_id)) =
            (self.external_id(record), self.grouping_id(record))
        {
            self.set.record(&grouping_id, &external_id);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::RecordingRemote;
    use serde_json::{json, Map, Value as JsonValue};

    fn fields(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn groupings() -> Vec<GroupingRecord> {
        vec![
            GroupingRecord::new("A", fields(json!({"code": "EAST"}))),
            GroupingRecord::new("B", fields(json!({"code": "WEST"}))),
        ]
    }

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::named("resident").with_field(EXTERNAL_ID_FIELD),
            ColumnSpec::named("facility")
                .with_field(INSTANCE_FIELD)
                .with_lookup_key("code"),
        ]
    }

    fn record(id: &str, facility: &str) -> Vec<Value> {
        vec![Value::text(id), Value::text(facility)]
    }

    #[test]
    fn test_only_groupings_with_survivors_are_deactivated() {
        // A currently holds {1,2,3}, B holds {10}; this run only sees 1 and 3 for A
        let mut reconciler = DeactivationReconciler::new(&columns(), groupings());
        reconciler.observe(&record("1", "EAST"));
        reconciler.observe(&record("3", "EAST"));

        let mut remote = RecordingRemote::new();
        remote.deactivate_updated = 1;
        let outcome = reconciler.reconcile(&mut remote, None).unwrap();

        assert_eq!(remote.deactivations.len(), 1);
        let (metadata, survivors) = &remote.deactivations[0];
        assert_eq!(metadata, &fields(json!({"code": "EAST"})));
        assert_eq!(survivors, &vec!["1".to_string(), "3".to_string()]);

        assert_eq!(outcome.calls, 1);
        assert_eq!(outcome.deactivated, 1);
        assert_eq!(outcome.skipped_groupings, 1);
    }

    #[test]
    fn test_unresolved_records_are_not_recorded() {
        let mut reconciler = DeactivationReconciler::new(&columns(), groupings());
        reconciler.observe(&record("1", "NORTH"));
        reconciler.observe(&record("", "EAST"));
        reconciler.observe(&record("   ", "EAST"));
        assert!(reconciler.deactivation_set().is_empty());

        let mut remote = RecordingRemote::new();
        let outcome = reconciler.reconcile(&mut remote, None).unwrap();
        assert!(remote.deactivations.is_empty());
        assert_eq!(outcome.skipped_groupings, 2);
    }

    #[test]
    fn test_ids_are_trimmed_like_the_upsert() {
        let mut reconciler = DeactivationReconciler::new(&columns(), groupings());
        reconciler.observe(&record("7  ", "WEST "));
        let survivors = reconciler.deactivation_set().survivors("B").unwrap();
        assert!(survivors.contains("7"));
    }

    #[test]
    fn test_name_id_is_the_fallback_external_id() {
        let columns = vec![
            ColumnSpec::named("facility")
                .with_field(INSTANCE_FIELD)
                .with_lookup_key("code"),
            ColumnSpec::named("id"),
        ];
        let mut reconciler = DeactivationReconciler::new(&columns, groupings());
        reconciler.observe(&vec![Value::text("WEST"), Value::text("42")]);
        assert!(reconciler.deactivation_set().survivors("B").unwrap().contains("42"));
    }

    #[test]
    fn test_first_matching_grouping_wins() {
        let groupings = vec![
            GroupingRecord::new("first", fields(json!({"code": "EAST"}))),
            GroupingRecord::new("second", fields(json!({"code": "EAST"}))),
        ];
        let mut reconciler = DeactivationReconciler::new(&columns(), groupings);
        reconciler.observe(&record("1", "EAST"));
        assert!(reconciler.deactivation_set().survivors("first").is_some());
        assert!(reconciler.deactivation_set().survivors("second").is_none());
    }

    #[test]
    fn test_instance_column_need_not_follow_the_id() {
        let columns = vec![
            ColumnSpec::named("resident").with_field(EXTERNAL_ID_FIELD),
            ColumnSpec::named("wing"),
            ColumnSpec::named("facility")
                .with_field(INSTANCE_FIELD)
                .with_lookup_key("code"),
        ];
        let mut reconciler = DeactivationReconciler::new(&columns, groupings());
        reconciler.observe(&vec![Value::text("5"), Value::text("w"), Value::text("WEST")]);
        assert_eq!(reconciler.deactivation_set().grouping_count(), 1);
    }
}
