//! Minimal add/remove/update plan between the records a zone holds and the
//! records it should hold.

use std::collections::HashMap;

use super::{DesiredRecord, ObservedRecord, RecordId, RecordKey};

/// Operations that turn the observed record set into the desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDiff {
    /// Records to create.
    pub to_add: Vec<DesiredRecord>,
    /// Ids of records to delete.
    pub to_remove: Vec<RecordId>,
    /// Existing records (old id) carrying their new value and ttl.
    pub to_update: Vec<ObservedRecord>,
}

impl RecordDiff {
    /// True when the zone already matches.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_update.is_empty()
    }

    /// Rewrite every update as remove-then-add for providers without update
    /// support. Callers must apply `to_remove` before `to_add`.
    pub fn into_recreate(mut self) -> Self {
        for record in self.to_update.drain(..) {
            self.to_remove.push(record.record_id.clone());
            self.to_add.push(DesiredRecord::from(&record));
        }
        self
    }
}

/// Compute the plan keyed by `(sub_domain, record_type)`.
///
/// Pure. When the observed set holds several records under one key, the
/// last is the match candidate and every other one is removed, so a zone
/// with duplicates converges to one record per key.
pub fn diff_records(old: &[ObservedRecord], new: &[DesiredRecord]) -> RecordDiff {
    let mut old_by_key: HashMap<RecordKey, &ObservedRecord> = HashMap::with_capacity(old.len());
    for record in old {
        old_by_key.insert(record.key(), record);
    }
    let mut new_by_key: HashMap<RecordKey, &DesiredRecord> = HashMap::with_capacity(new.len());
    for record in new {
        new_by_key.insert(record.key(), record);
    }

    let mut diff = RecordDiff::default();

    for (key, record) in &new_by_key {
        match old_by_key.get(key) {
            Some(existing) if existing.value != record.value || existing.ttl != record.ttl => {
                diff.to_update.push(ObservedRecord {
                    sub_domain: record.sub_domain.clone(),
                    value: record.value.clone(),
                    record_id: existing.record_id.clone(),
                    record_type: record.record_type.clone(),
                    ttl: record.ttl,
                });
            }
            Some(_) => {}
            None => diff.to_add.push((*record).clone()),
        }
    }

    for record in old {
        let key = record.key();
        let kept = new_by_key.contains_key(&key)
            && old_by_key
                .get(&key)
                .is_some_and(|matched| matched.record_id == record.record_id);
        if !kept {
            diff.to_remove.push(record.record_id.clone());
        }
    }

    diff.to_add.sort();
    diff.to_update.sort_by(|a, b| a.key().cmp(&b.key()));
    diff
}
