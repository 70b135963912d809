use super::RecordStore;
use crate::core::{FieldValue, RecordKey, Result, UploadError};
use std::collections::{BTreeSet, HashMap};

/// Record store backed by plain maps.
///
/// Stands in for a persistence engine in tests and in hosts whose records
/// already live in memory. Dirty flags accumulate until [`flush`] clears
/// them, which is where a real engine would write the change set.
///
/// [`flush`]: InMemoryRecordStore::flush
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: HashMap<RecordKey, HashMap<String, FieldValue>>,
    dirty: BTreeSet<(RecordKey, String)>,
    read_only: bool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record with no field values
    pub fn insert(&mut self, record: RecordKey) {
        self.records.entry(record).or_default();
    }

    /// Seed a field value without marking it dirty
    pub fn set(&mut self, record: &RecordKey, field: &str, value: impl Into<FieldValue>) {
        self.records
            .entry(record.clone())
            .or_default()
            .insert(field.to_string(), value.into());
    }

    pub fn get(&self, record: &RecordKey, field: &str) -> FieldValue {
        self.records
            .get(record)
            .and_then(|fields| fields.get(field))
            .cloned()
            .unwrap_or_default()
    }

    pub fn remove(&mut self, record: &RecordKey) {
        self.records.remove(record);
        self.dirty.retain(|(key, _)| key != record);
    }

    pub fn contains(&self, record: &RecordKey) -> bool {
        self.records.contains_key(record)
    }

    pub fn is_dirty(&self, record: &RecordKey, field: &str) -> bool {
        self.dirty.contains(&(record.clone(), field.to_string()))
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Drain the dirty set, returning what a real engine would persist
    pub fn flush(&mut self) -> Vec<(RecordKey, String)> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Make every write fail, to exercise store-error propagation
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

impl RecordStore for InMemoryRecordStore {
    fn read_field(&self, record: &RecordKey, field: &str) -> Result<FieldValue> {
        Ok(self.get(record, field))
    }

    fn write_field(&mut self, record: &RecordKey, field: &str, value: FieldValue) -> Result<()> {
        if self.read_only {
            return Err(UploadError::Store(format!(
                "store is read-only; cannot write {}.{}",
                record, field
            )));
        }
        self.set(record, field, value);
        Ok(())
    }

    fn mark_dirty(&mut self, record: &RecordKey, field: &str) -> Result<()> {
        if !self.records.contains_key(record) {
            return Err(UploadError::Store(format!("record {} is not managed", record)));
        }
        self.dirty.insert((record.clone(), field.to_string()));
        Ok(())
    }
}
