// ============================================================================
// Record Store Seam
// ============================================================================
//
// The persistence engine owns records, transactions and change tracking.
// The upload lifecycle only needs to read and write named fields and to
// flag a field dirty so the engine persists the write.
//
// ============================================================================

pub mod memory;

pub use memory::InMemoryRecordStore;

use crate::core::{FieldValue, RecordKey, Result};

/// Field access the persistence engine grants the upload lifecycle.
pub trait RecordStore {
    /// Reads `field` of `record`. Unknown fields read as [`FieldValue::Null`].
    fn read_field(&self, record: &RecordKey, field: &str) -> Result<FieldValue>;

    fn write_field(&mut self, record: &RecordKey, field: &str, value: FieldValue) -> Result<()>;

    /// Flags `field` so the engine includes it in the pending change set.
    fn mark_dirty(&mut self, record: &RecordKey, field: &str) -> Result<()>;

    /// Writes and marks dirty in one step.
    fn assign_field(&mut self, record: &RecordKey, field: &str, value: FieldValue) -> Result<()> {
        self.write_field(record, field, value)?;
        self.mark_dirty(record, field)
    }
}
