// ============================================================================
// Pending-Operations Ledger
// ============================================================================
//
// One table per unit of work, keyed by record identity. Each entry is the
// declared file intent for a record plus everything needed to undo it:
// the field values that were in place before the unit touched the record
// and, once executed, the placement the mover made.
//
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::core::{FieldValue, RecordKey};
use crate::mover::Placement;
use crate::staging::StagedFile;
use crate::strategy::Destination;

/// Declared file intent for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingKind {
    /// Record had no file and receives one.
    Create,
    /// Record's file is superseded by a new one.
    Replace,
    /// Record is removed; its file goes with it.
    Delete,
}

/// Progress of a pending operation within its unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    /// The mover placed the new file.
    Executed(Placement),
    Settled,
}

#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub record: RecordKey,
    pub kind: PendingKind,
    /// Path the record owned before this unit of work.
    pub prior_path: Option<PathBuf>,
    /// Anticipated destination of the new file.
    pub destination: Option<Destination>,
    pub descriptor: Option<StagedFile>,
    /// Field values as they were before the unit wrote to them.
    pub prior_fields: Vec<(String, FieldValue)>,
    pub state: OperationState,
}

impl PendingOperation {
    pub fn new(record: RecordKey, kind: PendingKind, prior_path: Option<PathBuf>) -> Self {
        Self {
            record,
            kind,
            prior_path,
            destination: None,
            descriptor: None,
            prior_fields: Vec::new(),
            state: OperationState::Pending,
        }
    }

    pub fn with_upload(mut self, descriptor: StagedFile, destination: Destination) -> Self {
        self.descriptor = Some(descriptor);
        self.destination = Some(destination);
        self
    }

    pub fn new_path(&self) -> Option<PathBuf> {
        self.destination.as_ref().map(Destination::path)
    }

    /// Path created by the mover, if the operation has executed.
    pub fn executed_path(&self) -> Option<&Path> {
        match &self.state {
            OperationState::Executed(placement) => Some(&placement.path),
            _ => None,
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self.kind, PendingKind::Create | PendingKind::Replace)
    }
}

/// Keyed table of pending operations for a single unit of work.
///
/// Iteration follows first-insertion order; a later insert for the same
/// record replaces the entry in place.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<PendingOperation>,
    index: HashMap<RecordKey, usize>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `operation`, returning the entry it replaced.
    pub fn insert(&mut self, operation: PendingOperation) -> Option<PendingOperation> {
        match self.index.get(&operation.record) {
            Some(&position) => Some(std::mem::replace(&mut self.entries[position], operation)),
            None => {
                self.index.insert(operation.record.clone(), self.entries.len());
                self.entries.push(operation);
                None
            }
        }
    }

    pub fn get(&self, record: &RecordKey) -> Option<&PendingOperation> {
        self.index.get(record).map(|&position| &self.entries[position])
    }

    pub fn get_mut(&mut self, record: &RecordKey) -> Option<&mut PendingOperation> {
        let position = *self.index.get(record)?;
        self.entries.get_mut(position)
    }

    pub fn contains(&self, record: &RecordKey) -> bool {
        self.index.contains_key(record)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingOperation> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PendingOperation> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destinations promised to records other than `except`.
    pub fn claimed_paths(&self, except: &RecordKey) -> HashSet<PathBuf> {
        self.entries
            .iter()
            .filter(|op| &op.record != except)
            .filter_map(|op| op.executed_path().map(Path::to_path_buf).or_else(|| op.new_path()))
            .collect()
    }

    /// Empties the ledger, yielding entries in insertion order.
    pub fn drain(&mut self) -> impl Iterator<Item = PendingOperation> + '_ {
        self.index.clear();
        self.entries.drain(..)
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
    }
}
