use std::fmt;

use serde::{Deserialize, Serialize};

/// In-memory identity of a record within the host's unit of work.
///
/// The persisted identifier may not exist until after insert, so the host
/// supplies its own handle (an identity-map slot, an object address, a
/// counter) that stays stable for the lifetime of the unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub record_type: String,
    pub handle: u64,
}

impl RecordKey {
    pub fn new(record_type: impl Into<String>, handle: u64) -> Self {
        Self {
            record_type: record_type.into(),
            handle,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.record_type, self.handle)
    }
}

/// What the persistence engine is doing to a record in this unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordChange {
    Created,
    Updated,
    Removed,
}

impl RecordChange {
    pub fn from_flags(is_new: bool, is_removed: bool) -> Self {
        if is_removed {
            Self::Removed
        } else if is_new {
            Self::Created
        } else {
            Self::Updated
        }
    }
}

/// Where a record's staged descriptor lives inside the staging tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StagingSlot {
    /// The record never receives uploads through staging.
    Detached,

    /// The key sequence resolves directly to this record's descriptor.
    Single(Vec<String>),

    /// The key sequence resolves to a list shared by the sub-records of one
    /// owner; positions are handed out in validation order.
    Sequence(Vec<String>),
}

impl StagingSlot {
    pub fn keys(&self) -> &[String] {
        match self {
            Self::Detached => &[],
            Self::Single(keys) | Self::Sequence(keys) => keys,
        }
    }
}

/// Everything the lifecycle hooks need to know about one record besides its
/// field values, which are read through the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub key: RecordKey,
    pub slot: StagingSlot,
}

impl RecordRef {
    pub fn new(record_type: impl Into<String>, handle: u64) -> Self {
        Self {
            key: RecordKey::new(record_type, handle),
            slot: StagingSlot::Detached,
        }
    }

    /// Binds the record to the descriptor at `keys`.
    pub fn staged_at<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.slot = StagingSlot::Single(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Binds the record to the next unclaimed position of the list at `keys`.
    pub fn staged_in_sequence<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.slot = StagingSlot::Sequence(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn record_type(&self) -> &str {
        &self.key.record_type
    }
}
