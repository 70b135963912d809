// ============================================================================
// Unit of Work State
// ============================================================================
//
// A unit of work moves through Active -> Committed | Aborted, mirroring the
// transaction it is bound to. Within it, each record's file moves through
// its own small state machine:
//
//   untouched -> {move-pending | replace-pending | delete-pending} -> settled
//
// ============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::RecordKey;

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl UnitId {
    pub fn new() -> Self {
        UnitId(NEXT_UNIT_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "uow_{}", self.0)
    }
}

/// Unit of work state
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback / failed hook──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Active,
    Committed,
    Aborted,
}

impl UnitState {
    pub fn is_active(&self) -> bool {
        matches!(self, UnitState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Committed | UnitState::Aborted)
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitState::Active => write!(f, "ACTIVE"),
            UnitState::Committed => write!(f, "COMMITTED"),
            UnitState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// File-handling state of one record inside an active unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Untouched,
    MovePending,
    ReplacePending,
    DeletePending,
}

/// A file placed during commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFile {
    pub record: RecordKey,
    pub path: PathBuf,
    /// Previous file of the record, discarded after placement.
    pub superseded: Option<PathBuf>,
}

/// Outcome of a successful commit hook.
#[derive(Debug, Clone)]
pub struct CommitReport {
    pub unit: UnitId,
    pub committed: Vec<CommittedFile>,
    pub deleted: Vec<(RecordKey, PathBuf)>,
    /// Superseded or removed files that could not be discarded. The commit
    /// itself stands; these are left for the host to clean up.
    pub failed_discards: Vec<(PathBuf, String)>,
    pub committed_at: DateTime<Utc>,
    pub duration: Duration,
}

impl CommitReport {
    pub(crate) fn new(unit: UnitId) -> Self {
        Self {
            unit,
            committed: Vec::new(),
            deleted: Vec::new(),
            failed_discards: Vec::new(),
            committed_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed_discards.is_empty()
    }

    pub fn path_for(&self, record: &RecordKey) -> Option<&PathBuf> {
        self.committed
            .iter()
            .find(|c| &c.record == record)
            .map(|c| &c.path)
    }
}
