// ============================================================================
// Lifecycle Coordination
// ============================================================================
//
// Binds file operations to the phases of a persistence transaction:
// pre-commit validation records intent, the commit hook executes it, and
// rollback replays the ledger backwards.
//
// ============================================================================

pub mod manager;
pub mod state;
pub mod unit_of_work;

pub use manager::{Registration, UploadableManager};
pub use state::{CommitReport, CommittedFile, FileState, UnitId, UnitState};
pub use unit_of_work::UnitOfWork;
