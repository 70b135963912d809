// ============================================================================
// Uploadable Library
// ============================================================================
//
// Keeps three things consistent across a persistence transaction: staged
// upload payloads, their durable location on disk, and the path field of
// the record that owns them.
//
// ============================================================================

pub mod core;
pub mod ledger;
pub mod lifecycle;
pub mod mover;
pub mod prelude;
pub mod staging;
pub mod storage;
pub mod strategy;

// Re-export main types for convenience
pub use crate::core::{
    ErrorKind, FieldValue, RecordChange, RecordKey, RecordRef, Result, StagingSlot, UploadError,
};
pub use ledger::{Ledger, OperationState, PendingKind, PendingOperation};
pub use lifecycle::{
    CommitReport, CommittedFile, FileState, Registration, UnitId, UnitOfWork, UnitState,
    UploadableManager,
};
pub use mover::{FileMover, Placement};
pub use staging::{Resolution, StagedFile, StagedValue, TransportError};
pub use storage::{InMemoryRecordStore, RecordStore};
pub use strategy::{
    CollisionPolicy, ConfiguredPathStrategy, Destination, FieldDirectoryStrategy,
    FilenameGenerator, PathContext, PathStrategy, TransferMode, UploadableConfig,
};
