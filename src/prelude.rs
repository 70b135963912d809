//! Everything a transaction owner needs to wire uploads into its lifecycle.
//!
//! ```
//! use uploadable::prelude::*;
//! ```

pub use crate::core::{FieldValue, RecordChange, RecordKey, RecordRef, Result, UploadError};
pub use crate::lifecycle::{CommitReport, UnitOfWork, UploadableManager};
pub use crate::staging::{StagedFile, StagedValue};
pub use crate::storage::RecordStore;
pub use crate::strategy::{CollisionPolicy, FilenameGenerator, PathStrategy, UploadableConfig};
