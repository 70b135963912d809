pub mod error;
pub mod types;
pub mod value;

pub use error::{ErrorKind, Result, UploadError};
pub use types::{RecordChange, RecordKey, RecordRef, StagingSlot};
pub use value::FieldValue;
