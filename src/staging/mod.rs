// ============================================================================
// Staging Module
// ============================================================================
//
// Read-only view of what the upload transport staged for this request:
// descriptors, the tree they live in, and the lookup that binds a record to
// its descriptor. Nothing here touches the filesystem.
//
// ============================================================================

pub mod descriptor;
pub mod resolver;
pub mod value;

pub use descriptor::{StagedFile, TransportError};
pub use resolver::{Resolution, require, resolve, resolve_descriptors};
pub use value::StagedValue;
