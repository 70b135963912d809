pub mod config;
pub mod path;

pub use config::{CollisionPolicy, FilenameGenerator, TransferMode, UploadableConfig};
pub use path::{
    ConfiguredPathStrategy, Destination, FieldDirectoryStrategy, PathContext, PathStrategy,
    generate_filename, plan_destination,
};
