use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid descriptor path: {0}")]
    InvalidDescriptorPath(String),

    #[error("No staged descriptor at '{0}'")]
    DescriptorNotFound(String),

    #[error("Malformed staged descriptor at '{0}': {1}")]
    MalformedDescriptor(String, String),

    #[error("Upload of '{filename}' failed in transport: {reason}")]
    TransportFailure { filename: String, reason: String },

    #[error("Staged source '{}' is unavailable: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Destination '{}' is not writable: {reason}", path.display())]
    DestinationUnwritable { path: PathBuf, reason: String },

    #[error("Destination '{}' already exists", .0.display())]
    DestinationCollision(PathBuf),

    #[error("Size or type mismatch for '{filename}': {reason}")]
    SizeOrTypeMismatch { filename: String, reason: String },

    #[error("Filename '{filename}' exceeds the maximum length of {max}")]
    FilenameTooLong { filename: String, max: usize },

    #[error("Record type '{0}' is not registered as uploadable")]
    UnregisteredRecordType(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Payload-free discriminant of [`UploadError`], for callers that branch on
/// the failure class only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidDescriptorPath,
    DescriptorNotFound,
    MalformedDescriptor,
    TransportFailure,
    SourceUnavailable,
    DestinationUnwritable,
    DestinationCollision,
    SizeOrTypeMismatch,
    FilenameTooLong,
    UnregisteredRecordType,
    InvalidConfig,
    InvalidState,
    Store,
    Io,
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDescriptorPath(_) => ErrorKind::InvalidDescriptorPath,
            Self::DescriptorNotFound(_) => ErrorKind::DescriptorNotFound,
            Self::MalformedDescriptor(..) => ErrorKind::MalformedDescriptor,
            Self::TransportFailure { .. } => ErrorKind::TransportFailure,
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::DestinationUnwritable { .. } => ErrorKind::DestinationUnwritable,
            Self::DestinationCollision(_) => ErrorKind::DestinationCollision,
            Self::SizeOrTypeMismatch { .. } => ErrorKind::SizeOrTypeMismatch,
            Self::FilenameTooLong { .. } => ErrorKind::FilenameTooLong,
            Self::UnregisteredRecordType(_) => ErrorKind::UnregisteredRecordType,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Store(_) => ErrorKind::Store,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn unwritable(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::DestinationUnwritable {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn source_unavailable(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;

impl<T> From<std::sync::PoisonError<T>> for UploadError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = UploadError::DestinationCollision(PathBuf::from("/tmp/a.txt"));
        assert_eq!(err.kind(), ErrorKind::DestinationCollision);

        let err = UploadError::unwritable("/nope", "permission denied");
        assert_eq!(err.kind(), ErrorKind::DestinationUnwritable);
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_poison_maps_to_store() {
        let lock = std::sync::Arc::new(std::sync::Mutex::new(0));
        let cloned = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = cloned.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: UploadError = lock.lock().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
