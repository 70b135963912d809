use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Error reported by the upload transport for a single file.
///
/// Codes follow the conventional multipart upload error numbering, so a
/// transport layer can forward its raw code through [`TransportError::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportError {
    /// Payload exceeded the server-wide upload limit.
    IniSize,
    /// Payload exceeded the limit declared by the submitting form.
    FormSize,
    Partial,
    /// The field was submitted without a file.
    NoFile,
    NoTmpDir,
    CantWrite,
    /// A transport extension stopped the upload.
    Extension,
    Unknown(u32),
}

impl TransportError {
    /// Maps a raw transport code; `0` means the upload succeeded.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::IniSize),
            2 => Some(Self::FormSize),
            3 => Some(Self::Partial),
            4 => Some(Self::NoFile),
            6 => Some(Self::NoTmpDir),
            7 => Some(Self::CantWrite),
            8 => Some(Self::Extension),
            other => Some(Self::Unknown(other)),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IniSize => write!(f, "file exceeds the server upload size limit"),
            Self::FormSize => write!(f, "file exceeds the form upload size limit"),
            Self::Partial => write!(f, "file was only partially uploaded"),
            Self::NoFile => write!(f, "no file was uploaded"),
            Self::NoTmpDir => write!(f, "missing temporary upload directory"),
            Self::CantWrite => write!(f, "failed to write staged file to disk"),
            Self::Extension => write!(f, "upload stopped by a transport extension"),
            Self::Unknown(code) => write!(f, "unknown upload error code {}", code),
        }
    }
}

/// A staged upload as produced by the transport layer.
///
/// The serde shape matches the usual multipart descriptor
/// (`tmp_name`, `name`, `size`, `type`, `error`, `index`), so descriptors
/// can be lifted straight out of the transport's JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    #[serde(rename = "tmp_name")]
    pub source: PathBuf,

    #[serde(rename = "name")]
    pub filename: String,

    #[serde(default)]
    pub size: u64,

    #[serde(rename = "type", default)]
    pub mime_type: String,

    #[serde(rename = "error", default)]
    pub error_code: u32,

    #[serde(default)]
    pub index: String,
}

impl StagedFile {
    pub fn new(source: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            filename: filename.into(),
            size: 0,
            mime_type: String::new(),
            error_code: 0,
            index: String::new(),
        }
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn error_code(mut self, code: u32) -> Self {
        self.error_code = code;
        self
    }

    pub fn source_path(&self) -> &Path {
        &self.source
    }

    pub fn transport_error(&self) -> Option<TransportError> {
        TransportError::from_code(self.error_code)
    }

    /// True when the transport reports the field was left empty.
    pub fn is_empty_submission(&self) -> bool {
        self.transport_error() == Some(TransportError::NoFile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_codes() {
        assert_eq!(TransportError::from_code(0), None);
        assert_eq!(TransportError::from_code(4), Some(TransportError::NoFile));
        assert_eq!(TransportError::from_code(5), Some(TransportError::Unknown(5)));
    }

    #[test]
    fn test_descriptor_from_transport_json() {
        let json = serde_json::json!({
            "tmp_name": "/tmp/php123",
            "name": "test.txt",
            "size": 4,
            "type": "text/plain",
            "error": 0,
            "index": "image"
        });

        let file: StagedFile = serde_json::from_value(json).unwrap();
        assert_eq!(file.source, PathBuf::from("/tmp/php123"));
        assert_eq!(file.filename, "test.txt");
        assert_eq!(file.size, 4);
        assert_eq!(file.mime_type, "text/plain");
        assert!(file.transport_error().is_none());
    }

    #[test]
    fn test_empty_submission() {
        let file = StagedFile::new("", "").error_code(4);
        assert!(file.is_empty_submission());
    }
}
