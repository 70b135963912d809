use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{Result, UploadError};
use crate::staging::StagedFile;

/// What to do when the computed destination already holds a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    Reject,
    /// Replace the existing file. Concurrent writers race; last one wins.
    Overwrite,
    /// Append `-1`, `-2`, ... to the file stem until a free name is found.
    AutoRename,
}

/// How the destination filename is derived from the staged one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameGenerator {
    #[default]
    Original,
    /// Lower-cased stem with every run of non `[a-z0-9]` collapsed to `-`.
    Alphanumeric,
    /// Name-based UUID of the record and descriptor, keeping the extension.
    Hashed,
}

/// Whether the staged payload is moved or copied into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    #[default]
    Move,
    /// Leaves the staged source in place.
    Copy,
}

/// Upload configuration for one record type
///
/// # Examples
///
/// ```
/// use uploadable::{CollisionPolicy, UploadableConfig};
///
/// let config = UploadableConfig::new("/srv/uploads/images")
///     .collision(CollisionPolicy::AutoRename)
///     .max_size(5 * 1024 * 1024)
///     .allowed_types(["image/png", "image/jpeg"]);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadableConfig {
    /// Directory committed files are placed in
    pub root: PathBuf,

    /// Field holding the committed file's path
    pub file_path_field: String,

    /// Optional field receiving the final filename
    pub file_name_field: Option<String>,

    /// Optional field receiving the declared MIME type
    pub file_mime_type_field: Option<String>,

    /// Optional field receiving the payload size in bytes
    pub file_size_field: Option<String>,

    pub filename_generator: FilenameGenerator,

    pub collision: CollisionPolicy,

    pub max_filename_length: Option<usize>,

    /// Upper bound on payload size in bytes
    pub max_size: Option<u64>,

    /// Accepted MIME types; empty accepts everything. `type/*` wildcards allowed.
    pub allowed_types: Vec<String>,

    /// Refused MIME types. Mutually exclusive with `allowed_types`.
    pub disallowed_types: Vec<String>,

    pub transfer: TransferMode,

    /// Compare the declared size against the staged payload at commit
    pub verify_declared_size: bool,
}

impl UploadableConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_path_field: "filePath".to_string(),
            file_name_field: None,
            file_mime_type_field: None,
            file_size_field: None,
            filename_generator: FilenameGenerator::Original,
            collision: CollisionPolicy::Reject,
            max_filename_length: None,
            max_size: None,
            allowed_types: Vec::new(),
            disallowed_types: Vec::new(),
            transfer: TransferMode::Move,
            verify_declared_size: true,
        }
    }

    /// Load from a JSON document, then validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| UploadError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn file_path_field(mut self, field: &str) -> Self {
        self.file_path_field = field.to_string();
        self
    }

    pub fn file_name_field(mut self, field: &str) -> Self {
        self.file_name_field = Some(field.to_string());
        self
    }

    pub fn file_mime_type_field(mut self, field: &str) -> Self {
        self.file_mime_type_field = Some(field.to_string());
        self
    }

    pub fn file_size_field(mut self, field: &str) -> Self {
        self.file_size_field = Some(field.to_string());
        self
    }

    pub fn filename_generator(mut self, generator: FilenameGenerator) -> Self {
        self.filename_generator = generator;
        self
    }

    pub fn collision(mut self, policy: CollisionPolicy) -> Self {
        self.collision = policy;
        self
    }

    pub fn max_filename_length(mut self, max: usize) -> Self {
        self.max_filename_length = Some(max);
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn allowed_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn disallowed_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn transfer(mut self, mode: TransferMode) -> Self {
        self.transfer = mode;
        self
    }

    pub fn verify_declared_size(mut self, verify: bool) -> Self {
        self.verify_declared_size = verify;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(UploadError::InvalidConfig("root cannot be empty".to_string()));
        }

        if self.file_path_field.is_empty() {
            return Err(UploadError::InvalidConfig(
                "file_path_field cannot be empty".to_string(),
            ));
        }

        if !self.allowed_types.is_empty() && !self.disallowed_types.is_empty() {
            return Err(UploadError::InvalidConfig(
                "allowed_types and disallowed_types cannot both be set".to_string(),
            ));
        }

        if self.max_filename_length == Some(0) {
            return Err(UploadError::InvalidConfig(
                "max_filename_length must be > 0".to_string(),
            ));
        }

        if self.max_size == Some(0) {
            return Err(UploadError::InvalidConfig("max_size must be > 0".to_string()));
        }

        Ok(())
    }

    /// Checks declared metadata of a staged file against the size and type
    /// policy. `actual_size` overrides the declared size when known.
    pub fn check_descriptor(&self, file: &StagedFile, actual_size: Option<u64>) -> Result<()> {
        let mismatch = |reason: String| UploadError::SizeOrTypeMismatch {
            filename: file.filename.clone(),
            reason,
        };

        let size = actual_size.unwrap_or(file.size);
        if let Some(max) = self.max_size {
            if size > max {
                return Err(mismatch(format!("{} bytes exceeds the limit of {}", size, max)));
            }
        }

        if !self.allowed_types.is_empty()
            && !self.allowed_types.iter().any(|p| mime_matches(p, &file.mime_type))
        {
            return Err(mismatch(format!("type '{}' is not allowed", file.mime_type)));
        }

        if self.disallowed_types.iter().any(|p| mime_matches(p, &file.mime_type)) {
            return Err(mismatch(format!("type '{}' is disallowed", file.mime_type)));
        }

        Ok(())
    }
}

impl Default for UploadableConfig {
    fn default() -> Self {
        Self::new("uploads")
    }
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
    let pattern = pattern.trim();
    let mime = mime.trim();
    match pattern.strip_suffix("/*") {
        Some(major) => mime
            .split_once('/')
            .is_some_and(|(m, _)| m.eq_ignore_ascii_case(major)),
        None => pattern.eq_ignore_ascii_case(mime),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_file(size: u64) -> StagedFile {
        StagedFile::new("/tmp/a", "a.txt").size(size).mime_type("text/plain")
    }

    #[test]
    fn test_default_config() {
        let config = UploadableConfig::default();
        assert_eq!(config.file_path_field, "filePath");
        assert_eq!(config.collision, CollisionPolicy::Reject);
        assert_eq!(config.transfer, TransferMode::Move);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = UploadableConfig::new("/srv/files")
            .file_path_field("path")
            .file_size_field("size")
            .collision(CollisionPolicy::Overwrite)
            .filename_generator(FilenameGenerator::Hashed)
            .max_filename_length(64);

        assert_eq!(config.root, PathBuf::from("/srv/files"));
        assert_eq!(config.file_path_field, "path");
        assert_eq!(config.file_size_field.as_deref(), Some("size"));
        assert_eq!(config.collision, CollisionPolicy::Overwrite);
        assert_eq!(config.filename_generator, FilenameGenerator::Hashed);
        assert_eq!(config.max_filename_length, Some(64));
    }

    #[test]
    fn test_validate() {
        assert!(UploadableConfig::new("").validate().is_err());
        assert!(UploadableConfig::new("/a").file_path_field("").validate().is_err());
        assert!(UploadableConfig::new("/a").max_size(0).validate().is_err());
        assert!(
            UploadableConfig::new("/a")
                .allowed_types(["text/plain"])
                .disallowed_types(["image/png"])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_from_json() {
        let config = UploadableConfig::from_json(
            r#"{"root": "/srv/docs", "collision": "auto_rename", "max_size": 1024}"#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/docs"));
        assert_eq!(config.collision, CollisionPolicy::AutoRename);
        assert_eq!(config.file_path_field, "filePath");
        assert_eq!(config.max_size, Some(1024));

        let err = UploadableConfig::from_json(r#"{"root": ""}"#).unwrap_err();
        assert!(matches!(err, UploadError::InvalidConfig(_)));
    }

    #[test]
    fn test_size_policy() {
        let config = UploadableConfig::new("/a").max_size(4);
        assert!(config.check_descriptor(&text_file(4), None).is_ok());
        assert!(config.check_descriptor(&text_file(5), None).is_err());
        assert!(config.check_descriptor(&text_file(4), Some(10)).is_err());
    }

    #[test]
    fn test_type_policy() {
        let allowed = UploadableConfig::new("/a").allowed_types(["image/*", "text/plain"]);
        assert!(allowed.check_descriptor(&text_file(1), None).is_ok());
        assert!(
            allowed
                .check_descriptor(&text_file(1).mime_type("IMAGE/PNG"), None)
                .is_ok()
        );
        assert!(
            allowed
                .check_descriptor(&text_file(1).mime_type("application/pdf"), None)
                .is_err()
        );

        let denied = UploadableConfig::new("/a").disallowed_types(["text/plain"]);
        let err = denied.check_descriptor(&text_file(1), None).unwrap_err();
        assert!(matches!(err, UploadError::SizeOrTypeMismatch { .. }));
    }
}
