use std::fmt;
use std::path::{Component, Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use super::{FilenameGenerator, UploadableConfig};
use crate::core::{RecordKey, Result, UploadError};
use crate::staging::StagedFile;
use crate::storage::RecordStore;

lazy_static! {
    static ref NON_ALPHANUMERIC: Regex = Regex::new("[^a-z0-9]+").expect("static pattern");
}

/// Where a committed file goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub directory: PathBuf,
    pub filename: String,
}

impl Destination {
    pub fn new(directory: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    /// The `n`-th auto-rename candidate: `name-n.ext`.
    pub fn numbered(&self, n: usize) -> Self {
        let (stem, extension) = split_extension(&self.filename);
        let filename = match extension {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        Self::new(self.directory.clone(), filename)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

/// Inputs available to a path strategy for one record.
pub struct PathContext<'a> {
    pub record: &'a RecordKey,
    pub config: &'a UploadableConfig,
    pub store: &'a dyn RecordStore,
}

/// Computes where a record's file is committed.
///
/// Both methods must be deterministic for a given record and descriptor so
/// that a retried unit of work lands on the same destination. The defaults
/// place files directly under the configured root, named by the configured
/// generator.
pub trait PathStrategy: Send + Sync {
    fn directory(&self, ctx: &PathContext<'_>) -> Result<PathBuf> {
        Ok(ctx.config.root.clone())
    }

    fn filename(&self, ctx: &PathContext<'_>, file: &StagedFile) -> Result<String> {
        generate_filename(ctx.config.filename_generator, ctx.record, file)
    }
}

/// Strategy driven purely by [`UploadableConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredPathStrategy;

impl PathStrategy for ConfiguredPathStrategy {}

/// Places each record in `root/<subdirectory>` where the subdirectory is
/// read from a record field, falling back to the root when the field is
/// null.
#[derive(Debug, Clone)]
pub struct FieldDirectoryStrategy {
    field: String,
}

impl FieldDirectoryStrategy {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl PathStrategy for FieldDirectoryStrategy {
    fn directory(&self, ctx: &PathContext<'_>) -> Result<PathBuf> {
        let value = ctx.store.read_field(ctx.record, &self.field)?;
        match value.as_path() {
            Some(sub) if sub.is_absolute() => Ok(sub),
            Some(sub) => Ok(ctx.config.root.join(sub)),
            None => Ok(ctx.config.root.clone()),
        }
    }
}

/// Runs `strategy` and checks the result is a usable single filename.
pub fn plan_destination(
    strategy: &dyn PathStrategy,
    ctx: &PathContext<'_>,
    file: &StagedFile,
) -> Result<Destination> {
    let directory = strategy.directory(ctx)?;
    let filename = strategy.filename(ctx, file)?;

    let mut components = Path::new(&filename).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if !single_normal {
        return Err(UploadError::MalformedDescriptor(
            file.index.clone(),
            format!("'{}' is not a plain filename", filename),
        ));
    }

    if let Some(max) = ctx.config.max_filename_length {
        if filename.chars().count() > max {
            return Err(UploadError::FilenameTooLong { filename, max });
        }
    }

    Ok(Destination::new(directory, filename))
}

/// Applies `generator` to the staged filename.
///
/// Only the final component of the staged name is used, so a name carrying
/// directory parts cannot escape the destination directory.
pub fn generate_filename(
    generator: FilenameGenerator,
    record: &RecordKey,
    file: &StagedFile,
) -> Result<String> {
    let base = base_name(&file.filename);
    if base.is_empty() || base == "." || base == ".." {
        return Err(UploadError::MalformedDescriptor(
            file.index.clone(),
            format!("'{}' has no usable filename", file.filename),
        ));
    }

    let (stem, extension) = split_extension(base);
    let name = match generator {
        FilenameGenerator::Original => return Ok(base.to_string()),
        FilenameGenerator::Alphanumeric => {
            let lowered = stem.to_lowercase();
            let slug = NON_ALPHANUMERIC.replace_all(&lowered, "-");
            let slug = slug.trim_matches('-');
            if slug.is_empty() { "file".to_string() } else { slug.to_string() }
        }
        FilenameGenerator::Hashed => {
            let seed = format!(
                "{}|{}|{}|{}",
                record.record_type, record.handle, base, file.size
            );
            Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
                .simple()
                .to_string()
        }
    };

    Ok(match extension {
        Some(ext) => format!("{}.{}", name, ext.to_lowercase()),
        None => name,
    })
}

fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename).trim()
}

fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    }
}
