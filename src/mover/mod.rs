// ============================================================================
// File Mover
// ============================================================================
//
// Every filesystem operation of the upload lifecycle goes through here:
// preparing destination directories, probing for collisions, placing staged
// payloads and discarding committed files.
//
// Placement never clobbers unless the collision policy says so: a hard link
// (same filesystem) or a temp file persisted with no-clobber semantics makes
// the existence check and the write a single atomic step. An overwriting
// placement first sets the existing file aside so it can be put back.
//
// ============================================================================

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::{Level, event};

use crate::core::{Result, UploadError};
use crate::staging::StagedFile;
use crate::strategy::{CollisionPolicy, Destination, TransferMode, UploadableConfig};

/// Upper bound on `-n` suffixes tried under [`CollisionPolicy::AutoRename`].
pub const DEFAULT_MAX_RENAME_ATTEMPTS: usize = 1000;

/// Everything needed to reverse one committed placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub path: PathBuf,
    /// Staged source the payload was moved from. `None` for copies.
    pub source: Option<PathBuf>,
    /// File that occupied `path` before an overwriting placement.
    pub backup: Option<PathBuf>,
    /// Directories created for this placement, deepest first.
    pub created_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FileMover {
    max_rename_attempts: usize,
}

impl Default for FileMover {
    fn default() -> Self {
        Self::new()
    }
}

impl FileMover {
    pub fn new() -> Self {
        Self {
            max_rename_attempts: DEFAULT_MAX_RENAME_ATTEMPTS,
        }
    }

    pub fn max_rename_attempts(mut self, attempts: usize) -> Self {
        self.max_rename_attempts = attempts.max(1);
        self
    }

    /// Creates `directory` if absent and checks it can receive files.
    ///
    /// Returns the directories that had to be created, deepest first.
    pub fn prepare_directory(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        let missing: Vec<PathBuf> = directory
            .ancestors()
            .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
            .map(Path::to_path_buf)
            .collect();

        fs::create_dir_all(directory).map_err(|e| UploadError::unwritable(directory, e))?;
        ensure_writable_dir(directory, directory)?;
        Ok(missing)
    }

    /// Checks that `directory` could be prepared, without creating anything.
    ///
    /// The nearest existing ancestor must be a writable directory.
    pub fn check_directory(&self, directory: &Path) -> Result<()> {
        let existing = directory
            .ancestors()
            .find(|dir| !dir.as_os_str().is_empty() && dir.exists())
            .unwrap_or_else(|| Path::new("."));
        ensure_writable_dir(existing, directory)
    }

    /// Picks the destination a commit would use right now, without writing.
    ///
    /// `claimed` holds paths already promised to other records of the same
    /// unit of work; they count as occupied under every policy.
    pub fn reserve(
        &self,
        destination: &Destination,
        policy: CollisionPolicy,
        claimed: &HashSet<PathBuf>,
    ) -> Result<Destination> {
        let occupied = |candidate: &Destination| {
            let path = candidate.path();
            claimed.contains(&path) || path.exists()
        };

        match policy {
            CollisionPolicy::Reject => {
                if occupied(destination) {
                    return Err(UploadError::DestinationCollision(destination.path()));
                }
                Ok(destination.clone())
            }
            CollisionPolicy::Overwrite => {
                if claimed.contains(&destination.path()) {
                    return Err(UploadError::DestinationCollision(destination.path()));
                }
                Ok(destination.clone())
            }
            CollisionPolicy::AutoRename => self
                .candidates(destination)
                .find(|candidate| !occupied(candidate))
                .ok_or_else(|| UploadError::DestinationCollision(destination.path())),
        }
    }

    /// Materialises `file` at `destination`.
    ///
    /// Under [`CollisionPolicy::AutoRename`] the placed path may carry a
    /// suffix if the requested name was taken in the meantime.
    pub fn commit(
        &self,
        file: &StagedFile,
        destination: &Destination,
        config: &UploadableConfig,
    ) -> Result<Placement> {
        let source = file.source_path();
        let metadata = fs::metadata(source).map_err(|e| UploadError::source_unavailable(source, e))?;
        if !metadata.is_file() {
            return Err(UploadError::source_unavailable(source, "not a regular file"));
        }
        File::open(source).map_err(|e| UploadError::source_unavailable(source, e))?;

        let actual_size = metadata.len();
        if config.verify_declared_size && file.size != actual_size {
            return Err(UploadError::SizeOrTypeMismatch {
                filename: file.filename.clone(),
                reason: format!(
                    "declared {} bytes but staged payload has {}",
                    file.size, actual_size
                ),
            });
        }
        config.check_descriptor(file, Some(actual_size))?;

        let created_dirs = self.prepare_directory(&destination.directory)?;

        let (placed, backup) = match self.place_with_policy(source, destination, config) {
            Ok(placed) => placed,
            Err(err) => {
                remove_empty_dirs(&created_dirs);
                return Err(err);
            }
        };

        if let Err(err) = fs::set_permissions(&placed, metadata.permissions()) {
            event!(Level::WARN, path = %placed.display(), error = %err, "could not copy staged permissions");
        }

        event!(
            Level::DEBUG,
            source = %source.display(),
            destination = %placed.display(),
            size = actual_size,
            "staged file committed"
        );
        Ok(Placement {
            path: placed,
            source: (config.transfer == TransferMode::Move).then(|| source.to_path_buf()),
            backup,
            created_dirs,
        })
    }

    /// Reverses `placement`: a moved payload goes back to its staged source
    /// (a copy is discarded), a set-aside file returns to its place, and
    /// directories created for the placement are removed once empty.
    pub fn undo(&self, placement: &Placement) -> Result<()> {
        let path = &placement.path;
        let mut first_error = None;

        let returned = placement
            .source
            .as_deref()
            .is_some_and(|source| return_to_source(path, source));
        if !returned {
            if let Err(err) = self.discard(path) {
                first_error.get_or_insert(err);
            }
        }

        if let Some(backup) = &placement.backup {
            match fs::rename(backup, path) {
                Ok(()) => event!(Level::DEBUG, path = %path.display(), "overwritten file restored"),
                Err(e) => {
                    event!(Level::ERROR, backup = %backup.display(), error = %e, "could not restore overwritten file");
                    first_error.get_or_insert(UploadError::unwritable(path, e));
                }
            }
        }

        remove_empty_dirs(&placement.created_dirs);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Removes the file at `path`. A missing file counts as removed.
    ///
    /// Returns whether a file was actually deleted.
    pub fn discard(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                event!(Level::DEBUG, path = %path.display(), "file discarded");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(UploadError::unwritable(path, e)),
        }
    }

    fn place_with_policy(
        &self,
        source: &Path,
        destination: &Destination,
        config: &UploadableConfig,
    ) -> Result<(PathBuf, Option<PathBuf>)> {
        match config.collision {
            CollisionPolicy::Overwrite => {
                let target = destination.path();
                let backup = set_aside(&target).map_err(|e| UploadError::unwritable(&target, e))?;
                if let Err(e) = place(source, &target, config.transfer, true) {
                    if let Some(backup) = &backup {
                        if let Err(restore) = fs::rename(backup, &target) {
                            event!(Level::ERROR, backup = %backup.display(), error = %restore, "could not restore overwritten file");
                        }
                    }
                    return Err(placement_error(&target, e));
                }
                Ok((target, backup))
            }
            CollisionPolicy::Reject => {
                let target = destination.path();
                place(source, &target, config.transfer, false)
                    .map_err(|e| placement_error(&target, e))?;
                Ok((target, None))
            }
            CollisionPolicy::AutoRename => {
                let placed = self.place_first_free(source, destination, config.transfer)?;
                Ok((placed, None))
            }
        }
    }

    fn candidates<'a>(&self, destination: &'a Destination) -> impl Iterator<Item = Destination> + 'a {
        std::iter::once(destination.clone())
            .chain((1..=self.max_rename_attempts).map(move |n| destination.numbered(n)))
    }

    fn place_first_free(
        &self,
        source: &Path,
        destination: &Destination,
        transfer: TransferMode,
    ) -> Result<PathBuf> {
        for candidate in self.candidates(destination) {
            let target = candidate.path();
            match place(source, &target, transfer, false) {
                Ok(()) => return Ok(target),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(placement_error(&target, e)),
            }
        }
        Err(UploadError::DestinationCollision(destination.path()))
    }
}

fn ensure_writable_dir(directory: &Path, requested: &Path) -> Result<()> {
    let metadata = fs::metadata(directory).map_err(|e| UploadError::unwritable(requested, e))?;
    if !metadata.is_dir() {
        return Err(UploadError::unwritable(
            requested,
            format!("'{}' is not a directory", directory.display()),
        ));
    }
    if metadata.permissions().readonly() {
        return Err(UploadError::unwritable(
            requested,
            format!("'{}' is read-only", directory.display()),
        ));
    }
    Ok(())
}

/// Moves whatever sits at `target` to a reserved sibling name.
fn set_aside(target: &Path) -> io::Result<Option<PathBuf>> {
    match fs::symlink_metadata(target) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    }

    let directory = target.parent().unwrap_or_else(|| Path::new("."));
    let reserved = Builder::new()
        .prefix(".uploadable-")
        .suffix(".bak")
        .tempfile_in(directory)?
        .into_temp_path();
    fs::rename(target, &reserved)?;
    let backup = reserved.keep().map_err(|e| e.error)?;

    event!(Level::DEBUG, path = %target.display(), backup = %backup.display(), "existing file set aside");
    Ok(Some(backup))
}

fn return_to_source(placed: &Path, source: &Path) -> bool {
    if source.exists() {
        return false;
    }
    let returned = fs::rename(placed, source)
        .or_else(|_| copy_into(placed, source, false).and_then(|()| fs::remove_file(placed)));
    match returned {
        Ok(()) => {
            event!(Level::DEBUG, source = %source.display(), "placed file returned to staging");
            true
        }
        Err(e) => {
            event!(Level::WARN, source = %source.display(), error = %e, "could not return placed file to staging");
            false
        }
    }
}

/// Removes `dirs` in order, stopping at the first one still in use.
fn remove_empty_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        if fs::remove_dir(dir).is_err() {
            break;
        }
    }
}

fn placement_error(target: &Path, err: io::Error) -> UploadError {
    if err.kind() == io::ErrorKind::AlreadyExists {
        UploadError::DestinationCollision(target.to_path_buf())
    } else {
        UploadError::unwritable(target, err)
    }
}

fn place(source: &Path, target: &Path, transfer: TransferMode, clobber: bool) -> io::Result<()> {
    match transfer {
        TransferMode::Copy => copy_into(source, target, clobber),
        TransferMode::Move => {
            let linked = if clobber {
                fs::rename(source, target)
            } else {
                fs::hard_link(source, target)
            };
            match linked {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
                // Cross-device or link-less filesystems.
                Err(_) => copy_into(source, target, clobber)?,
            }
            match fs::remove_file(source) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => {
                    event!(Level::WARN, source = %source.display(), error = %e, "staged source left behind");
                    Ok(())
                }
            }
        }
    }
}

fn copy_into(source: &Path, target: &Path, clobber: bool) -> io::Result<()> {
    let directory = target.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(directory)?;
    io::copy(&mut File::open(source)?, staged.as_file_mut())?;
    staged.as_file().sync_all()?;

    if clobber {
        staged.persist(target).map_err(|e| e.error)?;
    } else {
        staged.persist_noclobber(target).map_err(|e| e.error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stage(dir: &TempDir, name: &str, body: &str) -> StagedFile {
        let path = dir.path().join(format!("staged-{}", name));
        fs::write(&path, body).unwrap();
        StagedFile::new(path, name)
            .size(body.len() as u64)
            .mime_type("text/plain")
    }

    #[test]
    fn test_commit_moves_source() {
        let tmp = TempDir::new().unwrap();
        let file = stage(&tmp, "test.txt", "test");
        let dest = Destination::new(tmp.path().join("uploads"), "test.txt");

        let placement = FileMover::new()
            .commit(&file, &dest, &UploadableConfig::new(tmp.path()))
            .unwrap();

        assert_eq!(placement.path, tmp.path().join("uploads/test.txt"));
        assert_eq!(fs::read_to_string(&placement.path).unwrap(), "test");
        assert_eq!(placement.source.as_deref(), Some(file.source.as_path()));
        assert_eq!(placement.created_dirs, vec![tmp.path().join("uploads")]);
        assert!(!file.source.exists());
    }

    #[test]
    fn test_copy_mode_keeps_source() {
        let tmp = TempDir::new().unwrap();
        let file = stage(&tmp, "test.txt", "test");
        let dest = Destination::new(tmp.path().join("uploads"), "test.txt");
        let config = UploadableConfig::new(tmp.path()).transfer(TransferMode::Copy);

        let placement = FileMover::new().commit(&file, &dest, &config).unwrap();

        assert!(placement.path.exists());
        assert!(placement.source.is_none());
        assert!(file.source.exists());
    }

    #[test]
    fn test_missing_source() {
        let tmp = TempDir::new().unwrap();
        let file = StagedFile::new(tmp.path().join("gone"), "gone.txt");
        let dest = Destination::new(tmp.path(), "gone.txt");

        let err = FileMover::new()
            .commit(&file, &dest, &UploadableConfig::new(tmp.path()))
            .unwrap_err();
        assert!(matches!(err, UploadError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_declared_size_mismatch() {
        let tmp = TempDir::new().unwrap();
        let file = stage(&tmp, "test.txt", "test").size(99);
        let dest = Destination::new(tmp.path().join("out"), "test.txt");

        let err = FileMover::new()
            .commit(&file, &dest, &UploadableConfig::new(tmp.path()))
            .unwrap_err();
        assert!(matches!(err, UploadError::SizeOrTypeMismatch { .. }));
        assert!(file.source.exists());

        let lenient = UploadableConfig::new(tmp.path()).verify_declared_size(false);
        assert!(FileMover::new().commit(&file, &dest, &lenient).is_ok());
    }

    #[test]
    fn test_reject_collision() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("test.txt"), "old").unwrap();
        let file = stage(&tmp, "test.txt", "new!");
        let dest = Destination::new(tmp.path(), "test.txt");

        let err = FileMover::new()
            .commit(&file, &dest, &UploadableConfig::new(tmp.path()))
            .unwrap_err();
        assert!(matches!(err, UploadError::DestinationCollision(_)));
        assert_eq!(fs::read_to_string(tmp.path().join("test.txt")).unwrap(), "old");
    }

    #[test]
    fn test_overwrite_collision() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("test.txt"), "old").unwrap();
        let file = stage(&tmp, "test.txt", "new!");
        let dest = Destination::new(tmp.path(), "test.txt");
        let config = UploadableConfig::new(tmp.path()).collision(CollisionPolicy::Overwrite);

        let mover = FileMover::new();
        let placement = mover.commit(&file, &dest, &config).unwrap();
        assert_eq!(fs::read_to_string(&placement.path).unwrap(), "new!");

        let backup = placement.backup.clone().unwrap();
        assert_eq!(backup.parent(), Some(tmp.path()));
        assert_eq!(fs::read_to_string(&backup).unwrap(), "old");

        mover.undo(&placement).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("test.txt")).unwrap(), "old");
        assert_eq!(fs::read_to_string(&file.source).unwrap(), "new!");
        assert!(!backup.exists());
    }

    #[test]
    fn test_undo_returns_payload_and_removes_created_dirs() {
        let tmp = TempDir::new().unwrap();
        let file = stage(&tmp, "test.txt", "test");
        let dest = Destination::new(tmp.path().join("up/images"), "test.txt");
        let mover = FileMover::new();

        let placement = mover
            .commit(&file, &dest, &UploadableConfig::new(tmp.path()))
            .unwrap();
        assert_eq!(placement.created_dirs.len(), 2);

        mover.undo(&placement).unwrap();
        assert_eq!(fs::read_to_string(&file.source).unwrap(), "test");
        assert!(!tmp.path().join("up").exists());
    }

    #[test]
    fn test_auto_rename_collision() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("test.txt"), "old").unwrap();
        fs::write(tmp.path().join("test-1.txt"), "old").unwrap();
        let file = stage(&tmp, "test.txt", "new!");
        let dest = Destination::new(tmp.path(), "test.txt");
        let config = UploadableConfig::new(tmp.path()).collision(CollisionPolicy::AutoRename);

        let placement = FileMover::new().commit(&file, &dest, &config).unwrap();
        assert_eq!(placement.path, tmp.path().join("test-2.txt"));
        assert!(placement.backup.is_none());
    }

    #[test]
    fn test_reserve_respects_claims() {
        let tmp = TempDir::new().unwrap();
        let dest = Destination::new(tmp.path(), "a.txt");
        let mut claimed = HashSet::new();
        claimed.insert(dest.path());
        let mover = FileMover::new();

        assert!(mover.reserve(&dest, CollisionPolicy::Reject, &claimed).is_err());
        assert!(mover.reserve(&dest, CollisionPolicy::Overwrite, &claimed).is_err());
        let renamed = mover.reserve(&dest, CollisionPolicy::AutoRename, &claimed).unwrap();
        assert_eq!(renamed.filename, "a-1.txt");

        assert!(mover.reserve(&dest, CollisionPolicy::Reject, &HashSet::new()).is_ok());
    }

    #[test]
    fn test_unwritable_directory() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "not a dir").unwrap();

        let err = FileMover::new().prepare_directory(&blocker.join("sub")).unwrap_err();
        assert!(matches!(err, UploadError::DestinationUnwritable { .. }));

        let err = FileMover::new().check_directory(&blocker.join("sub/deeper")).unwrap_err();
        assert!(matches!(err, UploadError::DestinationUnwritable { .. }));
    }

    #[test]
    fn test_check_directory_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let wanted = tmp.path().join("a/b/c");

        FileMover::new().check_directory(&wanted).unwrap();
        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn test_discard_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "a").unwrap();
        let mover = FileMover::new();

        assert!(mover.discard(&path).unwrap());
        assert!(!mover.discard(&path).unwrap());
        assert!(!path.exists());
    }
}
