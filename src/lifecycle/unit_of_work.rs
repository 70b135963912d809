use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Level, event, info_span};

use super::manager::{Registration, Registry};
use super::state::{CommitReport, CommittedFile, FileState, UnitId, UnitState};
use crate::core::{FieldValue, RecordChange, RecordKey, RecordRef, Result, StagingSlot, UploadError};
use crate::ledger::{Ledger, OperationState, PendingKind, PendingOperation};
use crate::mover::Placement;
use crate::staging::{Resolution, StagedFile, StagedValue, resolve_descriptors};
use crate::storage::RecordStore;
use crate::strategy::{PathContext, UploadableConfig, plan_destination};

/// File lifecycle of one persistence transaction.
///
/// The transaction owner drives it through three hooks:
///
/// 1. [`on_validate`] for every created, updated or removed record, before
///    the engine writes anything. Uploads get their destination reserved and
///    written into the record's path field, so the engine persists the path
///    together with the rest of the record.
/// 2. [`on_transaction_committed`] once the engine has committed. New files
///    are placed first; superseded and removed files are discarded only
///    after every placement succeeded.
/// 3. [`on_transaction_rollback`] if the transaction fails at any point
///    before the commit hook returns.
///
/// Any error raised by a hook rolls the unit back before it is returned.
///
/// [`on_validate`]: UnitOfWork::on_validate
/// [`on_transaction_committed`]: UnitOfWork::on_transaction_committed
/// [`on_transaction_rollback`]: UnitOfWork::on_transaction_rollback
#[derive(Debug)]
pub struct UnitOfWork {
    id: UnitId,
    state: UnitState,
    registry: Arc<Registry>,
    staging: StagedValue,
    ledger: Ledger,
    /// Next free list position per sequence slot.
    cursors: HashMap<Vec<String>, usize>,
    /// Positions already handed out, so a re-validated record keeps its own.
    positions: HashMap<RecordKey, usize>,
    started: Instant,
}

impl UnitOfWork {
    pub(crate) fn new(registry: Arc<Registry>, staging: StagedValue) -> Self {
        Self {
            id: UnitId::new(),
            state: UnitState::Active,
            registry,
            staging,
            ledger: Ledger::new(),
            cursors: HashMap::new(),
            positions: HashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn file_state(&self, record: &RecordKey) -> FileState {
        match self.ledger.get(record) {
            None => FileState::Untouched,
            Some(op) => match op.kind {
                PendingKind::Create => FileState::MovePending,
                PendingKind::Replace => FileState::ReplacePending,
                PendingKind::Delete => FileState::DeletePending,
            },
        }
    }

    /// Pre-commit hook for one record.
    ///
    /// Records of unregistered types are ignored. A created or updated
    /// record with nothing staged for it is left untouched; removal always
    /// schedules deletion of the current file, even if an upload is staged.
    pub fn on_validate(
        &mut self,
        store: &mut dyn RecordStore,
        record: &RecordRef,
        change: RecordChange,
    ) -> Result<()> {
        self.ensure_active("validate")?;

        let Some(registration) = self.registry.types.get(record.record_type()).cloned() else {
            event!(Level::TRACE, record = %record.key, "record type not uploadable");
            return Ok(());
        };

        match self.validate_record(store, record, change, &registration) {
            Ok(()) => Ok(()),
            Err(err) => {
                event!(Level::ERROR, unit = %self.id, record = %record.key, error = %err, "upload validation failed");
                if let Err(undo) = self.abort(store) {
                    event!(Level::ERROR, unit = %self.id, error = %undo, "rollback after failed validation incomplete");
                }
                Err(err)
            }
        }
    }

    /// Post-commit hook: materialise uploads, then discard superseded files.
    pub fn on_transaction_committed(&mut self, store: &mut dyn RecordStore) -> Result<CommitReport> {
        self.ensure_active("commit")?;
        let span = info_span!("uploadable.unit.commit", unit = %self.id, pending = self.ledger.len());
        let _enter = span.enter();

        if let Err(err) = self.place_uploads(store) {
            event!(Level::ERROR, error = %err, "upload commit failed; undoing placed files");
            if let Err(undo) = self.abort(store) {
                event!(Level::ERROR, error = %undo, "undo after failed commit incomplete");
            }
            return Err(err);
        }

        let report = self.settle();
        self.state = UnitState::Committed;
        self.reset();

        event!(
            Level::DEBUG,
            committed = report.committed.len(),
            deleted = report.deleted.len(),
            failed_discards = report.failed_discards.len(),
            "unit committed"
        );
        Ok(report)
    }

    /// Rollback hook: discard anything placed and restore every field this
    /// unit wrote. Rolling back an aborted unit is a no-op.
    pub fn on_transaction_rollback(&mut self, store: &mut dyn RecordStore) -> Result<()> {
        match self.state {
            UnitState::Aborted => Ok(()),
            UnitState::Committed => Err(UploadError::InvalidState(format!(
                "cannot roll back {}: already {}",
                self.id, self.state
            ))),
            UnitState::Active => {
                let span = info_span!("uploadable.unit.rollback", unit = %self.id, pending = self.ledger.len());
                let _enter = span.enter();
                self.abort(store)
            }
        }
    }

    fn ensure_active(&self, action: &str) -> Result<()> {
        if !self.state.is_active() {
            return Err(UploadError::InvalidState(format!(
                "cannot {}: unit {} is {}",
                action, self.id, self.state
            )));
        }
        Ok(())
    }

    fn validate_record(
        &mut self,
        store: &mut dyn RecordStore,
        record: &RecordRef,
        change: RecordChange,
        registration: &Registration,
    ) -> Result<()> {
        let config = &registration.config;

        // A repeat event keeps the values from before this unit first
        // touched the record.
        let prior_fields = match self.ledger.get(&record.key) {
            Some(existing) => existing.prior_fields.clone(),
            None => read_managed_fields(&*store, &record.key, config)?,
        };
        let prior_path = prior_fields
            .first()
            .and_then(|(_, value)| value.as_path());

        if change == RecordChange::Removed {
            if prior_path.is_none() && !self.ledger.contains(&record.key) {
                return Ok(());
            }
            let mut op = PendingOperation::new(record.key.clone(), PendingKind::Delete, prior_path);
            op.prior_fields = prior_fields;
            event!(Level::DEBUG, record = %record.key, "delete pending");
            self.ledger.insert(op);
            return Ok(());
        }

        let Some(file) = self.descriptor_for(record)? else {
            return Ok(());
        };

        if let Some(transport) = file.transport_error() {
            return Err(UploadError::TransportFailure {
                filename: file.filename.clone(),
                reason: transport.to_string(),
            });
        }
        config.check_descriptor(&file, None)?;

        let planned = {
            let ctx = PathContext {
                record: &record.key,
                config,
                store: &*store,
            };
            plan_destination(registration.strategy.as_ref(), &ctx, &file)?
        };
        // Nothing touches the filesystem before the transaction commits.
        let mover = &self.registry.mover;
        mover.check_directory(&planned.directory)?;
        let destination = mover.reserve(
            &planned,
            config.collision,
            &self.ledger.claimed_paths(&record.key),
        )?;

        let kind = if prior_path.is_some() {
            PendingKind::Replace
        } else {
            PendingKind::Create
        };
        let mut op = PendingOperation::new(record.key.clone(), kind, prior_path)
            .with_upload(file.clone(), destination.clone());
        op.prior_fields = prior_fields;
        self.ledger.insert(op);

        // The ledger entry exists before any field is touched, so a failed
        // write below still gets reverted.
        write_upload_fields(store, &record.key, config, &file, &destination.path(), &destination.filename)?;

        event!(
            Level::DEBUG,
            record = %record.key,
            kind = ?kind,
            destination = %destination,
            "upload pending"
        );
        Ok(())
    }

    fn descriptor_for(&mut self, record: &RecordRef) -> Result<Option<StagedFile>> {
        let (keys, position) = match &record.slot {
            StagingSlot::Detached => return Ok(None),
            StagingSlot::Single(keys) => (keys, None),
            StagingSlot::Sequence(keys) => {
                let position = match self.positions.get(&record.key) {
                    Some(&assigned) => assigned,
                    None => {
                        let cursor = self.cursors.entry(keys.clone()).or_insert(0);
                        let assigned = *cursor;
                        *cursor += 1;
                        self.positions.insert(record.key.clone(), assigned);
                        assigned
                    }
                };
                (keys, Some(position))
            }
        };

        let resolution = resolve_descriptors(&self.staging, keys.as_slice())?;
        let file = match (position, &resolution) {
            (None, Resolution::Many(_)) => {
                return Err(UploadError::MalformedDescriptor(
                    keys.join("."),
                    "expected a single staged file, found a list".to_string(),
                ));
            }
            (None, _) => resolution.at(0),
            (Some(position), _) => resolution.at(position),
        };

        Ok(file.filter(|f| !f.is_empty_submission()).cloned())
    }

    fn place_uploads(&mut self, store: &mut dyn RecordStore) -> Result<()> {
        let registry = self.registry.clone();

        for op in self.ledger.iter_mut() {
            if !op.is_upload() || op.state != OperationState::Pending {
                continue;
            }
            let (Some(file), Some(destination)) = (&op.descriptor, &op.destination) else {
                continue;
            };
            let registration = registry
                .types
                .get(&op.record.record_type)
                .ok_or_else(|| UploadError::UnregisteredRecordType(op.record.record_type.clone()))?;
            let config = &registration.config;

            let placement = registry.mover.commit(file, destination, config)?;
            let placed = placement.path.clone();
            op.state = OperationState::Executed(placement);

            if placed != destination.path() {
                // The reserved name was taken after validation.
                let filename = placed
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                write_upload_fields(store, &op.record, config, file, &placed, &filename)?;
                event!(Level::DEBUG, record = %op.record, path = %placed.display(), "upload renamed at commit");
            }
        }
        Ok(())
    }

    fn settle(&mut self) -> CommitReport {
        let mover = &self.registry.mover;
        let mut report = CommitReport::new(self.id);

        // Never discard a path this unit just placed a file at.
        let placed: HashSet<PathBuf> = self
            .ledger
            .iter()
            .filter_map(|op| op.executed_path().map(|p| p.to_path_buf()))
            .collect();

        for op in self.ledger.iter_mut() {
            if let OperationState::Executed(Placement { backup: Some(backup), .. }) = &op.state {
                if let Err(err) = mover.discard(backup) {
                    event!(Level::ERROR, record = %op.record, path = %backup.display(), error = %err, "could not discard overwritten file");
                    report.failed_discards.push((backup.clone(), err.to_string()));
                }
            }

            let discard = match op.kind {
                PendingKind::Create => None,
                PendingKind::Replace | PendingKind::Delete => op.prior_path.clone(),
            }
            .filter(|p| !placed.contains(p));

            if let Some(old) = &discard {
                if let Err(err) = mover.discard(old) {
                    event!(Level::ERROR, record = %op.record, path = %old.display(), error = %err, "could not discard file");
                    report.failed_discards.push((old.clone(), err.to_string()));
                }
            }

            match op.kind {
                PendingKind::Delete => {
                    if let Some(old) = discard {
                        report.deleted.push((op.record.clone(), old));
                    }
                }
                PendingKind::Create | PendingKind::Replace => {
                    if let Some(path) = op.executed_path() {
                        report.committed.push(CommittedFile {
                            record: op.record.clone(),
                            path: path.to_path_buf(),
                            superseded: discard,
                        });
                    }
                }
            }
            op.state = OperationState::Settled;
        }

        report.duration = self.started.elapsed();
        report
    }

    /// Undo replay over the ledger, newest entry first.
    fn abort(&mut self, store: &mut dyn RecordStore) -> Result<()> {
        let mover = &self.registry.mover;
        let mut first_error = None;

        let operations: Vec<PendingOperation> = self.ledger.drain().collect();
        for op in operations.iter().rev() {
            if let OperationState::Executed(placement) = &op.state {
                match mover.undo(placement) {
                    Ok(()) => event!(Level::WARN, record = %op.record, path = %placement.path.display(), "placed file undone"),
                    Err(err) => {
                        event!(Level::ERROR, record = %op.record, error = %err, "could not undo placed file");
                        first_error.get_or_insert(err);
                    }
                }
            }

            for (field, value) in &op.prior_fields {
                if let Err(err) = store.assign_field(&op.record, field, value.clone()) {
                    event!(Level::ERROR, record = %op.record, field = %field, error = %err, "could not revert field");
                    first_error.get_or_insert(err);
                }
            }
        }

        self.state = UnitState::Aborted;
        self.reset();
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn reset(&mut self) {
        self.ledger.clear();
        self.cursors.clear();
        self.positions.clear();
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.state.is_active() && !self.ledger.is_empty() {
            event!(
                Level::WARN,
                unit = %self.id,
                pending = self.ledger.len(),
                "unit of work dropped while active; pending uploads discarded"
            );
        }
    }
}

/// Reads every field the config manages, path field first.
fn read_managed_fields(
    store: &dyn RecordStore,
    record: &RecordKey,
    config: &UploadableConfig,
) -> Result<Vec<(String, FieldValue)>> {
    managed_fields(config)
        .map(|field| Ok((field.to_string(), store.read_field(record, field)?)))
        .collect()
}

fn managed_fields(config: &UploadableConfig) -> impl Iterator<Item = &str> {
    std::iter::once(config.file_path_field.as_str()).chain(
        [
            config.file_name_field.as_deref(),
            config.file_mime_type_field.as_deref(),
            config.file_size_field.as_deref(),
        ]
        .into_iter()
        .flatten(),
    )
}

fn write_upload_fields(
    store: &mut dyn RecordStore,
    record: &RecordKey,
    config: &UploadableConfig,
    file: &StagedFile,
    path: &std::path::Path,
    filename: &str,
) -> Result<()> {
    store.assign_field(record, &config.file_path_field, FieldValue::from(path))?;
    if let Some(field) = &config.file_name_field {
        store.assign_field(record, field, FieldValue::from(filename))?;
    }
    if let Some(field) = &config.file_mime_type_field {
        store.assign_field(record, field, FieldValue::from(file.mime_type.as_str()))?;
    }
    if let Some(field) = &config.file_size_field {
        store.assign_field(record, field, FieldValue::from(file.size))?;
    }
    Ok(())
}
