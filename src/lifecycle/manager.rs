use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::UnitOfWork;
use crate::core::{Result, UploadError};
use crate::mover::FileMover;
use crate::staging::StagedValue;
use crate::strategy::{ConfiguredPathStrategy, PathStrategy, UploadableConfig};

/// Upload settings bound to one record type.
#[derive(Clone)]
pub struct Registration {
    pub config: UploadableConfig,
    pub strategy: Arc<dyn PathStrategy>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Registry {
    pub(crate) types: HashMap<String, Registration>,
    pub(crate) mover: FileMover,
}

/// Registry of uploadable record types and factory for units of work.
///
/// Cheap to clone; a clone is a snapshot of the registrations made so far.
/// Units of work started from it are independent, so concurrent
/// transactions each begin their own.
///
/// # Examples
///
/// ```
/// use uploadable::{StagedValue, UploadableConfig, UploadableManager};
///
/// # fn main() -> uploadable::Result<()> {
/// let mut manager = UploadableManager::new();
/// manager.register("Image", UploadableConfig::new("/srv/uploads/images"))?;
///
/// let unit = manager.begin(StagedValue::empty());
/// assert!(unit.state().is_active());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct UploadableManager {
    registry: Arc<Registry>,
}

impl UploadableManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mover(mover: FileMover) -> Self {
        Self {
            registry: Arc::new(Registry {
                types: HashMap::new(),
                mover,
            }),
        }
    }

    /// Register `record_type` with the default path strategy
    pub fn register(&mut self, record_type: &str, config: UploadableConfig) -> Result<()> {
        self.register_with_strategy(record_type, config, Arc::new(ConfiguredPathStrategy))
    }

    /// Register `record_type` with a custom directory/filename policy
    pub fn register_with_strategy(
        &mut self,
        record_type: &str,
        config: UploadableConfig,
        strategy: Arc<dyn PathStrategy>,
    ) -> Result<()> {
        if record_type.is_empty() {
            return Err(UploadError::InvalidConfig(
                "record type cannot be empty".to_string(),
            ));
        }
        config.validate()?;

        Arc::make_mut(&mut self.registry)
            .types
            .insert(record_type.to_string(), Registration { config, strategy });
        Ok(())
    }

    pub fn is_uploadable(&self, record_type: &str) -> bool {
        self.registry.types.contains_key(record_type)
    }

    pub fn registration(&self, record_type: &str) -> Result<&Registration> {
        self.registry
            .types
            .get(record_type)
            .ok_or_else(|| UploadError::UnregisteredRecordType(record_type.to_string()))
    }

    pub fn config(&self, record_type: &str) -> Result<&UploadableConfig> {
        self.registration(record_type).map(|r| &r.config)
    }

    pub fn mover(&self) -> &FileMover {
        &self.registry.mover
    }

    /// Starts a unit of work over the descriptors staged for this request.
    pub fn begin(&self, staging: StagedValue) -> UnitOfWork {
        UnitOfWork::new(self.registry.clone(), staging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut manager = UploadableManager::new();
        manager
            .register("Image", UploadableConfig::new("/srv/images"))
            .unwrap();

        assert!(manager.is_uploadable("Image"));
        assert!(!manager.is_uploadable("Article"));
        assert_eq!(
            manager.config("Image").unwrap().root,
            std::path::PathBuf::from("/srv/images")
        );

        let err = manager.config("Article").unwrap_err();
        assert!(matches!(err, UploadError::UnregisteredRecordType(_)));
    }

    #[test]
    fn test_register_validates_config() {
        let mut manager = UploadableManager::new();
        assert!(manager.register("Image", UploadableConfig::new("")).is_err());
        assert!(manager.register("", UploadableConfig::default()).is_err());
        assert!(!manager.is_uploadable("Image"));
    }

    #[test]
    fn test_clones_do_not_see_later_registrations() {
        let mut manager = UploadableManager::new();
        manager.register("Image", UploadableConfig::default()).unwrap();
        let snapshot = manager.clone();

        manager.register("File", UploadableConfig::default()).unwrap();

        assert!(manager.is_uploadable("File"));
        assert!(!snapshot.is_uploadable("File"));
    }
}
