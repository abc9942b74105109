//! Test doubles for storage that throws

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::persistence::{BackupTier, MemoryTier, PersistenceTier, TierKind};

/// Memory tier that can be switched into "every call throws"; clones share
/// both the map and the switch
#[derive(Debug, Clone)]
pub struct FlakyTier {
    inner: MemoryTier,
    failing: Rc<Cell<bool>>,
}

impl FlakyTier {
    pub fn new(kind: TierKind) -> Self {
        Self {
            inner: MemoryTier::with_kind(kind),
            failing: Rc::new(Cell::new(false)),
        }
    }

    pub fn failing(kind: TierKind) -> Self {
        let tier = Self::new(kind);
        tier.set_failing(true);
        tier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn inner(&self) -> &MemoryTier {
        &self.inner
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.get() {
            Err(StorageError::Unavailable(format!(
                "{} access denied",
                self.inner.kind()
            )))
        } else {
            Ok(())
        }
    }
}

impl PersistenceTier for FlakyTier {
    fn kind(&self) -> TierKind {
        self.inner.kind()
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.remove(key)
    }
}

/// Backup that reports itself available but rejects every request
pub struct FailingBackup;

#[async_trait(?Send)]
impl BackupTier for FailingBackup {
    fn kind(&self) -> TierKind {
        TierKind::IndexedDb
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Unavailable("indexedDB blocked".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::QuotaExceeded("indexedDB full".to_string()))
    }

    async fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("indexedDB blocked".to_string()))
    }
}
