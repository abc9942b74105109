//! In-process storage
//!
//! `MemoryTier` is the last-resort tier every persistence instance owns. Clones
//! share one map, which also lets tests stand in a single `MemoryTier` for the
//! localStorage that several tabs see.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;

use super::{BackupTier, PersistenceTier, TierKind};
use crate::error::StorageResult;

#[derive(Debug, Clone)]
pub struct MemoryTier {
    kind: TierKind,
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::with_kind(TierKind::Memory)
    }

    /// Memory map reporting as another tier kind
    pub fn with_kind(kind: TierKind) -> Self {
        Self {
            kind,
            entries: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl PersistenceTier for MemoryTier {
    fn kind(&self) -> TierKind {
        self.kind
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Memory map behind the async backup interface (native builds and tests)
#[derive(Debug, Clone)]
pub struct MemoryBackup {
    inner: MemoryTier,
}

impl Default for MemoryBackup {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackup {
    pub fn new() -> Self {
        Self {
            inner: MemoryTier::with_kind(TierKind::IndexedDb),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait(?Send)]
impl BackupTier for MemoryBackup {
    fn kind(&self) -> TierKind {
        self.inner.kind()
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key)
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner.set(key, value)
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key)
    }
}
