//! Storage tiers for the verification fallback chain
//!
//! Tiers, in descending priority:
//! 1. `localStorage` - survives browser restarts
//! 2. `sessionStorage` - only when localStorage is unusable
//! 3. IndexedDB - async backup, consulted last
//! 4. In-process memory - lost on reload
//!
//! Every method reports faults as `StorageError` so the chain can skip the
//! tier and move on.

pub mod memory;

#[cfg(target_arch = "wasm32")]
pub mod indexed_db;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use memory::{MemoryBackup, MemoryTier};

#[cfg(target_arch = "wasm32")]
pub use indexed_db::IndexedDbTier;
#[cfg(target_arch = "wasm32")]
pub use web::WebStorageTier;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StorageResult;

/// Which storage mechanism backs a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TierKind {
    LocalStorage,
    SessionStorage,
    IndexedDb,
    Memory,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::LocalStorage => "localStorage",
            TierKind::SessionStorage => "sessionStorage",
            TierKind::IndexedDb => "indexedDB",
            TierKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous key/value tier
pub trait PersistenceTier {
    fn kind(&self) -> TierKind;

    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Live write-then-delete check
    fn probe(&self, key: &str) -> StorageResult<()> {
        self.set(key, "1")?;
        self.remove(key)
    }
}

/// Asynchronous backup tier (IndexedDB on the web)
#[async_trait(?Send)]
pub trait BackupTier {
    fn kind(&self) -> TierKind;

    /// Whether the backing API exists at all
    fn is_available(&self) -> bool;

    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Live write-then-delete check
    async fn probe(&self, key: &str) -> StorageResult<()> {
        self.set(key, "1").await?;
        self.remove(key).await
    }
}
