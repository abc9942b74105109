//! `localStorage` / `sessionStorage` tiers

use web_sys::Storage;

use super::{PersistenceTier, TierKind};
use crate::error::{StorageError, StorageResult};

pub struct WebStorageTier {
    kind: TierKind,
    storage: Storage,
}

impl WebStorageTier {
    /// `window.localStorage`; throws in some private modes
    pub fn local() -> StorageResult<Self> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?;
        let storage = window
            .local_storage()
            .map_err(StorageError::from_js)?
            .ok_or_else(|| StorageError::Unavailable("localStorage missing".to_string()))?;
        Ok(Self {
            kind: TierKind::LocalStorage,
            storage,
        })
    }

    pub fn session() -> StorageResult<Self> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?;
        let storage = window
            .session_storage()
            .map_err(StorageError::from_js)?
            .ok_or_else(|| StorageError::Unavailable("sessionStorage missing".to_string()))?;
        Ok(Self {
            kind: TierKind::SessionStorage,
            storage,
        })
    }
}

impl PersistenceTier for WebStorageTier {
    fn kind(&self) -> TierKind {
        self.kind
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.storage.get_item(key).map_err(StorageError::from_js)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.storage
            .set_item(key, value)
            .map_err(StorageError::from_js)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.storage.remove_item(key).map_err(StorageError::from_js)
    }
}
