//! IndexedDB backup tier
//!
//! One object store with out-of-line string keys, mirroring the
//! localStorage key layout. Requests are bridged to futures through a JS
//! promise resolved from the request's success/error handlers.

use std::cell::RefCell;

use async_trait::async_trait;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{IdbDatabase, IdbFactory, IdbObjectStore, IdbRequest, IdbTransactionMode};

use super::{BackupTier, TierKind};
use crate::config::VerificationConfig;
use crate::consts::DB_VERSION;
use crate::error::{StorageError, StorageResult};

pub struct IndexedDbTier {
    db_name: String,
    store_name: String,
    /// Opened lazily on first use
    db: RefCell<Option<IdbDatabase>>,
}

impl IndexedDbTier {
    pub fn new(config: &VerificationConfig) -> Self {
        Self {
            db_name: config.db_name.clone(),
            store_name: config.store_name.clone(),
            db: RefCell::new(None),
        }
    }

    fn factory() -> StorageResult<IdbFactory> {
        web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?
            .indexed_db()
            .map_err(StorageError::from_js)?
            .ok_or_else(|| StorageError::Unavailable("indexedDB missing".to_string()))
    }

    async fn database(&self) -> StorageResult<IdbDatabase> {
        if let Some(db) = self.db.borrow().as_ref() {
            return Ok(db.clone());
        }

        let request = Self::factory()?
            .open_with_u32(&self.db_name, DB_VERSION)
            .map_err(StorageError::from_js)?;

        // First open (or version bump) creates the object store
        let store_name = self.store_name.clone();
        let upgrade_request = request.clone();
        let on_upgrade = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
            let Ok(result) = upgrade_request.result() else {
                return;
            };
            let Ok(db) = result.dyn_into::<IdbDatabase>() else {
                return;
            };
            if !db.object_store_names().contains(&store_name) {
                if let Err(e) = db.create_object_store(&store_name) {
                    log::warn!("indexedDB: failed to create store: {:?}", e);
                }
            }
        });
        request.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));

        let opened = await_request(&request).await;
        request.set_onupgradeneeded(None);
        drop(on_upgrade);

        let db = opened?
            .dyn_into::<IdbDatabase>()
            .map_err(|_| StorageError::Unavailable("indexedDB open returned no database".into()))?;
        *self.db.borrow_mut() = Some(db.clone());
        Ok(db)
    }

    async fn store(&self, mode: IdbTransactionMode) -> StorageResult<IdbObjectStore> {
        let db = self.database().await?;
        let tx = db
            .transaction_with_str_and_mode(&self.store_name, mode)
            .map_err(StorageError::from_js)?;
        tx.object_store(&self.store_name)
            .map_err(StorageError::from_js)
    }
}

#[async_trait(?Send)]
impl BackupTier for IndexedDbTier {
    fn kind(&self) -> TierKind {
        TierKind::IndexedDb
    }

    fn is_available(&self) -> bool {
        Self::factory().is_ok()
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let store = self.store(IdbTransactionMode::Readonly).await?;
        let request = store
            .get(&JsValue::from_str(key))
            .map_err(StorageError::from_js)?;
        let value = await_request(&request).await?;
        Ok(value.as_string())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let store = self.store(IdbTransactionMode::Readwrite).await?;
        let request = store
            .put_with_key(&JsValue::from_str(value), &JsValue::from_str(key))
            .map_err(StorageError::from_js)?;
        await_request(&request).await.map(|_| ())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let store = self.store(IdbTransactionMode::Readwrite).await?;
        let request = store
            .delete(&JsValue::from_str(key))
            .map_err(StorageError::from_js)?;
        await_request(&request).await.map(|_| ())
    }
}

/// Wait for an IDB request to fire `success` or `error`
async fn await_request(request: &IdbRequest) -> StorageResult<JsValue> {
    let mut handlers = Vec::with_capacity(2);
    let promise = js_sys::Promise::new(&mut |resolve, reject| {
        let on_success = Closure::once(move |_event: web_sys::Event| {
            let _ = resolve.call0(&JsValue::NULL);
        });
        let on_error = Closure::once(move |_event: web_sys::Event| {
            let _ = reject.call0(&JsValue::NULL);
        });
        request.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        request.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        handlers.push(on_success);
        handlers.push(on_error);
    });

    let outcome = JsFuture::from(promise).await;
    request.set_onsuccess(None);
    request.set_onerror(None);
    drop(handlers);

    match outcome {
        Ok(_) => request.result().map_err(StorageError::from_js),
        Err(_) => Err(request
            .error()
            .ok()
            .flatten()
            .map(|ex| StorageError::from_js(ex.into()))
            .unwrap_or_else(|| StorageError::Unavailable("indexedDB request failed".into()))),
    }
}
