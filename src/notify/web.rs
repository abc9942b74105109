//! Browser change notifiers

use std::cell::RefCell;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{BroadcastChannel, MessageEvent, StorageEvent, Window};

use super::{ChangeEvent, ChangeListener, ChangeNotifier, ChangeSource, VerificationChange};
use crate::config::VerificationConfig;
use crate::error::{StorageError, StorageResult};

/// BroadcastChannel adapter
pub struct BroadcastChannelNotifier {
    channel: BroadcastChannel,
    handlers: RefCell<Vec<Closure<dyn FnMut(MessageEvent)>>>,
}

impl BroadcastChannelNotifier {
    pub fn open(name: &str) -> StorageResult<Self> {
        let channel = BroadcastChannel::new(name)
            .map_err(|e| StorageError::ChannelUnavailable(format!("{:?}", e)))?;
        Ok(Self {
            channel,
            handlers: RefCell::new(Vec::new()),
        })
    }
}

impl ChangeNotifier for BroadcastChannelNotifier {
    fn publish(&self, change: &VerificationChange) -> StorageResult<()> {
        let json = serde_json::to_string(change)
            .map_err(|e| StorageError::ChannelUnavailable(e.to_string()))?;
        self.channel
            .post_message(&JsValue::from_str(&json))
            .map_err(|e| StorageError::ChannelUnavailable(format!("{:?}", e)))
    }

    fn subscribe(&self, listener: ChangeListener) -> StorageResult<()> {
        let closure = Closure::<dyn FnMut(_)>::new(move |event: MessageEvent| {
            let change = event
                .data()
                .as_string()
                .and_then(|json| match serde_json::from_str::<VerificationChange>(&json) {
                    Ok(change) => Some(change),
                    Err(e) => {
                        log::warn!("Ignoring malformed broadcast payload: {}", e);
                        None
                    }
                });
            listener(ChangeEvent {
                source: ChangeSource::Broadcast,
                change,
            });
        });
        self.channel
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            .map_err(|e| StorageError::ChannelUnavailable(format!("{:?}", e)))?;
        self.handlers.borrow_mut().push(closure);
        Ok(())
    }
}

impl Drop for BroadcastChannelNotifier {
    fn drop(&mut self) {
        self.channel.close();
    }
}

/// `storage` event adapter.
///
/// Browsers fire the event in every other tab when localStorage changes, so
/// publishing is a no-op. Only the verified flag is forwarded (a save or
/// clear touches three keys); a `null` key means `localStorage.clear()` and
/// is forwarded too.
pub struct StorageEventNotifier {
    window: Window,
    config: VerificationConfig,
    handlers: RefCell<Vec<Closure<dyn FnMut(StorageEvent)>>>,
}

impl StorageEventNotifier {
    pub fn new(config: &VerificationConfig) -> StorageResult<Self> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::ChannelUnavailable("no window".to_string()))?;
        Ok(Self {
            window,
            config: config.clone(),
            handlers: RefCell::new(Vec::new()),
        })
    }
}

impl ChangeNotifier for StorageEventNotifier {
    fn publish(&self, _change: &VerificationChange) -> StorageResult<()> {
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> StorageResult<()> {
        let config = self.config.clone();
        let closure = Closure::<dyn FnMut(_)>::new(move |event: StorageEvent| {
            if config.is_verification_signal(event.key().as_deref()) {
                listener(ChangeEvent {
                    source: ChangeSource::StorageEvent,
                    change: None,
                });
            }
        });
        self.window
            .add_event_listener_with_callback("storage", closure.as_ref().unchecked_ref())
            .map_err(|e| StorageError::ChannelUnavailable(format!("{:?}", e)))?;
        self.handlers.borrow_mut().push(closure);
        Ok(())
    }
}

impl Drop for StorageEventNotifier {
    fn drop(&mut self) {
        for closure in self.handlers.borrow().iter() {
            let _ = self
                .window
                .remove_event_listener_with_callback("storage", closure.as_ref().unchecked_ref());
        }
    }
}
