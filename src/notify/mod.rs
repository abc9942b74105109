//! Cross-tab change notification
//!
//! One logical "verification changed" event, whichever mechanism carried it:
//! - `BroadcastChannelNotifier` - origin-scoped pub/sub (web)
//! - `StorageEventNotifier` - the `storage` event browsers fire in other tabs
//!   when localStorage changes (web)
//! - `LocalChannel` - in-process hub, one endpoint per simulated tab
//!
//! Payloads are hints only. Receivers must re-read storage, since several
//! tabs may race to write.

#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(target_arch = "wasm32")]
pub use web::{BroadcastChannelNotifier, StorageEventNotifier};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Broadcast payload: `{"verified":true,"timestamp":<ms>}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChange {
    pub verified: bool,
    pub timestamp: u64,
}

/// Mechanism that delivered a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    Broadcast,
    StorageEvent,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub source: ChangeSource,
    /// `None` when the mechanism carries no payload or it failed to decode
    pub change: Option<VerificationChange>,
}

pub type ChangeListener = Rc<dyn Fn(ChangeEvent)>;

/// Publish/subscribe port for verification changes
pub trait ChangeNotifier {
    fn publish(&self, change: &VerificationChange) -> StorageResult<()>;

    fn subscribe(&self, listener: ChangeListener) -> StorageResult<()>;
}

/// Fans out to several adapters
#[derive(Default)]
pub struct CompositeNotifier {
    notifiers: Vec<Box<dyn ChangeNotifier>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Box<dyn ChangeNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl ChangeNotifier for CompositeNotifier {
    /// Succeeds if any adapter delivered
    fn publish(&self, change: &VerificationChange) -> StorageResult<()> {
        let mut last_err = None;
        let mut delivered = false;
        for notifier in &self.notifiers {
            match notifier.publish(change) {
                Ok(()) => delivered = true,
                Err(e) => last_err = Some(e),
            }
        }
        if delivered {
            return Ok(());
        }
        Err(last_err.unwrap_or_else(|| {
            StorageError::ChannelUnavailable("no notifiers configured".to_string())
        }))
    }

    fn subscribe(&self, listener: ChangeListener) -> StorageResult<()> {
        let mut subscribed = false;
        let mut last_err = None;
        for notifier in &self.notifiers {
            match notifier.subscribe(listener.clone()) {
                Ok(()) => subscribed = true,
                Err(e) => last_err = Some(e),
            }
        }
        if subscribed {
            return Ok(());
        }
        Err(last_err.unwrap_or_else(|| {
            StorageError::ChannelUnavailable("no notifiers configured".to_string())
        }))
    }
}

struct Subscriber {
    endpoint: usize,
    listener: ChangeListener,
}

#[derive(Default)]
struct Hub {
    next_endpoint: Cell<usize>,
    subscribers: RefCell<Vec<Subscriber>>,
}

/// In-process broadcast hub; each endpoint behaves like one tab
#[derive(Clone, Default)]
pub struct LocalChannel {
    hub: Rc<Hub>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self) -> LocalEndpoint {
        let id = self.hub.next_endpoint.get();
        self.hub.next_endpoint.set(id + 1);
        LocalEndpoint {
            id,
            hub: self.hub.clone(),
        }
    }
}

pub struct LocalEndpoint {
    id: usize,
    hub: Rc<Hub>,
}

impl ChangeNotifier for LocalEndpoint {
    /// Delivers to every other endpoint, never back to the sender
    fn publish(&self, change: &VerificationChange) -> StorageResult<()> {
        // Snapshot first so listeners may publish or subscribe re-entrantly
        let targets: Vec<ChangeListener> = self
            .hub
            .subscribers
            .borrow()
            .iter()
            .filter(|s| s.endpoint != self.id)
            .map(|s| s.listener.clone())
            .collect();

        let event = ChangeEvent {
            source: ChangeSource::Local,
            change: Some(*change),
        };
        for listener in targets {
            listener(event);
        }
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> StorageResult<()> {
        self.hub.subscribers.borrow_mut().push(Subscriber {
            endpoint: self.id,
            listener,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DeadNotifier;

    impl ChangeNotifier for DeadNotifier {
        fn publish(&self, _change: &VerificationChange) -> StorageResult<()> {
            Err(StorageError::ChannelUnavailable("dead".into()))
        }

        fn subscribe(&self, _listener: ChangeListener) -> StorageResult<()> {
            Err(StorageError::ChannelUnavailable("dead".into()))
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<ChangeEvent>>>, ChangeListener) {
        let seen = Rc::new(RefCell::new(Vec::<ChangeEvent>::new()));
        let sink = seen.clone();
        (seen, Rc::new(move |e: ChangeEvent| sink.borrow_mut().push(e)))
    }

    #[test]
    fn test_payload_json_shape() {
        let change = VerificationChange {
            verified: true,
            timestamp: 1234,
        };
        assert_eq!(
            serde_json::to_string(&change).unwrap(),
            r#"{"verified":true,"timestamp":1234}"#
        );
    }

    #[test]
    fn test_local_channel_skips_sender() {
        let channel = LocalChannel::new();
        let tab_a = channel.endpoint();
        let tab_b = channel.endpoint();

        let (seen_a, listener_a) = recorder();
        let (seen_b, listener_b) = recorder();
        tab_a.subscribe(listener_a).unwrap();
        tab_b.subscribe(listener_b).unwrap();

        let change = VerificationChange {
            verified: true,
            timestamp: 1,
        };
        tab_a.publish(&change).unwrap();

        assert!(seen_a.borrow().is_empty());
        assert_eq!(seen_b.borrow().len(), 1);
        assert_eq!(seen_b.borrow()[0].change, Some(change));
        assert_eq!(seen_b.borrow()[0].source, ChangeSource::Local);
    }

    #[test]
    fn test_composite_tolerates_dead_adapter() {
        let channel = LocalChannel::new();
        let composite = CompositeNotifier::new()
            .with(Box::new(DeadNotifier))
            .with(Box::new(channel.endpoint()));
        let other = channel.endpoint();
        let (seen, listener) = recorder();
        other.subscribe(listener).unwrap();

        composite
            .publish(&VerificationChange {
                verified: true,
                timestamp: 5,
            })
            .unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_composite_all_dead() {
        let composite = CompositeNotifier::new().with(Box::new(DeadNotifier));
        let change = VerificationChange {
            verified: false,
            timestamp: 0,
        };
        assert!(matches!(
            composite.publish(&change),
            Err(StorageError::ChannelUnavailable(_))
        ));
        assert!(CompositeNotifier::new().publish(&change).is_err());
    }
}
