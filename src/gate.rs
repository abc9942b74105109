//! Age gate state
//!
//! Sits between the persistence layer and whatever draws the overlay. The UI
//! subscribes with `on_change` and calls `confirm`/`reset` from its buttons;
//! the gate re-checks storage on focus, visibility and cross-tab signals.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::platform;
use crate::verification::VerificationPersistence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    /// Sync tiers said no, backup not consulted yet
    #[default]
    Checking,
    /// Ask the visitor
    Prompt,
    Verified,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Checking => "checking",
            GateState::Prompt => "prompt",
            GateState::Verified => "verified",
        }
    }

    /// Whether the overlay should cover the page
    pub fn blocks_content(&self) -> bool {
        *self != GateState::Verified
    }
}

type StateListener = Rc<dyn Fn(GateState)>;

pub struct AgeGate {
    persistence: Rc<VerificationPersistence>,
    state: Cell<GateState>,
    listeners: RefCell<Vec<StateListener>>,
}

impl AgeGate {
    /// Create the gate and follow changes made in other tabs
    pub fn new(persistence: Rc<VerificationPersistence>) -> Rc<Self> {
        let gate = Rc::new(Self {
            persistence,
            state: Cell::new(GateState::Checking),
            listeners: RefCell::new(Vec::new()),
        });

        let weak = Rc::downgrade(&gate);
        let watched = gate.persistence.watch(move |verified| {
            if let Some(gate) = weak.upgrade() {
                gate.apply(verified);
            }
        });
        if let Err(e) = watched {
            log::warn!("Age gate will not follow other tabs: {}", e);
        }

        gate
    }

    pub fn state(&self) -> GateState {
        self.state.get()
    }

    pub fn persistence(&self) -> &Rc<VerificationPersistence> {
        &self.persistence
    }

    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(GateState) + 'static,
    {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Fast path used on mount; leaves `Checking` alone when unverified so
    /// the prompt does not flash before the backup tier answers
    pub fn check(&self) -> GateState {
        if self.persistence.is_verified_sync() {
            self.set_state(GateState::Verified);
        } else if self.state() != GateState::Checking {
            self.set_state(GateState::Prompt);
        }
        self.state()
    }

    /// Full check including the backup tier
    pub async fn check_async(&self) -> GateState {
        let verified = self.persistence.is_verified_async().await;
        self.apply(verified);
        self.state()
    }

    /// Re-check in the background (focus, visibility change)
    pub fn refresh(self: &Rc<Self>) {
        let gate = Rc::clone(self);
        platform::spawn_local(async move {
            gate.check_async().await;
        });
    }

    /// Visitor affirmed their age
    pub fn confirm(&self) {
        self.persistence.save();
        self.set_state(GateState::Verified);
    }

    /// Forget the verification and show the prompt again
    pub fn reset(&self) {
        self.persistence.clear();
        self.set_state(GateState::Prompt);
    }

    fn apply(&self, verified: bool) {
        self.set_state(if verified {
            GateState::Verified
        } else {
            GateState::Prompt
        });
    }

    fn set_state(&self, next: GateState) {
        if self.state.replace(next) == next {
            return;
        }
        log::debug!("Age gate -> {}", next.as_str());

        let listeners: Vec<StateListener> = self.listeners.borrow().clone();
        for listener in listeners {
            listener(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerificationConfig;
    use crate::consts::DAY_MS;
    use crate::notify::LocalChannel;
    use crate::persistence::{MemoryBackup, MemoryTier, TierKind};
    use crate::platform::ManualClock;
    use futures::executor::block_on;

    const START: u64 = 1_700_000_000_000;

    fn persistence(
        clock: &ManualClock,
        local: &MemoryTier,
        channel: &LocalChannel,
    ) -> Rc<VerificationPersistence> {
        Rc::new(
            VerificationPersistence::builder(VerificationConfig::default())
                .clock(Box::new(clock.clone()))
                .user_agent("test-agent")
                .tier(Box::new(local.clone()))
                .notifier(Box::new(channel.endpoint()))
                .build(),
        )
    }

    fn record_states(gate: &AgeGate) -> Rc<RefCell<Vec<GateState>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        gate.on_change(move |s| sink.borrow_mut().push(s));
        seen
    }

    #[test]
    fn test_first_visit_flow() {
        let clock = ManualClock::new(START);
        let local = MemoryTier::with_kind(TierKind::LocalStorage);
        let gate = AgeGate::new(persistence(&clock, &local, &LocalChannel::new()));
        let seen = record_states(&gate);

        assert_eq!(gate.check(), GateState::Checking);
        assert_eq!(block_on(gate.check_async()), GateState::Prompt);
        assert!(gate.state().blocks_content());

        gate.confirm();
        assert_eq!(gate.state(), GateState::Verified);
        assert_eq!(*seen.borrow(), vec![GateState::Prompt, GateState::Verified]);
    }

    #[test]
    fn test_returning_visitor_skips_prompt() {
        let clock = ManualClock::new(START);
        let local = MemoryTier::with_kind(TierKind::LocalStorage);
        let channel = LocalChannel::new();
        persistence(&clock, &local, &channel).save();

        let gate = AgeGate::new(persistence(&clock, &local, &channel));
        assert_eq!(gate.check(), GateState::Verified);
        assert!(!gate.state().blocks_content());
    }

    #[test]
    fn test_expiry_observed_on_refresh() {
        let clock = ManualClock::new(START);
        let local = MemoryTier::with_kind(TierKind::LocalStorage);
        let gate = AgeGate::new(persistence(&clock, &local, &LocalChannel::new()));
        gate.confirm();

        clock.advance(31 * DAY_MS);
        gate.refresh();
        assert_eq!(gate.state(), GateState::Prompt);
    }

    #[test]
    fn test_backup_restores_gate() {
        let clock = ManualClock::new(START);
        let backup = MemoryBackup::new();
        let build = |backup: &MemoryBackup| {
            Rc::new(
                VerificationPersistence::builder(VerificationConfig::default())
                    .clock(Box::new(clock.clone()))
                    .tier(Box::new(MemoryTier::with_kind(TierKind::SessionStorage)))
                    .backup(Rc::new(backup.clone()))
                    .build(),
            )
        };
        build(&backup).save();

        // New session: sessionStorage is empty, IndexedDB remembers
        let gate = AgeGate::new(build(&backup));
        assert_eq!(gate.check(), GateState::Checking);
        assert_eq!(block_on(gate.check_async()), GateState::Verified);
    }

    #[test]
    fn test_reset_propagates_to_other_tab() {
        let clock = ManualClock::new(START);
        let local = MemoryTier::with_kind(TierKind::LocalStorage);
        let channel = LocalChannel::new();
        let tab_a = AgeGate::new(persistence(&clock, &local, &channel));
        let tab_b = AgeGate::new(persistence(&clock, &local, &channel));

        tab_a.confirm();
        assert_eq!(tab_b.state(), GateState::Verified);

        tab_b.reset();
        assert_eq!(tab_a.state(), GateState::Prompt);
        assert!(!tab_a.persistence().is_verified_sync());
    }
}
