//! Verification persistence
//!
//! Keeps the "user confirmed age" flag alive across reloads, tabs and flaky
//! storage. Writes go to the highest level of the chain that accepts them;
//! reads walk the tiers in priority order and take the first unexpired
//! record. No storage fault ever reaches the caller: it is logged and the
//! tier is treated as empty.

use std::rc::Rc;

use serde::Serialize;

use crate::config::VerificationConfig;
use crate::error::{StorageError, StorageResult};
use crate::notify::{ChangeEvent, ChangeNotifier, VerificationChange};
use crate::persistence::{BackupTier, MemoryTier, PersistenceTier, TierKind};
use crate::platform::{self, Clock, DeviceProfile, SystemClock};
use crate::record::{VerificationRecord, VerificationStatus};

/// How a tier takes part in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TierRole {
    /// Written on every save
    Active,
    /// Written only when every active tier refuses
    Standby,
    /// In-process last resort
    Fallback,
    /// Async backup, read after the sync tiers
    Backup,
    /// Failed its probe at startup
    Rejected,
}

/// Probe result for one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierReport {
    pub kind: TierKind,
    pub role: TierRole,
    pub writable: bool,
    pub error: Option<String>,
}

impl TierReport {
    fn probed(tier: &dyn PersistenceTier, role: TierRole, probe_key: &str) -> Self {
        let probe = tier.probe(probe_key);
        Self {
            kind: tier.kind(),
            role,
            writable: probe.is_ok(),
            error: probe.err().map(|e| e.to_string()),
        }
    }

    fn rejected(kind: TierKind, err: &StorageError) -> Self {
        Self {
            kind,
            role: TierRole::Rejected,
            writable: false,
            error: Some(err.to_string()),
        }
    }
}

/// Point-in-time snapshot for support tooling
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Every tier offered to the builder, kept or not
    pub tiers: Vec<TierReport>,
    pub backup_available: bool,
    #[serde(flatten)]
    pub device: DeviceProfile,
    /// localStorage missing or refusing writes
    pub storage_restricted: bool,
    pub verified: bool,
    pub status: VerificationStatus,
    /// e.g. "3 days ago"
    pub verified_since: Option<String>,
    pub user_agent: String,
}

impl Diagnostics {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub struct VerificationPersistence {
    config: VerificationConfig,
    /// Browser-backed sync tiers, highest priority first
    active: Vec<Box<dyn PersistenceTier>>,
    /// sessionStorage while localStorage is usable
    standby: Vec<Box<dyn PersistenceTier>>,
    /// Last resort, only written when every tier above failed
    memory: MemoryTier,
    backup: Option<Rc<dyn BackupTier>>,
    rejected: Vec<TierReport>,
    notifier: Option<Box<dyn ChangeNotifier>>,
    clock: Box<dyn Clock>,
    user_agent: String,
}

/// Assembles a persistence instance, probing each tier once
pub struct PersistenceBuilder {
    config: VerificationConfig,
    tiers: Vec<Box<dyn PersistenceTier>>,
    backup: Option<Rc<dyn BackupTier>>,
    notifier: Option<Box<dyn ChangeNotifier>>,
    clock: Box<dyn Clock>,
    user_agent: Option<String>,
}

impl Default for PersistenceBuilder {
    fn default() -> Self {
        Self::new(VerificationConfig::default())
    }
}

impl PersistenceBuilder {
    pub fn new(config: VerificationConfig) -> Self {
        Self {
            config,
            tiers: Vec::new(),
            backup: None,
            notifier: None,
            clock: Box::new(SystemClock),
            user_agent: None,
        }
    }

    /// Add a sync tier; call in priority order
    pub fn tier(mut self, tier: Box<dyn PersistenceTier>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn backup(mut self, backup: Rc<dyn BackupTier>) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn notifier(mut self, notifier: Box<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Probe every tier and sort it into the chain.
    ///
    /// sessionStorage only stands in for localStorage: once a localStorage
    /// tier passes its probe, sessionStorage is kept on standby instead of
    /// being written on every save.
    pub fn build(self) -> VerificationPersistence {
        let probe_key = self.config.probe_key();
        let mut active: Vec<Box<dyn PersistenceTier>> = Vec::with_capacity(self.tiers.len());
        let mut standby: Vec<Box<dyn PersistenceTier>> = Vec::new();
        let mut rejected = Vec::new();

        for tier in self.tiers {
            let kind = tier.kind();
            if let Err(e) = tier.probe(&probe_key) {
                log::warn!("Dropping {} tier: {}", kind, e);
                rejected.push(TierReport::rejected(kind, &e));
                continue;
            }
            if kind == TierKind::SessionStorage
                && active.iter().any(|t| t.kind() == TierKind::LocalStorage)
            {
                log::debug!("Keeping {} on standby: localStorage usable", kind);
                standby.push(tier);
            } else {
                active.push(tier);
            }
        }

        let backup = self.backup.filter(|b| {
            let available = b.is_available();
            if !available {
                log::warn!("Dropping {} backup: unavailable", b.kind());
                rejected.push(TierReport::rejected(
                    b.kind(),
                    &StorageError::Unavailable("API missing".to_string()),
                ));
            }
            available
        });

        log::info!(
            "Verification persistence ready: [{}] standby [{}] + memory{}",
            active
                .iter()
                .map(|t| t.kind().as_str())
                .collect::<Vec<_>>()
                .join(", "),
            standby
                .iter()
                .map(|t| t.kind().as_str())
                .collect::<Vec<_>>()
                .join(", "),
            if backup.is_some() { " + backup" } else { "" }
        );

        VerificationPersistence {
            config: self.config,
            active,
            standby,
            memory: MemoryTier::new(),
            backup,
            rejected,
            notifier: self.notifier,
            clock: self.clock,
            user_agent: self.user_agent.unwrap_or_else(platform::user_agent),
        }
    }
}

impl VerificationPersistence {
    pub fn builder(config: VerificationConfig) -> PersistenceBuilder {
        PersistenceBuilder::new(config)
    }

    /// Full browser chain: localStorage, sessionStorage, IndexedDB, and
    /// BroadcastChannel + storage event notification
    #[cfg(target_arch = "wasm32")]
    pub fn for_browser(config: VerificationConfig) -> Self {
        use crate::notify::{BroadcastChannelNotifier, CompositeNotifier, StorageEventNotifier};
        use crate::persistence::{IndexedDbTier, WebStorageTier};

        let mut builder = Self::builder(config.clone());

        for candidate in [WebStorageTier::local(), WebStorageTier::session()] {
            match candidate {
                Ok(tier) => builder = builder.tier(Box::new(tier)),
                Err(e) => log::warn!("Web storage unavailable: {}", e),
            }
        }

        builder = builder.backup(Rc::new(IndexedDbTier::new(&config)));

        let mut notifier = CompositeNotifier::new();
        match BroadcastChannelNotifier::open(&config.channel_name) {
            Ok(channel) => notifier = notifier.with(Box::new(channel)),
            Err(e) => log::warn!("{}; relying on storage events", e),
        }
        match StorageEventNotifier::new(&config) {
            Ok(events) => notifier = notifier.with(Box::new(events)),
            Err(e) => log::warn!("{}", e),
        }
        if !notifier.is_empty() {
            builder = builder.notifier(Box::new(notifier));
        }

        builder.build()
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Record a fresh verification in the storage chain and tell the other tabs
    pub fn save(&self) {
        let record = self.fresh_record();
        self.write_sync_tiers(&record);

        if let Some(backup) = &self.backup {
            let backup = Rc::clone(backup);
            let config = self.config.clone();
            let record = record.clone();
            platform::spawn_local(async move {
                write_backup(backup.as_ref(), &config, &record).await;
            });
        }

        self.announce(true, record.timestamp);
        log::info!("Age verification saved");
    }

    /// Like `save`, but completes only once the backup write has finished
    pub async fn save_async(&self) {
        let record = self.fresh_record();
        self.write_sync_tiers(&record);
        self.announce(true, record.timestamp);

        if let Some(backup) = &self.backup {
            write_backup(backup.as_ref(), &self.config, &record).await;
        }
        log::info!("Age verification saved");
    }

    /// Sync read over localStorage, sessionStorage and memory
    pub fn is_verified_sync(&self) -> bool {
        self.status().is_verified()
    }

    /// Sync read, then the backup tier. A valid backup record is promoted
    /// into the sync tiers so the next sync read finds it.
    pub async fn is_verified_async(&self) -> bool {
        if self.is_verified_sync() {
            return true;
        }
        let Some(backup) = self.backup.clone() else {
            return false;
        };

        match read_backup(backup.as_ref(), &self.config).await {
            Ok(Some(record)) => {
                if record.is_valid_at(self.clock.now_ms(), self.config.max_age_ms) {
                    log::info!("Promoting verification from {}", backup.kind());
                    self.write_sync_tiers(&record);
                    true
                } else {
                    false
                }
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("{} read failed: {}", backup.kind(), e);
                false
            }
        }
    }

    /// State of the sync tiers. Expired and never-verified both read as
    /// unverified; this keeps them apart for diagnostics only.
    pub fn status(&self) -> VerificationStatus {
        let now = self.clock.now_ms();
        let mut status = VerificationStatus::Unverified;

        for tier in self.sync_tiers() {
            match VerificationRecord::read_from(tier, &self.config) {
                Ok(Some(record)) => match record.status_at(now, self.config.max_age_ms) {
                    VerificationStatus::VerifiedValid => return VerificationStatus::VerifiedValid,
                    expired => status = expired,
                },
                Ok(None) => {}
                Err(e) => log::warn!("{} read failed: {}", tier.kind(), e),
            }
        }
        status
    }

    /// The record the sync path would accept, if any
    pub fn current_record(&self) -> Option<VerificationRecord> {
        let now = self.clock.now_ms();
        self.sync_tiers().find_map(|tier| {
            VerificationRecord::read_from(tier, &self.config)
                .ok()
                .flatten()
                .filter(|r| r.is_valid_at(now, self.config.max_age_ms))
        })
    }

    /// Remove the record from every tier
    pub fn clear(&self) {
        self.clear_sync_tiers();

        if let Some(backup) = &self.backup {
            let backup = Rc::clone(backup);
            let config = self.config.clone();
            platform::spawn_local(async move {
                clear_backup(backup.as_ref(), &config).await;
            });
        }

        self.announce(false, self.clock.now_ms());
        log::info!("Age verification cleared");
    }

    pub async fn clear_async(&self) {
        self.clear_sync_tiers();
        if let Some(backup) = &self.backup {
            clear_backup(backup.as_ref(), &self.config).await;
        }
        self.announce(false, self.clock.now_ms());
        log::info!("Age verification cleared");
    }

    /// Re-check whenever another tab reports a change.
    ///
    /// The payload is ignored: tabs race, so the listener always gets a fresh
    /// read (including the backup tier).
    pub fn watch<F>(self: &Rc<Self>, on_change: F) -> StorageResult<()>
    where
        F: Fn(bool) + 'static,
    {
        let notifier = self.notifier.as_ref().ok_or_else(|| {
            StorageError::ChannelUnavailable("no change notifier configured".to_string())
        })?;

        let weak = Rc::downgrade(self);
        let on_change = Rc::new(on_change);
        notifier.subscribe(Rc::new(move |event: ChangeEvent| {
            let Some(this) = weak.upgrade() else {
                return;
            };
            log::debug!("Verification change via {:?}", event.source);
            let on_change = on_change.clone();
            platform::spawn_local(async move {
                let verified = this.is_verified_async().await;
                on_change(verified);
            });
        }))
    }

    /// Snapshot of tier health, device class and verification state.
    ///
    /// Kept tiers are probed live; tiers dropped at startup are reported
    /// with the error that removed them. The backup is only checked for
    /// availability here, `diagnostics_async` probes it.
    pub fn diagnostics(&self) -> Diagnostics {
        let probe_key = self.config.probe_key();
        let mut tiers: Vec<TierReport> = Vec::new();
        for tier in &self.active {
            tiers.push(TierReport::probed(tier.as_ref(), TierRole::Active, &probe_key));
        }
        for tier in &self.standby {
            tiers.push(TierReport::probed(tier.as_ref(), TierRole::Standby, &probe_key));
        }
        tiers.push(TierReport::probed(&self.memory, TierRole::Fallback, &probe_key));
        if let Some(backup) = &self.backup {
            let available = backup.is_available();
            tiers.push(TierReport {
                kind: backup.kind(),
                role: TierRole::Backup,
                writable: available,
                error: (!available).then(|| "API missing".to_string()),
            });
        }
        tiers.extend(self.rejected.iter().cloned());

        let storage_restricted = !tiers
            .iter()
            .any(|t| t.kind == TierKind::LocalStorage && t.writable);
        let status = self.status();
        let now = self.clock.now_ms();

        Diagnostics {
            tiers,
            backup_available: self.backup.as_ref().is_some_and(|b| b.is_available()),
            device: DeviceProfile::from_user_agent(&self.user_agent),
            storage_restricted,
            verified: status.is_verified(),
            status,
            verified_since: self.current_record().map(|r| r.describe_age(now)),
            user_agent: self.user_agent.clone(),
        }
    }

    /// `diagnostics` plus a write/remove round trip against the backup
    pub async fn diagnostics_async(&self) -> Diagnostics {
        let mut diag = self.diagnostics();
        let Some(backup) = self.backup.clone() else {
            return diag;
        };

        let probe = backup.probe(&self.config.probe_key()).await;
        if let Err(e) = &probe {
            log::warn!("{} probe failed: {}", backup.kind(), e);
        }
        if let Some(report) = diag.tiers.iter_mut().find(|t| t.role == TierRole::Backup) {
            report.writable = probe.is_ok();
            report.error = probe.err().map(|e| e.to_string());
        }
        diag
    }

    fn fresh_record(&self) -> VerificationRecord {
        VerificationRecord::new(self.clock.now_ms(), self.user_agent.clone())
    }

    /// Read order: active, standby, memory
    fn sync_tiers(&self) -> impl Iterator<Item = &(dyn PersistenceTier + 'static)> {
        self.active
            .iter()
            .chain(self.standby.iter())
            .map(|t| t.as_ref())
            .chain(std::iter::once(
                &self.memory as &(dyn PersistenceTier + 'static),
            ))
    }

    /// Write the first level that accepts the record: every active tier,
    /// else the standby tiers, else memory. Copies left in the levels below
    /// are removed; they would outlive a clear() from another tab.
    fn write_sync_tiers(&self, record: &VerificationRecord) {
        if write_level(&self.active, record, &self.config) {
            for tier in &self.standby {
                remove_record(tier.as_ref(), &self.config);
            }
            remove_record(&self.memory, &self.config);
            return;
        }

        if write_level(&self.standby, record, &self.config) {
            log::warn!("localStorage refused the write, stored in sessionStorage");
            remove_record(&self.memory, &self.config);
            return;
        }

        log::warn!("No browser storage accepted the write, keeping it in memory");
        if let Err(e) = record.write_to(&self.memory, &self.config) {
            log::warn!("memory write failed: {}", e);
        }
    }

    fn clear_sync_tiers(&self) {
        for tier in self.sync_tiers() {
            remove_record(tier, &self.config);
        }
    }

    fn announce(&self, verified: bool, timestamp: u64) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.publish(&VerificationChange {
            verified,
            timestamp,
        }) {
            log::warn!("Cross-tab notification failed: {}", e);
        }
    }
}

/// Write every tier of one level; true if any of them took the record
fn write_level(
    tiers: &[Box<dyn PersistenceTier>],
    record: &VerificationRecord,
    config: &VerificationConfig,
) -> bool {
    let mut stored = false;
    for tier in tiers {
        match record.write_to(tier.as_ref(), config) {
            Ok(()) => stored = true,
            Err(e) => log::warn!("{} write failed: {}", tier.kind(), e),
        }
    }
    stored
}

fn remove_record(tier: &dyn PersistenceTier, config: &VerificationConfig) {
    for key in [
        config.verified_key(),
        config.timestamp_key(),
        config.user_agent_key(),
    ] {
        if let Err(e) = tier.remove(&key) {
            log::warn!("{} remove failed: {}", tier.kind(), e);
        }
    }
}

async fn write_backup(
    backup: &dyn BackupTier,
    config: &VerificationConfig,
    record: &VerificationRecord,
) {
    for (key, value) in record.to_entries(config) {
        if let Err(e) = backup.set(&key, &value).await {
            log::warn!("{} write failed: {}", backup.kind(), e);
            return;
        }
    }
}

async fn read_backup(
    backup: &dyn BackupTier,
    config: &VerificationConfig,
) -> StorageResult<Option<VerificationRecord>> {
    let verified = backup.get(&config.verified_key()).await?;
    if verified.is_none() {
        return Ok(None);
    }
    let timestamp = backup.get(&config.timestamp_key()).await?;
    let user_agent = backup.get(&config.user_agent_key()).await.ok().flatten();
    VerificationRecord::from_parts(config, verified, timestamp, user_agent)
}

async fn clear_backup(backup: &dyn BackupTier, config: &VerificationConfig) {
    for key in [
        config.verified_key(),
        config.timestamp_key(),
        config.user_agent_key(),
    ] {
        if let Err(e) = backup.remove(&key).await {
            log::warn!("{} remove failed: {}", backup.kind(), e);
        }
    }
}
