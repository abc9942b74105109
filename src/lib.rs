//! Age Gate - age verification persistence for the storefront
//!
//! Core modules:
//! - `persistence`: Storage tiers (localStorage, sessionStorage, IndexedDB, memory)
//! - `notify`: Cross-tab change notification
//! - `verification`: The fallback chain tying tiers and notifier together
//! - `gate`: Age gate state for the UI
//! - `platform`: Browser/native platform abstraction

pub mod config;
pub mod error;
pub mod gate;
pub mod notify;
pub mod persistence;
pub mod platform;
pub mod record;
pub mod verification;

#[cfg(test)]
mod testing;

pub use config::VerificationConfig;
pub use error::{StorageError, StorageResult};
pub use gate::{AgeGate, GateState};
pub use record::{VerificationRecord, VerificationStatus};
pub use verification::{
    Diagnostics, PersistenceBuilder, TierReport, TierRole, VerificationPersistence,
};

/// Persistence constants
pub mod consts {
    /// Namespace prefix for the three record keys
    pub const KEY_PREFIX: &str = "age_verification_";
    /// BroadcastChannel name shared by all tabs of the origin
    pub const CHANNEL_NAME: &str = "age_verification_channel";

    /// IndexedDB backup location
    pub const DB_NAME: &str = "age_verification";
    pub const DB_VERSION: u32 = 1;
    pub const STORE_NAME: &str = "records";

    /// Verification lifetime: 30 days
    pub const MAX_AGE_MS: u64 = 30 * DAY_MS;
    pub const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    /// Stored flag value; anything else reads as unverified
    pub const VERIFIED_VALUE: &str = "true";

    pub const EXIT_URL: &str = "https://www.google.com";
}
