//! The persisted verification record
//!
//! Stored as three parallel keys per tier: the flag, the grant time, and the
//! user agent. Only the first two take part in validation.

use serde::{Deserialize, Serialize};

use crate::config::VerificationConfig;
use crate::consts::VERIFIED_VALUE;
use crate::error::{StorageError, StorageResult};
use crate::persistence::PersistenceTier;

/// A single age confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Unix timestamp (ms) when verification was granted
    pub timestamp: u64,
    /// Diagnostic only
    pub user_agent: String,
}

/// Conceptual verification state of a browser profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Unverified,
    VerifiedValid,
    VerifiedExpired,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::VerifiedValid => "verified",
            VerificationStatus::VerifiedExpired => "expired",
        }
    }

    /// Reads never distinguish expired from never verified
    pub fn is_verified(&self) -> bool {
        *self == VerificationStatus::VerifiedValid
    }
}

impl VerificationRecord {
    pub fn new(timestamp: u64, user_agent: impl Into<String>) -> Self {
        Self {
            timestamp,
            user_agent: user_agent.into(),
        }
    }

    /// Age in ms; timestamps in the future count as fresh
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }

    pub fn is_valid_at(&self, now: u64, max_age_ms: u64) -> bool {
        self.age_ms(now) < max_age_ms
    }

    pub fn status_at(&self, now: u64, max_age_ms: u64) -> VerificationStatus {
        if self.is_valid_at(now, max_age_ms) {
            VerificationStatus::VerifiedValid
        } else {
            VerificationStatus::VerifiedExpired
        }
    }

    /// Encode as (key, value) pairs in write order
    pub fn to_entries(&self, config: &VerificationConfig) -> [(String, String); 3] {
        [
            (config.verified_key(), VERIFIED_VALUE.to_string()),
            (config.timestamp_key(), self.timestamp.to_string()),
            (config.user_agent_key(), self.user_agent.clone()),
        ]
    }

    /// Rebuild a record from raw key lookups.
    ///
    /// `Ok(None)` when the flag is absent or not `"true"`. A flag without a
    /// parseable timestamp is corruption and yields `StorageError::Parse`.
    pub fn from_parts(
        config: &VerificationConfig,
        verified: Option<String>,
        timestamp: Option<String>,
        user_agent: Option<String>,
    ) -> StorageResult<Option<Self>> {
        if verified.as_deref() != Some(VERIFIED_VALUE) {
            return Ok(None);
        }

        let raw = timestamp.unwrap_or_default();
        let timestamp = raw.trim().parse::<u64>().map_err(|_| StorageError::Parse {
            key: config.timestamp_key(),
            value: raw.clone(),
        })?;

        Ok(Some(Self {
            timestamp,
            user_agent: user_agent.unwrap_or_default(),
        }))
    }

    /// Read a record from a synchronous tier
    pub fn read_from(
        tier: &dyn PersistenceTier,
        config: &VerificationConfig,
    ) -> StorageResult<Option<Self>> {
        let verified = tier.get(&config.verified_key())?;
        if verified.is_none() {
            return Ok(None);
        }
        let timestamp = tier.get(&config.timestamp_key())?;
        // The user agent is diagnostic; losing it is not worth failing the read
        let user_agent = tier.get(&config.user_agent_key()).ok().flatten();
        Self::from_parts(config, verified, timestamp, user_agent)
    }

    /// Write all three keys to a synchronous tier, stopping at the first failure
    pub fn write_to(
        &self,
        tier: &dyn PersistenceTier,
        config: &VerificationConfig,
    ) -> StorageResult<()> {
        for (key, value) in self.to_entries(config) {
            tier.set(&key, &value)?;
        }
        Ok(())
    }

    /// Human readable age, e.g. "3 days ago"
    pub fn describe_age(&self, now: u64) -> String {
        let diff_mins = self.age_ms(now) / 60_000;
        let diff_hours = diff_mins / 60;
        let diff_days = diff_hours / 24;

        if diff_days >= 1 {
            if diff_days == 1 {
                "Yesterday".to_string()
            } else {
                format!("{} days ago", diff_days)
            }
        } else if diff_hours >= 1 {
            if diff_hours == 1 {
                "1 hour ago".to_string()
            } else {
                format!("{} hours ago", diff_hours)
            }
        } else if diff_mins >= 1 {
            if diff_mins == 1 {
                "1 min ago".to_string()
            } else {
                format!("{} mins ago", diff_mins)
            }
        } else {
            "Just now".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{DAY_MS, MAX_AGE_MS};

    fn config() -> VerificationConfig {
        VerificationConfig::default()
    }

    #[test]
    fn test_validity_boundary() {
        let record = VerificationRecord::new(1_000, "ua");
        assert!(record.is_valid_at(1_000, MAX_AGE_MS));
        assert!(record.is_valid_at(1_000 + MAX_AGE_MS - 1, MAX_AGE_MS));
        assert!(!record.is_valid_at(1_000 + MAX_AGE_MS, MAX_AGE_MS));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let record = VerificationRecord::new(10 * DAY_MS, "ua");
        assert_eq!(record.age_ms(DAY_MS), 0);
        assert_eq!(
            record.status_at(DAY_MS, MAX_AGE_MS),
            VerificationStatus::VerifiedValid
        );
    }

    #[test]
    fn test_from_parts_requires_true_flag() {
        let cfg = config();
        let parsed = VerificationRecord::from_parts(
            &cfg,
            Some("yes".into()),
            Some("5".into()),
            None,
        )
        .unwrap();
        assert!(parsed.is_none());

        let parsed =
            VerificationRecord::from_parts(&cfg, None, Some("5".into()), None).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_from_parts_corrupt_timestamp() {
        let cfg = config();
        let err = VerificationRecord::from_parts(
            &cfg,
            Some("true".into()),
            Some("not-a-number".into()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Parse { .. }));

        // Flag without any timestamp is also corruption
        let err =
            VerificationRecord::from_parts(&cfg, Some("true".into()), None, None).unwrap_err();
        assert!(matches!(err, StorageError::Parse { .. }));
    }

    #[test]
    fn test_entries_layout() {
        let cfg = config();
        let entries = VerificationRecord::new(42, "Mozilla/5.0").to_entries(&cfg);
        assert_eq!(entries[0], (cfg.verified_key(), "true".to_string()));
        assert_eq!(entries[1], (cfg.timestamp_key(), "42".to_string()));
        assert_eq!(entries[2], (cfg.user_agent_key(), "Mozilla/5.0".to_string()));
    }

    #[test]
    fn test_describe_age() {
        let record = VerificationRecord::new(0, "ua");
        assert_eq!(record.describe_age(30_000), "Just now");
        assert_eq!(record.describe_age(90_000), "1 min ago");
        assert_eq!(record.describe_age(3 * 60 * 60 * 1000), "3 hours ago");
        assert_eq!(record.describe_age(DAY_MS + 5), "Yesterday");
        assert_eq!(record.describe_age(12 * DAY_MS), "12 days ago");
    }
}
