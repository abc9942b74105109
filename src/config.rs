//! Verification persistence configuration
//!
//! Every field has a working default, so most callers use
//! `VerificationConfig::default()`. Sites that embed the gate in more than one
//! app on the same origin can load a JSON override to keep their keys apart.

use serde::{Deserialize, Serialize};

use crate::consts;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Namespace prefix shared by the three record keys
    pub key_prefix: String,
    /// How long a verification stays valid (ms)
    pub max_age_ms: u64,
    /// BroadcastChannel name for cross-tab notification
    pub channel_name: String,

    // === IndexedDB backup ===
    pub db_name: String,
    pub store_name: String,

    /// Where the deny button sends underage visitors
    pub exit_url: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            key_prefix: consts::KEY_PREFIX.to_string(),
            max_age_ms: consts::MAX_AGE_MS,
            channel_name: consts::CHANNEL_NAME.to_string(),
            db_name: consts::DB_NAME.to_string(),
            store_name: consts::STORE_NAME.to_string(),
            exit_url: consts::EXIT_URL.to_string(),
        }
    }
}

impl VerificationConfig {
    /// Parse a (possibly partial) JSON override; missing fields keep defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn verified_key(&self) -> String {
        format!("{}verified", self.key_prefix)
    }

    pub fn timestamp_key(&self) -> String {
        format!("{}timestamp", self.key_prefix)
    }

    pub fn user_agent_key(&self) -> String {
        format!("{}user_agent", self.key_prefix)
    }

    /// Transient key used by write-then-delete probes
    pub fn probe_key(&self) -> String {
        format!("{}probe", self.key_prefix)
    }

    /// Whether a `storage` event for `key` can change the verified state.
    ///
    /// A save writes three keys but only the flag matters; `None` is what
    /// `localStorage.clear()` reports.
    pub fn is_verification_signal(&self, key: Option<&str>) -> bool {
        key.is_none_or(|key| key == self.verified_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys() {
        let config = VerificationConfig::default();
        assert_eq!(config.verified_key(), "age_verification_verified");
        assert_eq!(config.timestamp_key(), "age_verification_timestamp");
        assert_eq!(config.user_agent_key(), "age_verification_user_agent");
        assert_eq!(config.max_age_ms, 30 * 24 * 60 * 60 * 1000);
    }

    #[test]
    fn test_partial_json_override() {
        let config = VerificationConfig::from_json(r#"{"key_prefix": "shop_"}"#).unwrap();
        assert_eq!(config.verified_key(), "shop_verified");
        assert_eq!(config.channel_name, consts::CHANNEL_NAME);
    }

    #[test]
    fn test_verification_signal_keys() {
        let config = VerificationConfig::default();
        assert!(config.is_verification_signal(Some("age_verification_verified")));
        assert!(config.is_verification_signal(None));
        assert!(!config.is_verification_signal(Some("age_verification_timestamp")));
        assert!(!config.is_verification_signal(Some("age_verification_user_agent")));
        assert!(!config.is_verification_signal(Some("theme")));
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(VerificationConfig::from_json("{\"max_age_ms\": \"forever\"}").is_err());
    }
}
