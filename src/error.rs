//! Storage error taxonomy
//!
//! None of these ever reach the user. The persistence layer logs them and
//! treats the affected tier as holding no value.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// API missing or access denied (private browsing, locked-down webviews)
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A stored value could not be decoded
    #[error("corrupted value for {key}: {value:?}")]
    Parse { key: String, value: String },

    /// No cross-tab broadcast mechanism could be used
    #[error("change channel unavailable: {0}")]
    ChannelUnavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(target_arch = "wasm32")]
impl StorageError {
    /// Classify a thrown JS value by its DOMException name
    pub fn from_js(err: wasm_bindgen::JsValue) -> Self {
        use wasm_bindgen::JsCast;

        match err.dyn_into::<web_sys::DomException>() {
            Ok(ex) if ex.name() == "QuotaExceededError" => StorageError::QuotaExceeded(ex.message()),
            Ok(ex) => StorageError::Unavailable(format!("{}: {}", ex.name(), ex.message())),
            Err(other) => StorageError::Unavailable(format!("{:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StorageError::Parse {
            key: "age_verification_timestamp".to_string(),
            value: "soon".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "corrupted value for age_verification_timestamp: \"soon\""
        );
        assert_eq!(
            StorageError::QuotaExceeded("full".into()).to_string(),
            "storage quota exceeded: full"
        );
    }
}
