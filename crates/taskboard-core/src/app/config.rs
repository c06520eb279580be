//! BoardConfig - 起動時設定
//!
//! JSON で読み込み、欠けている項目はデフォルト値で補う。

use serde::{Deserialize, Serialize};

use crate::activity::DEFAULT_CAPACITY;
use crate::invite::DEFAULT_CODE_LEN;
use crate::store::IdAllocation;
use crate::sync::RemoteFailurePolicy;

/// Shortest and longest accepted invite code.
pub const CODE_LEN_RANGE: std::ops::RangeInclusive<usize> = 6..=32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    /// Base URL invite links are built on.
    pub origin: String,
    /// Entries kept by the activity timeline.
    pub activity_capacity: usize,
    pub id_allocation: IdAllocation,
    pub remote_failure: RemoteFailurePolicy,
    pub invite_code_len: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            activity_capacity: DEFAULT_CAPACITY,
            id_allocation: IdAllocation::default(),
            remote_failure: RemoteFailurePolicy::default(),
            invite_code_len: DEFAULT_CODE_LEN,
        }
    }
}

impl BoardConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = self.origin.trim();
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "origin must be an http(s) URL, got {:?}",
                self.origin
            )));
        }
        if self.activity_capacity == 0 {
            return Err(ConfigError::Invalid("activity_capacity must be positive".into()));
        }
        if !CODE_LEN_RANGE.contains(&self.invite_code_len) {
            return Err(ConfigError::Invalid(format!(
                "invite_code_len must be within {CODE_LEN_RANGE:?}, got {}",
                self.invite_code_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = BoardConfig::from_json_str(r#"{ "origin": "https://board.example.com" }"#)
            .unwrap();
        assert_eq!(config.origin, "https://board.example.com");
        assert_eq!(config.activity_capacity, 50);
        assert_eq!(config.invite_code_len, 8);
        assert_eq!(config.id_allocation, IdAllocation::Counter);
        assert_eq!(config.remote_failure, RemoteFailurePolicy::RollBack);
    }

    #[test]
    fn legacy_behaviours_are_selectable() {
        let config = BoardConfig::from_json_str(
            r#"{ "id_allocation": "max_plus_one", "remote_failure": "keep_local" }"#,
        )
        .unwrap();
        assert_eq!(config.id_allocation, IdAllocation::MaxPlusOne);
        assert_eq!(config.remote_failure, RemoteFailurePolicy::KeepLocal);
    }

    #[rstest]
    #[case::not_json("{")]
    #[case::unknown_field(r#"{ "colour": "red" }"#)]
    #[case::bad_origin(r#"{ "origin": "board.example.com" }"#)]
    #[case::no_history(r#"{ "activity_capacity": 0 }"#)]
    #[case::short_code(r#"{ "invite_code_len": 3 }"#)]
    fn invalid_configs_are_rejected(#[case] raw: &str) {
        assert!(BoardConfig::from_json_str(raw).is_err());
    }
}
