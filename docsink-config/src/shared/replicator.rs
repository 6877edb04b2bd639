use serde::Deserialize;

use crate::Config;
use crate::shared::{SinkConfig, ValidationError};

const fn default_channel_capacity() -> usize {
    ReplicatorConfig::DEFAULT_CHANNEL_CAPACITY
}

fn default_path() -> String {
    ReplicatorConfig::DEFAULT_PATH.to_owned()
}

/// Complete configuration of the replicator binary.
///
/// This intentionally does not implement [`serde::Serialize`] since [`SinkConfig`] may hold
/// credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicatorConfig {
    /// Target store and namespace.
    pub sink: SinkConfig,
    /// Identifier of the adaptor instance, attached to every reported error.
    #[serde(default = "default_path")]
    pub path: String,
    /// Capacity of the channel between the event source and the sink worker.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl ReplicatorConfig {
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

    pub const DEFAULT_PATH: &'static str = "docsink";

    /// Validates the sink configuration and the channel capacity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.sink.validate()?;

        if self.channel_capacity == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "channel_capacity".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Config for ReplicatorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let config: ReplicatorConfig = serde_json::from_str(
            r#"{"sink": {"uri": "memory://localhost", "namespace": "db.docs"}}"#,
        )
        .unwrap();

        assert_eq!(config.path, "docsink");
        assert_eq!(config.channel_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_channel_capacity_is_rejected() {
        let config: ReplicatorConfig = serde_json::from_str(
            r#"{"sink": {"uri": "memory://localhost", "namespace": "db.docs"}, "channel_capacity": 0}"#,
        )
        .unwrap();

        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidFieldValue { .. }
        ));
    }
}
