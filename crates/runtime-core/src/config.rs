//! Runtime configuration types

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Checkpoint commit settings
    pub checkpoint: CheckpointConfig,

    /// Project preference settings
    pub preferences: PreferenceConfig,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        debug!(path = %path.display(), "Loaded runtime configuration");
        Ok(config)
    }

    /// Reject values that would disable the commit or parse guarantees
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint.retry.budget.is_zero() {
            return Err(Error::InvalidConfig {
                message: "checkpoint.retry.budget must be non-zero".to_string(),
            });
        }
        if self.checkpoint.temp_suffix.is_empty() {
            return Err(Error::InvalidConfig {
                message: "checkpoint.temp_suffix must not be empty".to_string(),
            });
        }
        // "</x>" plus terminator is the smallest useful delimiter
        if self.preferences.max_tag_length < 5 {
            return Err(Error::InvalidConfig {
                message: format!(
                    "preferences.max_tag_length {} is too small",
                    self.preferences.max_tag_length
                ),
            });
        }
        Ok(())
    }
}

/// Checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Retry policy for the commit rename
    pub retry: RetryConfig,

    /// Extension of the temporary file written before commit
    pub temp_suffix: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            temp_suffix: "tmp".to_string(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Wall-clock budget for retries after the first failure
    #[serde(with = "millis_serde")]
    pub budget: Duration,

    /// Upper bound of the uniformly random sleep between attempts
    #[serde(with = "millis_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(5),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Project preference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceConfig {
    /// Capacity of the tag delimiter buffer, terminator included
    pub max_tag_length: usize,
}

impl Default for PreferenceConfig {
    fn default() -> Self {
        Self {
            max_tag_length: 256,
        }
    }
}

/// Duration serialization helper, stored as milliseconds
mod millis_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
