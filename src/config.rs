//! Configuration for the indexing layer and the in-memory substrate
//!
//! Loaded from JSON or built in code; every field has a default.

use crate::key::DEFAULT_KEY_STATUS;
use crate::{KvError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-scope resource limits enforced by the substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvLimits {
    /// Largest key accepted by `set` (bytes)
    pub max_key_size: u32,

    /// Largest value accepted by `set` (bytes)
    pub max_value_size: u32,

    /// Maximum number of live cursors
    pub max_iterators: u32,
}

impl Default for KvLimits {
    fn default() -> Self {
        Self {
            max_key_size: 1024,
            max_value_size: 256 * 1024,
            max_iterators: 1024,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    /// Status byte written at the front of every table/index prefix
    pub key_status: u8,

    pub limits: KvLimits,

    /// Bytes billed per entry on top of key and value length
    pub billable_overhead: u64,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            key_status: DEFAULT_KEY_STATUS,
            limits: KvLimits::default(),
            billable_overhead: 112,
        }
    }
}

impl KvConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: KvConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_status == 0 {
            return Err(KvError::Config("key_status must be non-zero".into()));
        }
        if self.limits.max_key_size == 0 {
            return Err(KvError::Config("max_key_size must be non-zero".into()));
        }
        if self.limits.max_value_size == 0 {
            return Err(KvError::Config("max_value_size must be non-zero".into()));
        }
        if self.limits.max_iterators == 0 {
            return Err(KvError::Config("max_iterators must be non-zero".into()));
        }
        Ok(())
    }

    pub fn with_limits(mut self, limits: KvLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_key_status(mut self, status: u8) -> Self {
        self.key_status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = KvConfig::default();
        assert_eq!(config.key_status, 1);
        assert_eq!(config.limits.max_key_size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = KvConfig::from_json_str(r#"{ "limits": { "max_iterators": 4 } }"#).unwrap();
        assert_eq!(config.limits.max_iterators, 4);
        assert_eq!(config.limits.max_key_size, 1024);
        assert_eq!(config.billable_overhead, 112);
    }

    #[test]
    fn test_rejects_zero_limits() {
        let err = KvConfig::from_json_str(r#"{ "limits": { "max_key_size": 0 } }"#).unwrap_err();
        assert!(matches!(err, KvError::Config(_)));
        assert!(KvConfig::default().with_key_status(0).validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config = KvConfig::default().with_key_status(3);
        file.write_all(config.to_json_string().unwrap().as_bytes()).unwrap();

        let loaded = KvConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            KvConfig::load("/nonexistent/motekv.json"),
            Err(KvError::Io(_))
        ));
    }
}
