//! Cache configuration
//!
//! Built in code with the builder methods or loaded from TOML:
//!
//! ```toml
//! # Entries expire this long after they were last written (0 = never)
//! time_to_live_ms = 200
//!
//! # Window for entries reached through relationships (0 = same as above)
//! relationship_time_to_live_ms = 50
//!
//! # Expected number of entries
//! initial_capacity = 1024
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use bitemp_core::{CacheError, Result};

/// Per-cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live in milliseconds; `0` disables expiry
    pub time_to_live_ms: u64,
    /// Time-to-live for relationship lookups; `0` falls back to `time_to_live_ms`
    pub relationship_time_to_live_ms: u64,
    /// Capacity reserved up front in the primary index
    pub initial_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            time_to_live_ms: 0,
            relationship_time_to_live_ms: 0,
            initial_capacity: 16,
        }
    }
}

impl CacheConfig {
    /// Configuration with no expiry
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time-to-live (builder pattern)
    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live_ms = duration_millis(ttl);
        self
    }

    /// Set the relationship time-to-live (builder pattern)
    pub fn with_relationship_time_to_live(mut self, ttl: Duration) -> Self {
        self.relationship_time_to_live_ms = duration_millis(ttl);
        self
    }

    /// Set the initial capacity (builder pattern)
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Time-to-live as a duration
    pub fn time_to_live(&self) -> Duration {
        Duration::from_millis(self.time_to_live_ms)
    }

    /// Relationship time-to-live as a duration
    pub fn relationship_time_to_live(&self) -> Duration {
        Duration::from_millis(self.relationship_time_to_live_ms)
    }

    /// Whether entries can expire at all
    pub fn is_partial(&self) -> bool {
        self.time_to_live_ms > 0
    }

    /// Validate configuration
    ///
    /// A relationship window only makes sense when expiry is enabled.
    pub fn validate(&self) -> Result<()> {
        if self.time_to_live_ms == 0 && self.relationship_time_to_live_ms > 0 {
            return Err(CacheError::InvalidConfig(
                "relationship_time_to_live_ms requires a non-zero time_to_live_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Configuration for tests: 200ms window, small tables
    pub fn for_testing() -> Self {
        CacheConfig {
            time_to_live_ms: 200,
            relationship_time_to_live_ms: 0,
            initial_capacity: 16,
        }
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CacheConfig = toml::from_str(text)
            .map_err(|e| CacheError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CacheError::InvalidConfig(format!("Failed to serialize config: {}", e)))
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_never_expires() {
        let config = CacheConfig::default();
        assert!(!config.is_partial());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_sets_windows() {
        let config = CacheConfig::new()
            .with_time_to_live(Duration::from_millis(200))
            .with_relationship_time_to_live(Duration::from_millis(50))
            .with_initial_capacity(64);
        assert_eq!(config.time_to_live(), Duration::from_millis(200));
        assert_eq!(config.relationship_time_to_live(), Duration::from_millis(50));
        assert_eq!(config.initial_capacity, 64);
        assert!(config.is_partial());
    }

    #[test]
    fn relationship_window_without_ttl_is_rejected() {
        let config = CacheConfig::new().with_relationship_time_to_live(Duration::from_secs(1));
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn parse_partial_config() {
        let config = CacheConfig::from_toml_str("time_to_live_ms = 200").unwrap();
        assert_eq!(config.time_to_live_ms, 200);
        assert_eq!(config.relationship_time_to_live_ms, 0);
        assert_eq!(config.initial_capacity, 16);
    }

    #[test]
    fn parse_garbage_is_invalid_config() {
        assert!(matches!(
            CacheConfig::from_toml_str("time_to_live_ms = \"soon\""),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn from_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.toml");
        let config = CacheConfig::for_testing().with_relationship_time_to_live(Duration::from_millis(20));

        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(CacheConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn from_missing_file_is_invalid_config() {
        let dir = TempDir::new().unwrap();
        let result = CacheConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }
}
