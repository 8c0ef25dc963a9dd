//! Pool configuration.
//!
//! Settings are read once when a handler is constructed. [`PoolConfig::load`]
//! layers an optional configuration file and `TETHER__`-prefixed environment
//! variables on top of the defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Default maximum number of pooled instances.
pub const DEFAULT_POOL_MAX: usize = 8;

/// Default blocking timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "TETHER";

/// What the pool does when every pooled instance is checked out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Create a throwaway instance that is disposed on release.
    #[default]
    Create,
    /// Wait for a release, failing after the configured timeout.
    Block,
}

impl OverflowPolicy {
    /// Parses a policy name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create" | "overflow" => Some(OverflowPolicy::Create),
            "block" | "blocking" => Some(OverflowPolicy::Block),
            _ => None,
        }
    }
}

/// Configuration for a poolable component handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_bounds"))]
pub struct PoolConfig {
    /// Maximum number of pooled instances.
    #[validate(range(min = 1))]
    pub pool_max: usize,
    /// Number of instances created eagerly at construction.
    pub pool_min: usize,
    /// Behavior once `pool_max` instances are checked out.
    pub overflow: OverflowPolicy,
    /// How long a blocking acquire waits, in milliseconds.
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_max: DEFAULT_POOL_MAX,
            pool_min: 0,
            overflow: OverflowPolicy::Create,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

fn validate_bounds(config: &PoolConfig) -> Result<(), ValidationError> {
    if config.pool_min > config.pool_max {
        let mut err = ValidationError::new("pool_min_exceeds_max");
        err.message = Some(
            format!(
                "pool_min ({}) must not exceed pool_max ({})",
                config.pool_min, config.pool_max
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

impl PoolConfig {
    /// Creates a configuration with the given maximum and default settings otherwise.
    pub fn with_max(pool_max: usize) -> Self {
        Self {
            pool_max,
            ..Default::default()
        }
    }

    /// Sets the overflow policy.
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// Sets the blocking timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Sets the warm-up size.
    pub fn pool_min(mut self, pool_min: usize) -> Self {
        self.pool_min = pool_min;
        self
    }

    /// Returns the blocking timeout.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Loads configuration from an optional file and the environment.
    ///
    /// Sources, in increasing priority:
    /// 1. Built-in defaults
    /// 2. `path`, if given (format inferred from the extension)
    /// 3. Environment variables such as `TETHER__POOL_MAX`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&PoolConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: PoolConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Serializes tests that read the process environment through `load`.
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

    /// Sets an environment variable for the lifetime of the guard.
    struct EnvVar(&'static str);

    impl EnvVar {
        fn set(key: &'static str, value: &str) -> Self {
            std::env::set_var(key, value);
            EnvVar(key)
        }
    }

    impl Drop for EnvVar {
        fn drop(&mut self) {
            std::env::remove_var(self.0);
        }
    }

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.pool_max, 8);
        assert_eq!(config.pool_min, 0);
        assert_eq!(config.overflow, OverflowPolicy::Create);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_zero_max_is_rejected() {
        let config = PoolConfig::with_max(0);
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_min_above_max_is_rejected() {
        let config = PoolConfig::with_max(2).pool_min(3);
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_overflow_policy_parse() {
        assert_eq!(OverflowPolicy::parse("BLOCK"), Some(OverflowPolicy::Block));
        assert_eq!(OverflowPolicy::parse("create"), Some(OverflowPolicy::Create));
        assert_eq!(OverflowPolicy::parse("spin"), None);
    }

    #[test]
    fn test_timeout_builder() {
        let config = PoolConfig::default().timeout(Duration::from_millis(250));
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.timeout_duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_from_file() {
        let _env = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "pool_max = 3").unwrap();
        writeln!(file, "overflow = \"block\"").unwrap();
        writeln!(file, "timeout_ms = 50").unwrap();

        let config = PoolConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.pool_max, 3);
        assert_eq!(config.pool_min, 0);
        assert_eq!(config.overflow, OverflowPolicy::Block);
        assert_eq!(config.timeout_ms, 50);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let _env = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "pool_max = 0").unwrap();

        assert!(PoolConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let _env = ENV_LOCK.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            PoolConfig::load(Some(&path)),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_environment_overrides_file() {
        let _env = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "pool_max = 3").unwrap();

        let _max = EnvVar::set("TETHER__POOL_MAX", "5");
        let _overflow = EnvVar::set("TETHER__OVERFLOW", "block");
        let config = PoolConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.pool_max, 5);
        assert_eq!(config.overflow, OverflowPolicy::Block);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_environment_value_is_validated() {
        let _env = ENV_LOCK.lock();
        let _max = EnvVar::set("TETHER__POOL_MAX", "0");

        assert!(matches!(
            PoolConfig::load(None),
            Err(ConfigError::Invalid(_))
        ));
    }
}
