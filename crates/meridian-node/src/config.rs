//! Node Configuration
//!
//! Loaded from a TOML file. Every section has defaults, so an empty file (or
//! no file at all) yields a working node with an empty identity table.
//!
//! ```toml
//! claim_timeout_ms = 5000
//!
//! [retry]
//! initial_delay_ms = 200
//! maximum_delay_ms = 10000
//! factor = 2.0
//! jitter_min = 1.0
//! jitter_max = 1.5
//! max_attempts = 5
//!
//! [identities]
//! "org-a" = "0x6f72672d61"
//! ```

use meridian_core::{JitterRange, MeridianError, RetryPolicy};
use meridian_directory::StaticResolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::Duration as SignedDuration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`NodeConfig`]
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying parse error
        source: toml::de::Error,
    },

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<MeridianError> for ConfigError {
    fn from(err: MeridianError) -> Self {
        Self::Invalid(err.to_string())
    }
}

/// Top-level node configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Per-claim time limit in milliseconds; unset means no limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_timeout_ms: Option<u64>,

    /// Directory store retry behaviour
    pub retry: RetryConfig,

    /// Identity to on-chain signer address
    pub identities: BTreeMap<String, String>,
}

impl NodeConfig {
    /// Read and validate the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;

        if let Some((identity, _)) = self
            .identities
            .iter()
            .find(|(identity, address)| identity.is_empty() || address.is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "identity table entry '{identity}' has an empty key or address"
            )));
        }

        if self.claim_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "claim_timeout_ms must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Resolver over the configured identity table
    pub fn resolver(&self) -> StaticResolver {
        self.identities
            .iter()
            .map(|(identity, address)| (identity.clone(), address.clone()))
            .collect()
    }

    /// Per-claim time limit
    pub fn claim_timeout(&self) -> Option<Duration> {
        self.claim_timeout_ms.map(Duration::from_millis)
    }
}

/// Retry configuration for directory store calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay after the first failure in milliseconds. Negative disables
    /// retrying altogether.
    pub initial_delay_ms: i64,

    /// Upper bound on any single delay in milliseconds
    pub maximum_delay_ms: i64,

    /// Growth factor between delays (unset or below 1 means 2)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,

    /// Lower jitter multiplier; set together with `jitter_max`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_min: Option<f64>,

    /// Upper jitter multiplier; set together with `jitter_min`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_max: Option<f64>,

    /// Attempts per store call, the first one included
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            maximum_delay_ms: 10_000,
            factor: None,
            jitter_min: None,
            jitter_max: None,
            max_attempts: 5,
        }
    }
}

impl RetryConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.maximum_delay_ms < 0 {
            return Err(ConfigError::Invalid(
                "retry.maximum_delay_ms must not be negative".into(),
            ));
        }
        self.policy()?.validate()?;
        Ok(())
    }

    /// Backoff policy described by this section.
    pub fn policy(&self) -> Result<RetryPolicy, ConfigError> {
        let mut policy = RetryPolicy::new(
            SignedDuration::milliseconds(self.initial_delay_ms),
            SignedDuration::milliseconds(self.maximum_delay_ms),
        );
        if let Some(factor) = self.factor {
            policy = policy.with_factor(factor);
        }
        match (self.jitter_min, self.jitter_max) {
            (Some(min), Some(max)) => policy = policy.with_jitter(JitterRange::new(min, max)?),
            (None, None) => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "retry.jitter_min and retry.jitter_max must be set together".into(),
                ))
            }
        }
        Ok(policy)
    }
}
