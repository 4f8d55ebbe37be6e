//! Collector configuration.
//!
//! This module provides:
//! - [`CovConfig`] with defaults matching the classic kernel interface
//! - Validation for guardrail invariants
//! - Layered loading (defaults + `COVTRACE_*` environment, optional TOML file)

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{MIN_TRACE_WORDS, WORD_BYTES};

/// Largest trace buffer, in words, whose byte size still fits a signed 32-bit length.
pub const DEFAULT_MAX_TRACE_WORDS: usize = i32::MAX as usize / WORD_BYTES;

/// Default bound on the number of handles in one remote-enable request.
pub const DEFAULT_MAX_REMOTE_HANDLES: usize = 0x100;

/// Configuration for a [`Collector`](crate::Collector).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CovConfig {
    /// Upper bound, in words, for `InitTrace` capacities.
    pub max_trace_words: usize,
    /// Upper bound, in words, for remote scratch areas.
    pub max_remote_words: usize,
    /// Upper bound on the handle list of a single remote-enable request.
    pub max_remote_handles: usize,
    /// Whether comparison-operand tracing may be selected.
    pub comparisons: bool,
    /// Subtracted (wrapping) from every recorded site address.
    pub address_bias: u64,
}

impl Default for CovConfig {
    fn default() -> Self {
        Self {
            max_trace_words: DEFAULT_MAX_TRACE_WORDS,
            max_remote_words: DEFAULT_MAX_TRACE_WORDS,
            max_remote_handles: DEFAULT_MAX_REMOTE_HANDLES,
            comparisons: true,
            address_bias: 0,
        }
    }
}

/// Configuration validation and loading errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_trace_words` is below the two-word minimum or overflows byte sizing.
    #[error("max_trace_words {0} out of range")]
    InvalidMaxTraceWords(usize),
    /// `max_remote_words` is below the two-word minimum or above `max_trace_words`.
    #[error("max_remote_words {0} out of range")]
    InvalidMaxRemoteWords(usize),
    /// `max_remote_handles` is zero.
    #[error("max_remote_handles must be non-zero")]
    InvalidMaxRemoteHandles,
    /// An environment variable could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
    /// A config file could not be read or parsed.
    #[error("config file: {0}")]
    File(String),
}

impl From<ConfigError> for crate::Error {
    fn from(e: ConfigError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

impl CovConfig {
    /// Environment variable overriding [`max_trace_words`](Self::max_trace_words).
    pub const ENV_MAX_TRACE_WORDS: &'static str = "COVTRACE_MAX_TRACE_WORDS";
    /// Environment variable overriding [`max_remote_words`](Self::max_remote_words).
    pub const ENV_MAX_REMOTE_WORDS: &'static str = "COVTRACE_MAX_REMOTE_WORDS";
    /// Environment variable overriding [`max_remote_handles`](Self::max_remote_handles).
    pub const ENV_MAX_REMOTE_HANDLES: &'static str = "COVTRACE_MAX_REMOTE_HANDLES";
    /// Environment variable overriding [`comparisons`](Self::comparisons).
    pub const ENV_COMPARISONS: &'static str = "COVTRACE_COMPARISONS";
    /// Environment variable overriding [`address_bias`](Self::address_bias).
    pub const ENV_ADDRESS_BIAS: &'static str = "COVTRACE_ADDRESS_BIAS";

    /// Validates the configuration for basic sanity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_trace_words < MIN_TRACE_WORDS
            || self.max_trace_words > DEFAULT_MAX_TRACE_WORDS
        {
            return Err(ConfigError::InvalidMaxTraceWords(self.max_trace_words));
        }
        if self.max_remote_words < MIN_TRACE_WORDS
            || self.max_remote_words > self.max_trace_words
        {
            return Err(ConfigError::InvalidMaxRemoteWords(self.max_remote_words));
        }
        if self.max_remote_handles == 0 {
            return Err(ConfigError::InvalidMaxRemoteHandles);
        }
        Ok(())
    }

    /// Loads defaults overridden by `COVTRACE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads defaults overridden by values from `lookup`, keyed by the
    /// `COVTRACE_*` variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(Self::ENV_MAX_TRACE_WORDS) {
            config.max_trace_words = parse_usize(Self::ENV_MAX_TRACE_WORDS, &raw)?;
        }
        if let Some(raw) = lookup(Self::ENV_MAX_REMOTE_WORDS) {
            config.max_remote_words = parse_usize(Self::ENV_MAX_REMOTE_WORDS, &raw)?;
        }
        if let Some(raw) = lookup(Self::ENV_MAX_REMOTE_HANDLES) {
            config.max_remote_handles = parse_usize(Self::ENV_MAX_REMOTE_HANDLES, &raw)?;
        }
        if let Some(raw) = lookup(Self::ENV_COMPARISONS) {
            config.comparisons = parse_bool(Self::ENV_COMPARISONS, &raw)?;
        }
        if let Some(raw) = lookup(Self::ENV_ADDRESS_BIAS) {
            config.address_bias = parse_u64(Self::ENV_ADDRESS_BIAS, &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document into a validated configuration.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(doc).map_err(|e| ConfigError::File(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let doc = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::File(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&doc)
    }
}

fn parse_u64(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let trimmed = raw.trim();
    let parsed = trimmed.strip_prefix("0x").map_or_else(
        || trimmed.parse::<u64>(),
        |hex| u64::from_str_radix(hex, 16),
    );
    parsed.map_err(|_| ConfigError::InvalidEnv {
        var,
        value: raw.to_string(),
    })
}

fn parse_usize(var: &'static str, raw: &str) -> Result<usize, ConfigError> {
    let value = parse_u64(var, raw)?;
    usize::try_from(value).map_err(|_| ConfigError::InvalidEnv {
        var,
        value: raw.to_string(),
    })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        crate::test_utils::init_test_logging();
        let config = CovConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_trace_words, (i32::MAX as usize) / 8);
        assert_eq!(config.max_remote_handles, 0x100);
        assert!(config.comparisons);
    }

    #[test]
    fn rejects_tiny_trace_bound() {
        let config = CovConfig {
            max_trace_words: 1,
            max_remote_words: 1,
            ..CovConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxTraceWords(1)));
    }

    #[test]
    fn rejects_remote_bound_above_trace_bound() {
        let config = CovConfig {
            max_trace_words: 64,
            max_remote_words: 128,
            ..CovConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxRemoteWords(128))
        );
    }

    #[test]
    fn rejects_zero_handles() {
        let config = CovConfig {
            max_remote_handles: 0,
            ..CovConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxRemoteHandles)
        );
    }

    #[test]
    fn env_layering_overrides_defaults() {
        let config = CovConfig::from_lookup(lookup_from(&[
            ("COVTRACE_MAX_TRACE_WORDS", "4096"),
            ("COVTRACE_MAX_REMOTE_WORDS", "0x200"),
            ("COVTRACE_COMPARISONS", "off"),
            ("COVTRACE_ADDRESS_BIAS", "0xffff800000000000"),
        ]))
        .expect("valid env");
        assert_eq!(config.max_trace_words, 4096);
        assert_eq!(config.max_remote_words, 0x200);
        assert!(!config.comparisons);
        assert_eq!(config.address_bias, 0xffff_8000_0000_0000);
        assert_eq!(config.max_remote_handles, DEFAULT_MAX_REMOTE_HANDLES);
    }

    #[test]
    fn env_rejects_garbage() {
        let err = CovConfig::from_lookup(lookup_from(&[("COVTRACE_COMPARISONS", "maybe")]))
            .expect_err("garbage bool");
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "COVTRACE_COMPARISONS",
                ..
            }
        ));
    }

    #[test]
    fn env_result_is_validated() {
        let err = CovConfig::from_lookup(lookup_from(&[("COVTRACE_MAX_REMOTE_HANDLES", "0")]))
            .expect_err("zero handles");
        assert_eq!(err, ConfigError::InvalidMaxRemoteHandles);
    }

    #[test]
    fn config_error_converts_to_invalid_argument() {
        let err: crate::Error = ConfigError::InvalidMaxRemoteHandles.into();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn serde_round_trip_preserves_fields() {
        let config = CovConfig {
            max_trace_words: 1 << 16,
            max_remote_words: 1 << 12,
            max_remote_handles: 8,
            comparisons: false,
            address_bias: 0x1000,
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: CovConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_file_loading() {
        use std::io::Write as _;

        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "max_trace_words = 1024\nmax_remote_words = 256\ncomparisons = false")
            .expect("write");
        let config = CovConfig::from_toml_file(file.path()).expect("load");
        assert_eq!(config.max_trace_words, 1024);
        assert_eq!(config.max_remote_words, 256);
        assert!(!config.comparisons);
        assert_eq!(config.max_remote_handles, DEFAULT_MAX_REMOTE_HANDLES);
    }
}
