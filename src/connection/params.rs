//! Statement layer configuration.
//!
//! This module handles parsing configuration strings and building
//! [`StatementConfig`] values with validation.

use crate::driver::FetchMode;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default number of cached statements.
pub const DEFAULT_CACHE_SIZE: usize = 20;

/// Whether fetches materialize all rows or hand out a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Collect every row before returning
    #[default]
    Eager,
    /// Return a row stream
    Lazy,
}

impl FromStr for FetchStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eager" | "array" => Ok(FetchStrategy::Eager),
            "lazy" | "stream" | "generator" => Ok(FetchStrategy::Lazy),
            other => Err(ConfigError::InvalidParameter {
                parameter: "strategy".to_string(),
                message: format!("Unknown fetch strategy: {}", other),
            }),
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStrategy::Eager => write!(f, "eager"),
            FetchStrategy::Lazy => write!(f, "lazy"),
        }
    }
}

/// Configuration shared by every statement of a factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementConfig {
    /// Maximum number of cached statements (default: 20)
    pub cache_size: usize,

    /// Commit on successful execution unless a mode is given (default: true)
    pub auto_commit: bool,

    /// Eager or lazy fetch results (default: eager)
    pub strategy: FetchStrategy,

    /// Flags added to every shape's fetch mode (default: nulls and LOBs)
    pub fetch_flags: FetchMode,
}

impl StatementConfig {
    /// Create a new ConfigBuilder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            auto_commit: true,
            strategy: FetchStrategy::Eager,
            fetch_flags: FetchMode::default(),
        }
    }
}

impl FromStr for StatementConfig {
    type Err = ConfigError;

    /// Parse a configuration string in the format `key=value;key=value`.
    ///
    /// Recognized keys are `cache_size`, `auto_commit`, `strategy` and
    /// `fetch_flags` (a comma separated list of `nulls`, `lobs`, or `none`).
    ///
    /// # Examples
    ///
    /// ```
    /// # use ocistmt_rs::connection::{FetchStrategy, StatementConfig};
    /// let config: StatementConfig = "cache_size=50;auto_commit=false;strategy=lazy".parse()?;
    /// assert_eq!(config.cache_size, 50);
    /// assert!(!config.auto_commit);
    /// assert_eq!(config.strategy, FetchStrategy::Lazy);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut builder = ConfigBuilder::new();

        for pair in s.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }

            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ConfigError::ParseError(format!("Invalid configuration entry: {}", pair))
            })?;
            let key = key.trim();
            let value = value.trim();

            builder = match key {
                "cache_size" | "statement_cache_size" => {
                    let size: usize = value.parse().map_err(|_| ConfigError::InvalidParameter {
                        parameter: key.to_string(),
                        message: format!("Invalid cache size: {}", value),
                    })?;
                    builder.cache_size(size)
                }
                "auto_commit" | "autocommit" => builder.auto_commit(parse_bool(key, value)?),
                "strategy" | "fetch_strategy" => builder.strategy(value.parse()?),
                "fetch_flags" => builder.fetch_flags(parse_fetch_flags(value)?),
                other => {
                    return Err(ConfigError::InvalidParameter {
                        parameter: other.to_string(),
                        message: "Unknown configuration key".to_string(),
                    })
                }
            };
        }

        builder.build()
    }
}

impl fmt::Display for StatementConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache_size={};auto_commit={};strategy={}",
            self.cache_size, self.auto_commit, self.strategy
        )
    }
}

/// Builder for constructing StatementConfig with validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    cache_size: Option<usize>,
    auto_commit: Option<bool>,
    strategy: Option<FetchStrategy>,
    fetch_flags: Option<FetchMode>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = Some(cache_size);
        self
    }

    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = Some(auto_commit);
        self
    }

    pub fn strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn fetch_flags(mut self, fetch_flags: FetchMode) -> Self {
        self.fetch_flags = Some(fetch_flags);
        self
    }

    /// Build the StatementConfig with validation.
    pub fn build(self) -> Result<StatementConfig, ConfigError> {
        let defaults = StatementConfig::default();
        let fetch_flags = self.fetch_flags.unwrap_or(defaults.fetch_flags);

        // Row layout comes from the fetch shape, not from configuration
        if fetch_flags.intersects(FetchMode::BOTH) {
            return Err(ConfigError::InvalidParameter {
                parameter: "fetch_flags".to_string(),
                message: "Only RETURN_NULLS and RETURN_LOBS may be configured".to_string(),
            });
        }

        Ok(StatementConfig {
            cache_size: self.cache_size.unwrap_or(defaults.cache_size),
            auto_commit: self.auto_commit.unwrap_or(defaults.auto_commit),
            strategy: self.strategy.unwrap_or(defaults.strategy),
            fetch_flags,
        })
    }
}

/// Parse boolean value from string.
fn parse_bool(key: &str, s: &str) -> Result<bool, ConfigError> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidParameter {
            parameter: key.to_string(),
            message: format!("Invalid boolean value: {}", s),
        }),
    }
}

/// Parse a comma separated fetch flag list.
fn parse_fetch_flags(s: &str) -> Result<FetchMode, ConfigError> {
    let mut flags = FetchMode::empty();
    for flag in s.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        flags |= match flag.to_lowercase().as_str() {
            "nulls" | "return_nulls" => FetchMode::RETURN_NULLS,
            "lobs" | "return_lobs" => FetchMode::RETURN_LOBS,
            "none" => FetchMode::empty(),
            other => {
                return Err(ConfigError::InvalidParameter {
                    parameter: "fetch_flags".to_string(),
                    message: format!("Unknown fetch flag: {}", other),
                })
            }
        };
    }
    Ok(flags)
}
