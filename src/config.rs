//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - midlayer.toml (default configuration)
//! - midlayer.local.toml (git-ignored local overrides)
//! - Environment variables (MIDLAYER_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # midlayer.toml
//! [pipeline]
//! opt_level = 2
//! verbosity = 1
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! MIDLAYER_PIPELINE__OPT_LEVEL=3
//! MIDLAYER_LOGGING__LEVEL=debug
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Optimization pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Optimization level (0-3); passes with a higher minimum are skipped
    #[serde(default)]
    pub opt_level: u8,

    /// Enables additional validation; no behavioral change in release
    #[serde(default)]
    pub debug_mode: bool,

    /// 0 silent, 1 per-pass timing lines, 2 per-pass trace
    #[serde(default)]
    pub verbosity: u8,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. midlayer.toml (base configuration)
    /// 2. midlayer.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (MIDLAYER_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("midlayer.toml"))
            .merge(Toml::file("midlayer.local.toml"))
            .merge(Env::prefixed("MIDLAYER_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("MIDLAYER_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            opt_level: 0,
            debug_mode: false,
            verbosity: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Install a global tracing subscriber honoring the logging config. Safe to
/// call more than once; later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // an already-installed subscriber wins
    drop(result);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.opt_level, 0);
        assert!(!config.pipeline.debug_mode);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        // Verify it contains expected sections
        assert!(toml_str.contains("[pipeline]"));
        assert!(toml_str.contains("[logging]"));
    }
}
