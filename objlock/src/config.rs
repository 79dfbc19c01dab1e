//! Configuration for the objlock binary.
//!
//! The configuration file is YAML or JSON, selected by extension, and any
//! value can be overridden with `OBJLOCK__`-prefixed environment variables,
//! e.g. `OBJLOCK__LOCK__TTL=10m`.

use config::Config;
use objlock_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "OBJLOCK";

/// Errors raised while loading the configuration.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configuration file could not be read.
    #[error("IO operation failed on path {path}: {source}")]
    IO {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration could not be parsed or deserialized.
    #[error("Failed to parse configuration: {source}")]
    Config {
        #[source]
        source: config::ConfigError,
    },
}

/// Top-level configuration.
#[derive(PartialEq, Clone, Debug, Deserialize, Serialize)]
pub struct AppConfig {
    /// Lock to acquire.
    pub lock: objlock_object_store::config::Lock,
    /// Optional app-level retry configuration (overridden by the lock's own).
    pub retry: Option<RetryConfig>,
}

impl AppConfig {
    /// Loads the configuration file and applies environment overrides.
    pub fn load(path: &Path) -> Result<AppConfig, Error> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::IO {
            path: path.to_path_buf(),
            source,
        })?;

        let file_format = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => config::FileFormat::Yaml,
            _ => config::FileFormat::Json,
        };

        Config::builder()
            .add_source(config::File::from_str(&contents, file_format))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|source| Error::Config { source })?
            .try_deserialize::<AppConfig>()
            .map_err(|source| Error::Config { source })
    }
}
