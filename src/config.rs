//! Configuration for the object graph and the query builders.
//!
//! Settings are read from `config/config.toml` (section `[graph]`) when present and
//! overridden by environment variables such as `LIFEGRAPH__GRAPH__MAX_BUILD_DEPTH`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/config.toml";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GraphConfig {
    /// Number of relation generations hydrated for `BuildDepth::Infinite`
    #[serde(default = "default_max_build_depth")]
    pub max_build_depth: u32,
    /// Maximum number of hops searched when resolving relation paths in string queries
    #[serde(default = "default_max_relation_path_length")]
    pub max_relation_path_length: usize,
    /// Number of statements kept by a `StatementCache`
    #[serde(default = "default_statement_cache_capacity")]
    pub statement_cache_capacity: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    /// Optional JSON file describing the entity types
    #[serde(default)]
    pub metadata_path: Option<String>,
}

fn default_max_build_depth() -> u32 {
    10
}

fn default_max_relation_path_length() -> usize {
    10
}

fn default_statement_cache_capacity() -> usize {
    256
}

fn default_page_size() -> u64 {
    10
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_build_depth: default_max_build_depth(),
            max_relation_path_length: default_max_relation_path_length(),
            statement_cache_capacity: default_statement_cache_capacity(),
            default_page_size: default_page_size(),
            metadata_path: None,
        }
    }
}

impl GraphConfig {
    /// Load the graph configuration from `config/config.toml`, falling back to env vars.
    ///
    /// A missing `[graph]` section yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("LIFEGRAPH").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // The file exists but could not be read or parsed: retry with env only
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("Failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("LIFEGRAPH").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        Self::from_settings(&settings)
    }

    fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        match settings.get::<GraphConfig>("graph") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Graph configuration could not be loaded from file or environment: {e}"
            ))),
        }
    }
}
