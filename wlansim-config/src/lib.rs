//! # wlansim Configuration System
//!
//! Hierarchical configuration for the simulator: defaults, YAML files, and
//! environment overrides, validated before anything starts.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod population;
mod services;
mod traffic;
mod validation;

pub use error::ConfigError;
pub use population::BaseValuesConfig;
pub use population::PopulationConfig;
pub use services::BackoffConfig;
pub use services::ServicesConfig;
pub use traffic::TrafficConfig;

/// Top-level configuration container for all simulator components.
#[derive(Debug, Serialize, Deserialize, Validate, Default)]
pub struct WlansimConfig {
    /// Traffic handler parameters (ports, workers, polling).
    #[validate(nested)]
    pub traffic: TrafficConfig,

    /// Population sizing and allocation base values.
    #[validate(nested)]
    pub population: PopulationConfig,

    /// Per-service protocol tuning.
    #[validate(nested)]
    pub services: ServicesConfig,
}

impl WlansimConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/wlansim.yaml` - base settings. If missing, defaults are used.
    /// 3. `WLANSIM_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(WlansimConfig::default()));

        if Path::new("config/wlansim.yaml").exists() {
            figment = figment.merge(Yaml::file("config/wlansim.yaml"));
        }

        figment
            .merge(Env::prefixed("WLANSIM_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Load configuration from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Figment::from(Serialized::defaults(WlansimConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("WLANSIM_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
