use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub models_dir: PathBuf,
    pub registry_file: PathBuf,
    pub default_epochs: usize,
    pub standard_training_data: PathBuf,
    pub plots_dir: PathBuf,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            registry_file: PathBuf::from("models/models.json"),
            default_epochs: 200,
            standard_training_data: PathBuf::from("data/weather.csv"),
            plots_dir: PathBuf::from("plots"),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then `tempcast.toml`, then `TEMPCAST_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::figment("tempcast.toml")
    }

    pub fn figment(toml_path: &str) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("TEMPCAST_"));
        figment
            .extract()
            .map_err(|e| ForecastError::Config(e.to_string()))
    }
}
