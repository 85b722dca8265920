//! # Client Configuration
//!
//! Defines the configuration of an offline client and the logic for loading it
//! from defaults, an optional `coursesync.yml` file and `COURSESYNC_*`
//! environment variables, in increasing order of precedence.

use crate::constants::{
    DEFAULT_AI_CACHE_CAPACITY, DEFAULT_API_BASE_URL, DEFAULT_DB_FILE, DEFAULT_MEDIA_DIR,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::errors::ConfigError;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// The default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "coursesync.yml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL of the learning platform. Loaded from `COURSESYNC_API_BASE_URL`.
    pub api_base_url: String,
    /// Path of the offline database, or ":memory:". Loaded from `COURSESYNC_DB_PATH`.
    pub db_path: String,
    /// Directory for cached lesson media. Loaded from `COURSESYNC_MEDIA_DIR`.
    pub media_dir: String,
    /// Deadline for every remote call, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum number of cached AI-tutor responses.
    pub ai_cache_capacity: usize,
    /// Period of the background drain. Unset means foreground-only draining.
    #[serde(default)]
    pub background_sync_interval_secs: Option<u64>,
    /// The reachability assumed at startup, before the first reachability check.
    pub start_online: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            db_path: DEFAULT_DB_FILE.to_string(),
            media_dir: DEFAULT_MEDIA_DIR.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            ai_cache_capacity: DEFAULT_AI_CACHE_CAPACITY,
            background_sync_interval_secs: None,
            start_online: true,
        }
    }
}

impl SyncConfig {
    /// Loads `.env`, then `coursesync.yml` if present, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_from(Some(DEFAULT_CONFIG_FILE))
    }

    /// Loads the configuration with an optional YAML file. A missing file is not an error.
    pub fn load_from(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .set_default("api_base_url", DEFAULT_API_BASE_URL)?
            .set_default("db_path", DEFAULT_DB_FILE)?
            .set_default("media_dir", DEFAULT_MEDIA_DIR)?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
            .set_default("ai_cache_capacity", DEFAULT_AI_CACHE_CAPACITY as u64)?
            .set_default("start_online", true)?;

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml).required(false));
        }
        builder = builder.add_source(Environment::with_prefix("COURSESYNC").try_parsing(true));

        let config: SyncConfig = builder.build()?.try_deserialize()?;
        info!(api = %config.api_base_url, db = %config.db_path, "Configuration loaded.");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn background_sync_interval(&self) -> Option<Duration> {
        self.background_sync_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
