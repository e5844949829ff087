//! # Application Configuration
//!
//! Settings are read from an optional YAML file named by
//! `CARE_SCHEDULER_CONFIG`, then individual environment variables override
//! single values. Every key is optional in the file.
//!
//! ## YAML Format
//!
//! ```yaml
//! database_url: "sqlite:care_scheduler.db"
//! bind_address: "127.0.0.1:3000"
//! cors_origin: "http://localhost:8080"
//! directory_seed: "directory.yaml"
//! default_page_size: 20
//! max_page_size: 100
//! max_projection_days: 366
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::projector::DEFAULT_MAX_PROJECTION_DAYS;
use crate::domain::schedule_service::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::storage::connection::DEFAULT_DATABASE_URL;

pub const CONFIG_PATH_VAR: &str = "CARE_SCHEDULER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_address: String,
    pub cors_origin: String,
    /// YAML file with patients, staff and authorizations. When absent every
    /// party is accepted under its id.
    pub directory_seed: Option<PathBuf>,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_projection_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_address: "127.0.0.1:3000".to_string(),
            cors_origin: "http://localhost:8080".to_string(),
            directory_seed: None,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            max_projection_days: DEFAULT_MAX_PROJECTION_DAYS,
        }
    }
}

impl AppConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for environment variables
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_yaml_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(&lookup);
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&yaml_content)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(address) = lookup("BIND_ADDRESS") {
            self.bind_address = address;
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            self.cors_origin = origin;
        }
        if let Some(seed) = lookup("DIRECTORY_SEED") {
            self.directory_seed = Some(PathBuf::from(seed));
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.bind_address))
    }
}
