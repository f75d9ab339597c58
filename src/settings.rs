use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::census::CENSUS_BASE_URL;
use crate::error::Result;

pub const CONFIG_FILE: &str = "csvsearch.toml";

/// Process settings: built-in defaults, overridden by an optional TOML file,
/// overridden by `CSVSEARCH_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub cache_max_entries: usize,
    pub cache_ttl_secs: u64,
    pub census_base_url: String,
    pub log_level: String,
}

impl Settings {
    /// Reads the file named by `CSVSEARCH_CONFIG`, or `csvsearch.toml`.
    pub fn load() -> Result<Self> {
        let file = std::env::var("CSVSEARCH_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
        Self::from_file(file)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 3232_i64)?
            .set_default("data_dir", "data")?
            .set_default("cache_max_entries", 100_i64)?
            .set_default("cache_ttl_secs", 1800_i64)?
            .set_default("census_base_url", CENSUS_BASE_URL)?
            .set_default("log_level", "info")?
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("CSVSEARCH"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
