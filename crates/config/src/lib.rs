//! Layered configuration.
//!
//! Sources are merged in order, later sources winning:
//! 1. built-in defaults,
//! 2. an optional file (`.toml`, `.yaml`/`.yml` or `.json`),
//! 3. `LARDER_`-prefixed environment variables, nested with `__`
//!    (`LARDER_DATABASE__IN_MEMORY=true`).

pub mod error;

pub use crate::error::{Error, ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "LARDER_";
const QUALIFIER: &str = "org";
const APPLICATION: &str = "larder";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub agency: String,
    pub client: String,
    pub name: String,
    /// Explicit database file; overrides the location derived from the name parts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub in_memory: bool,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            agency: "larder".to_string(),
            client: "default".to_string(),
            name: "broadcasts".to_string(),
            path: None,
            in_memory: false,
            max_connections: 5,
            busy_timeout_ms: 1500,
        }
    }
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Memory,
}

impl DatabaseConfig {
    /// `{agency}-{client}-{name}.sqlite3`
    pub fn file_name(&self) -> String {
        format!("{}-{}-{}.sqlite3", self.agency, self.client, self.name)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn location(&self) -> Result<Location> {
        if self.in_memory {
            return Ok(Location::Memory);
        }
        if let Some(path) = &self.path {
            return Ok(Location::File(path.clone()));
        }
        let dirs = ProjectDirs::from(QUALIFIER, &self.agency, APPLICATION).ok_or_raise(|| ErrorKind::NoDataDirectory)?;
        Ok(Location::File(dirs.data_dir().join(self.file_name())))
    }

    fn validate(&self) -> Result<()> {
        for (part, value) in [("agency", &self.agency), ("client", &self.client), ("name", &self.name)] {
            if value.trim().is_empty() {
                exn::bail!(ErrorKind::Invalid(format!("database.{part} must not be empty")));
            }
        }
        if self.max_connections < 1 {
            exn::bail!(ErrorKind::Invalid("database.max_connections must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Config {
    /// The merged provider chain, before extraction.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate configuration from every source.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(file)?)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.database.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }
}
