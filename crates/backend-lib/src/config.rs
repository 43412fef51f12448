// ============================
// tunepool-backend/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "TUNEPOOL_";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP listener
    pub server: ServerSettings,
    /// Room stores location
    pub storage: StorageSettings,
    /// Music provider access
    pub provider: ProviderSettings,
    /// Processing runs
    pub processing: ProcessingSettings,
    /// Log level
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root directory holding both room stores
    pub path: PathBuf,
}

/// Provider paging and rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Directory with per-user library fixtures served by `FixtureProvider`
    pub library_dir: PathBuf,
    /// Items requested per page
    pub page_size: usize,
    /// Fixed delay between two page fetches, in milliseconds
    pub page_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// A run older than this is considered stuck and reset on next read
    pub timeout_secs: u64,
    /// Period of the store reconciliation pass
    pub reconcile_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            storage: StorageSettings {
                path: PathBuf::from("data"),
            },
            provider: ProviderSettings::default(),
            processing: ProcessingSettings {
                timeout_secs: 10 * 60,
                reconcile_interval_secs: 5 * 60,
            },
            log_level: "info".to_string(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            library_dir: PathBuf::from("data/libraries"),
            page_size: 50,
            page_delay_ms: 100,
        }
    }
}

impl ProviderSettings {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl ProcessingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

impl Settings {
    /// Load settings from `config.toml` in the working directory and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load settings from a TOML file, then environment variables prefixed `TUNEPOOL_`.
    /// A missing file falls back to defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("invalid configuration in {}", path.as_ref().display()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            bail!("unknown log level {:?}", self.log_level);
        }
        if self.provider.page_size == 0 {
            bail!("provider.page_size must be positive");
        }
        if self.processing.timeout_secs == 0 {
            bail!("processing.timeout_secs must be positive");
        }
        if self.processing.reconcile_interval_secs == 0 {
            bail!("processing.reconcile_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.server.host, self.server.port))
    }
}
