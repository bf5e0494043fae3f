//! Service configuration
//!
//! Loaded from the `[service]` table of the shared TOML config file.
//! Every field has a serde default, so an absent file or table yields the
//! defaults below. Paths default to locations under the root folder.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use replay_common::config::{config_file_path, load_toml_file, RootFolder};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5725;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on retained separation lock entries
    #[serde(default = "default_separation_lock_capacity")]
    pub separation_lock_capacity: usize,

    /// Processing jobs silent for longer than this are reported stale
    #[serde(default = "default_heartbeat_stale_seconds")]
    pub heartbeat_stale_seconds: u64,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Defaults to `<root>/models`
    #[serde(default)]
    pub models_dir: Option<PathBuf>,

    /// Defaults to `<root>/outputs`
    #[serde(default)]
    pub default_output_dir: Option<PathBuf>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_separation_lock_capacity() -> usize {
    crate::cache::separation_cache::DEFAULT_LOCK_CAPACITY
}

fn default_heartbeat_stale_seconds() -> u64 {
    120
}

fn default_event_capacity() -> usize {
    100
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            separation_lock_capacity: default_separation_lock_capacity(),
            heartbeat_stale_seconds: default_heartbeat_stale_seconds(),
            event_capacity: default_event_capacity(),
            models_dir: None,
            default_output_dir: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    service: ServiceConfig,
}

impl ServiceConfig {
    /// Load from an explicit file
    pub fn from_file(path: &Path) -> replay_common::Result<Self> {
        let file: ConfigFile = load_toml_file(path)?;
        Ok(file.service)
    }

    /// Load from `explicit` if given, else the standard config file, else defaults
    pub fn load(explicit: Option<&Path>) -> replay_common::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match config_file_path() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading service config");
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn models_dir(&self, root: &RootFolder) -> PathBuf {
        self.models_dir.clone().unwrap_or_else(|| root.models_dir())
    }

    pub fn output_dir(&self, root: &RootFolder) -> PathBuf {
        self.default_output_dir
            .clone()
            .unwrap_or_else(|| root.outputs_dir())
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_stale_seconds.min(i64::MAX as u64) as i64)
    }
}
