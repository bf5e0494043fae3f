//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable consulted for the root folder
pub const ROOT_ENV_VAR: &str = "REPLAY_ROOT";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` key of the TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    if let Some(path) = cli_arg {
        debug!(source = "cli", path, "Root folder resolved");
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            debug!(source = "env", path = %path, "Root folder resolved");
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = config_file_path() {
        if let Some(root) = root_folder_from_file(&config_path) {
            debug!(source = "toml", path = %root.display(), "Root folder resolved");
            return root;
        }
    }

    default_root_folder()
}

/// Read the `root_folder` key from a TOML config file, if present
fn root_folder_from_file(config_path: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(config_path).ok()?;
    let value = toml::from_str::<toml::Value>(&content).ok()?;
    value
        .get("root_folder")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
}

/// Locate the user (or, on Linux, system) config file
///
/// Returns `None` when no config file exists.
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("replay").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/replay/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Deserialize a TOML file into `T`
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("replay"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/replay"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("replay"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/replay"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("replay"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\replay"))
    } else {
        PathBuf::from("./replay_data")
    }
}

/// Root folder layout: models and default outputs live beneath it
#[derive(Debug, Clone)]
pub struct RootFolder {
    root: PathBuf,
}

impl RootFolder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory holding one sub-directory per voice model
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    /// Directory holding stemming model weights
    pub fn weights_dir(&self) -> PathBuf {
        self.root.join("weights")
    }

    /// Output directory used when a request does not name one
    pub fn outputs_dir(&self) -> PathBuf {
        self.root.join("outputs")
    }

    /// Create the root folder and its standard sub-directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.models_dir(),
            self.weights_dir(),
            self.outputs_dir(),
        ] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                info!(path = %dir.display(), "Created directory");
            }
        }
        Ok(())
    }
}
