use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const ENV_CONFIG: &str = "JUKEBOX_CONFIG";
pub const ENV_MUSIC_ROOT: &str = "JUKEBOX_MUSIC_ROOT";
pub const ENV_DB_PATH: &str = "JUKEBOX_DB_PATH";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JukeboxConfig {
    pub music_root: String,
    pub index_path: String,
    pub mpv_socket: String,
    pub playlist_target_secs: f64,
    pub dispatch_timeout_secs: u64,
}

impl Default for JukeboxConfig {
    fn default() -> Self {
        Self {
            music_root: "/mnt/lossless".to_string(),
            index_path: "jukebox.redb".to_string(),
            mpv_socket: player::DEFAULT_SOCKET.to_string(),
            playlist_target_secs: playlist::TARGET_SECONDS_DEFAULT,
            dispatch_timeout_secs: player::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var(ENV_CONFIG) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Load the YAML config, creating a default file on first run, then
/// apply environment overrides on top. Returns the config and whether
/// the file was created.
pub fn load_or_create_config(path: &Path) -> Result<(JukeboxConfig, bool), ConfigError> {
    let (mut config, created) = if path.exists() {
        let contents = fs::read_to_string(path)?;
        (serde_yaml::from_str(&contents)?, false)
    } else {
        let config = JukeboxConfig::default();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_yaml::to_string(&config)?)?;
        (config, true)
    };

    if config.playlist_target_secs <= 0.0 {
        config.playlist_target_secs = playlist::TARGET_SECONDS_DEFAULT;
    }
    if config.dispatch_timeout_secs == 0 {
        config.dispatch_timeout_secs = player::DEFAULT_TIMEOUT.as_secs();
    }

    if let Ok(value) = env::var(ENV_MUSIC_ROOT) {
        if !value.trim().is_empty() {
            config.music_root = value;
        }
    }
    if let Ok(value) = env::var(ENV_DB_PATH) {
        if !value.trim().is_empty() {
            config.index_path = value;
        }
    }

    Ok((config, created))
}

/// Relative paths in the config resolve against the config file's
/// directory, not the process cwd.
pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let candidate = PathBuf::from(value);
    if candidate.is_absolute() {
        return candidate;
    }
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(candidate),
        _ => candidate,
    }
}
