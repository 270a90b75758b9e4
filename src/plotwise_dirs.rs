//! Application directory paths for plotwise.
//!
//! Uses the [`dirs`] crate for platform-appropriate locations.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (databases) | `~/Library/Application Support/plotwise/` | `~/.local/share/plotwise/` |
//! | Config | `~/Library/Application Support/plotwise/` | `~/.config/plotwise/` |
//!
//! # Environment Overrides
//!
//! - `PLOTWISE_DATA_DIR` overrides [`data_dir`]
//! - `PLOTWISE_CONFIG_DIR` overrides [`config_dir`]
//! - `PLOTWISE_CONFIG` overrides [`config_file`] directly

use std::path::PathBuf;

/// Environment variable naming an explicit config file.
pub const CONFIG_FILE_ENV: &str = "PLOTWISE_CONFIG";

/// Application data root directory (databases).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("PLOTWISE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("plotwise"))
        .unwrap_or_else(|| PathBuf::from("/tmp/plotwise-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("PLOTWISE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("plotwise"))
        .unwrap_or_else(|| PathBuf::from("/tmp/plotwise-config"))
}

/// Main config file path: `$PLOTWISE_CONFIG` or `config_dir()/config.toml`.
#[must_use]
pub fn config_file() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_FILE_ENV) {
        return PathBuf::from(path);
    }
    config_dir().join("config.toml")
}

/// Garden store database (`data_dir()/garden.db`).
#[must_use]
pub fn store_file() -> PathBuf {
    data_dir().join("garden.db")
}

/// Job queue database (`data_dir()/queue.db`).
#[must_use]
pub fn queue_file() -> PathBuf {
    data_dir().join("queue.db")
}
