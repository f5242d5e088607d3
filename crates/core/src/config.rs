//! Config file parsing for `~/.config/xunpack/config.toml`.
//!
//! Loading is lenient: a missing or malformed file yields defaults. Use
//! `security_limits_from_config` and `progress_from_config` to turn the
//! loaded sections into the types the library works with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::progress::{ProgressState, DEFAULT_MIN_INTERVAL, DEFAULT_SLOT_CAPACITY};
use crate::security::SecurityLimits;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub test: TestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_slot_capacity")]
    pub slot_capacity: usize,
}

fn default_true() -> bool {
    true
}
fn default_min_interval_ms() -> u64 {
    DEFAULT_MIN_INTERVAL.as_millis() as u64
}
fn default_slot_capacity() -> usize {
    DEFAULT_SLOT_CAPACITY
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: default_min_interval_ms(),
            slot_capacity: DEFAULT_SLOT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_file_count: Option<u64>,
    pub max_total_size_mb: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestConfig {
    /// Parent directory for the Test action's scratch directory.
    pub temp_root: Option<PathBuf>,
}

/// Load config from the default path (`~/.config/xunpack/config.toml`).
pub fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => AppConfig::default(),
    }
}

/// Load config from an explicit path.
pub fn load_config_from(path: &Path) -> AppConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return AppConfig::default(),
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("ignoring malformed config {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}

/// Return the default config file path.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("xunpack");
        p.push("config.toml");
        p
    })
}

/// Build security limits from config. Uses defaults for any unset values.
pub fn security_limits_from_config(c: &SecurityConfig) -> SecurityLimits {
    let mut limits = SecurityLimits::default();
    if let Some(count) = c.max_file_count {
        limits.max_file_count = count;
    }
    if let Some(mb) = c.max_total_size_mb {
        limits.max_total_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
    }
    limits
}

/// A fresh progress table sized and throttled per config, without a callback.
pub fn progress_from_config(c: &ProgressConfig) -> ProgressState {
    ProgressState::new(c.slot_capacity).with_min_interval(Duration::from_millis(c.min_interval_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let cfg = load_config_from(Path::new("/definitely/not/here.toml"));
        assert!(cfg.progress.enabled);
        assert_eq!(cfg.progress.min_interval_ms, 50);
        assert_eq!(cfg.progress.slot_capacity, 8);
        assert!(cfg.test.temp_root.is_none());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[progress]\nmin_interval_ms = 10\n\n[security]\nmax_total_size_mb = 2\n",
        )
        .unwrap();

        let cfg = load_config_from(&path);
        assert!(cfg.progress.enabled);
        assert_eq!(cfg.progress.min_interval_ms, 10);
        assert_eq!(cfg.progress.slot_capacity, 8);

        let limits = security_limits_from_config(&cfg.security);
        assert_eq!(limits.max_total_size_bytes, 2 * 1024 * 1024);
        assert_eq!(limits.max_file_count, SecurityLimits::default().max_file_count);

        let progress = progress_from_config(&cfg.progress);
        assert_eq!(progress.min_interval(), Duration::from_millis(10));
        assert_eq!(progress.capacity(), 8);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[progress\nenabled = ").unwrap();
        let cfg = load_config_from(&path);
        assert_eq!(cfg.progress.slot_capacity, 8);
    }

    #[test]
    fn test_config_path_location() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("xunpack/config.toml"));
        }
    }
}
