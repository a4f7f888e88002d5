use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sort::SortMode;

const DEFAULT_ENV_PREFIX: &str = "FORUM_STATE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub discourse: DiscourseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:3000/api/".to_string()
}

fn default_user_agent() -> String {
    format!("forum-state/{}", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DiscourseConfig {
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
        }
    }
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default)]
    pub default_sort: SortMode,
    #[serde(default = "default_width")]
    pub width: usize,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            default_sort: SortMode::default(),
            width: default_width(),
        }
    }
}

fn default_width() -> usize {
    80
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = apply_env(cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }

    if !other.discourse.base_url.is_empty() {
        base.discourse.base_url = other.discourse.base_url;
    }

    base.sync.refresh_interval = other.sync.refresh_interval;

    base.ui.default_sort = other.ui.default_sort;
    if other.ui.width != 0 {
        base.ui.width = other.ui.width;
    }

    if !other.log.level.is_empty() {
        base.log.level = other.log.level;
    }

    base
}

fn apply_env(mut cfg: Config, prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "discourse.base_url" => cfg.discourse.base_url = value,
        "sync.refresh_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.sync.refresh_interval = duration;
            }
        }
        "ui.default_sort" => cfg.ui.default_sort = SortMode::from_key(&value),
        "ui.width" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.ui.width = parsed;
            }
        }
        "log.level" => cfg.log.level = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("forum-state").join("config.yaml"))
}

pub fn to_yaml(cfg: &Config) -> Result<String> {
    serde_yaml::to_string(cfg).context("config: failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("FORUM_STATE_TEST_DEFAULTS".into()),
        })
        .unwrap();
        assert_eq!(cfg.sync.refresh_interval, Duration::from_secs(30));
        assert_eq!(cfg.ui.default_sort, SortMode::Highest);
        assert_eq!(cfg.api.base_url, default_api_base_url());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "discourse:\n  base_url: https://forum.example\nsync:\n  refresh_interval: 2m\nui:\n  default_sort: controversial\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("FORUM_STATE_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.discourse.base_url, "https://forum.example");
        assert_eq!(cfg.sync.refresh_interval, Duration::from_secs(120));
        assert_eq!(cfg.ui.default_sort, SortMode::Controversial);
        assert_eq!(cfg.ui.width, 80);
    }

    #[test]
    fn env_overrides() {
        env::set_var("FORUM_STATE_TEST_ENV_UI__DEFAULT_SORT", "newest");
        env::set_var("FORUM_STATE_TEST_ENV_SYNC__REFRESH_INTERVAL", "5s");
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("FORUM_STATE_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.default_sort, SortMode::Newest);
        assert_eq!(cfg.sync.refresh_interval, Duration::from_secs(5));
        env::remove_var("FORUM_STATE_TEST_ENV_UI__DEFAULT_SORT");
        env::remove_var("FORUM_STATE_TEST_ENV_SYNC__REFRESH_INTERVAL");
    }

    #[test]
    fn yaml_round_trips_durations() {
        let yaml = to_yaml(&Config::default()).unwrap();
        assert!(yaml.contains("refresh_interval: 30s"));
    }
}
