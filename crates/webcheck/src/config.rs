use std::{env, fmt, fs, io, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("failed to write config: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub redis: RedisConfig,
    pub stream: StreamConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub max_connections: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: "redis://localhost:6379".into(), max_connections: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub name: String,
    pub group: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { name: "check_jobs".into(), group: "workers".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_secs: u64,
    /// Redis hash holding one JSON site document per field
    pub sites_key: String,
    pub last_check_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_secs: 60, sites_key: "sites".into(), last_check_prefix: "last_check:".into() }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_name: Option<String>,
    pub block_ms: u64,
    pub batch_size: usize,
    pub idle_sleep_ms: u64,
    pub claim_min_idle_secs: u64,
    pub claim_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_name: None,
            block_ms: 1000,
            batch_size: 1,
            idle_sleep_ms: 1000,
            claim_min_idle_secs: 300,
            claim_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub submit_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { url: "http://localhost:8080".into(), submit_timeout_secs: 30 }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/webcheck/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Some(config_home) = env::var_os("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::var_os("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("webcheck/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Redis")?;
        write_1(f, "URL", &redact_url(&self.redis.url))?;
        write_1(f, "Max Connections", &self.redis.max_connections)?;
        write_title_1(f, "Stream")?;
        write_1(f, "Name", &self.stream.name)?;
        write_1(f, "Group", &self.stream.group)?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Tick (s)", &self.scheduler.tick_secs)?;
        write_1(f, "Sites Key", &self.scheduler.sites_key)?;
        write_1(f, "Last Check Prefix", &self.scheduler.last_check_prefix)?;
        write_title_1(f, "Worker")?;
        write_1(f, "Consumer", &self.worker.consumer_name.as_deref().unwrap_or("<generated>"))?;
        write_1(f, "Block (ms)", &self.worker.block_ms)?;
        write_1(f, "Batch Size", &self.worker.batch_size)?;
        write_1(f, "Idle Sleep (ms)", &self.worker.idle_sleep_ms)?;
        write_1(f, "Claim Min Idle (s)", &self.worker.claim_min_idle_secs)?;
        write_1(f, "Claim Interval (s)", &self.worker.claim_interval_secs)?;
        write_title_1(f, "Backend")?;
        write_1(f, "URL", &self.backend.url)?;
        write_1(f, "Submit Timeout (s)", &self.backend.submit_timeout_secs)?;

        Ok(())
    }
}

/// Hide the password part of a redis url so the config dump can be logged.
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

impl Config {
    /// Generate Config structure from file, then apply environment overrides
    ///
    /// Creates a default config in ~/.config/webcheck/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let cfg = webcheck::Config::load(None)?;
    /// println!("{}", cfg);
    /// ```
    pub fn load(optional_path: Option<&path::Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_config(optional_path)?;
        config.apply_env(|name| env::var(name).ok());
        Ok(config)
    }

    /// Read the config file without looking at the environment
    pub fn from_config(optional_path: Option<&path::Path>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path)
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(ConfigError::WriteFailed)
    }

    /// Connection endpoints are usually injected by the deployment rather than the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = non_empty("REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(url) = non_empty("BACKEND_URL") {
            self.backend.url = url;
        }
        if let Some(name) = non_empty("WORKER_CONSUMER_NAME") {
            self.worker.consumer_name = Some(name);
        }
    }
}
