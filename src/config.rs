use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MemoryConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

/// Where markdown snapshots live. `backend` is one of `local`, `remote`, `memory`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: String,
    pub local_root: String,
    pub remote_url: Option<String>,
    pub remote_bucket: String,
    pub remote_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SummarizerConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub batch_limit: usize,
    pub max_tool_rounds: usize,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8737,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let local_root = default_data_dir()
            .join("snapshots")
            .to_string_lossy()
            .into_owned();
        Self {
            backend: "local".into(),
            local_root,
            remote_url: None,
            remote_bucket: "memory-snapshots".into(),
            remote_key: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let db_path = default_data_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openrouter".into(),
            model: "z-ai/glm-4.5-air".into(),
            base_url: "https://openrouter.ai/api/v1".into(),
            api_key_env: "OPENROUTER_API_KEY".into(),
            batch_limit: 25,
            max_tool_rounds: 3,
            timeout_secs: 60,
        }
    }
}

/// Returns `~/.mdmemory/`, falling back to `./.mdmemory` when no home directory is known.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mdmemory")
}

/// Returns the default config file path: `~/.mdmemory/config.toml`
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl MemoryConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemoryConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MDMEMORY_DB") {
            self.database.db_path = val;
        }
        if let Ok(val) = std::env::var("MDMEMORY_STORAGE") {
            self.storage.backend = val;
        }
        if let Ok(val) = std::env::var("MDMEMORY_LOCAL_ROOT") {
            self.storage.local_root = val;
        }
        if let Ok(val) = std::env::var("MDMEMORY_REMOTE_URL") {
            self.storage.remote_url = Some(val);
        }
        if let Ok(val) = std::env::var("MDMEMORY_REMOTE_KEY") {
            self.storage.remote_key = Some(val);
        }
        if let Ok(val) = std::env::var("MDMEMORY_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MDMEMORY_MODEL") {
            self.summarizer.model = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.database.db_path)
    }

    /// Resolve the local snapshot root, expanding `~` if needed.
    pub fn resolved_local_root(&self) -> PathBuf {
        expand_tilde(&self.storage.local_root)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MemoryConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.backend, "local");
        assert_eq!(config.summarizer.batch_limit, 25);
        assert!(config.database.db_path.ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
backend = "remote"
remote_url = "https://example.supabase.co"

[summarizer]
batch_limit = 10
"#;
        let config: MemoryConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.backend, "remote");
        assert_eq!(
            config.storage.remote_url.as_deref(),
            Some("https://example.supabase.co")
        );
        assert_eq!(config.summarizer.batch_limit, 10);
        // defaults still apply for unset fields
        assert_eq!(config.storage.remote_bucket, "memory-snapshots");
        assert_eq!(config.summarizer.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MemoryConfig::default();
        std::env::set_var("MDMEMORY_DB", "/tmp/override.db");
        std::env::set_var("MDMEMORY_STORAGE", "memory");
        std::env::set_var("MDMEMORY_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.database.db_path, "/tmp/override.db");
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.server.log_level, "trace");

        std::env::remove_var("MDMEMORY_DB");
        std::env::remove_var("MDMEMORY_STORAGE");
        std::env::remove_var("MDMEMORY_LOG_LEVEL");
    }

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand_tilde("/abs/path.db");
        assert_eq!(expanded, PathBuf::from("/abs/path.db"));
    }
}
