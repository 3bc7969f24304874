use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from `seshdex.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database (supports `~` expansion).
    pub db: String,
    /// Root directory containing per-project session logs (supports `~`).
    pub sessions_root: String,
    /// Default log level when `RUST_LOG` is not set.
    pub log_level: String,

    pub sqlite: SqliteConfig,
    pub search: SearchDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: "~/.seshdex/seshdex.db".to_string(),
            sessions_root: "~/.claude/projects".to_string(),
            log_level: "info".to_string(),
            sqlite: SqliteConfig::default(),
            search: SearchDefaults::default(),
        }
    }
}

impl Config {
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.db)
    }

    pub fn resolved_sessions_root(&self) -> PathBuf {
        expand_tilde(&self.sessions_root)
    }

    pub fn resolved_log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub cache_size_mb: u32,
    pub mmap_size_mb: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            cache_size_mb: 64,
            mmap_size_mb: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    pub default_limit: u32,
    pub list_limit: u32,
    pub snippet_tokens: u32,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            default_limit: 10,
            list_limit: 20,
            snippet_tokens: 32,
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Returns the default config file path: `~/.seshdex/seshdex.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".seshdex")
        .join("seshdex.toml")
}

/// Load configuration from a TOML file.
///
/// - If `path` is `Some`, reads that file (errors if missing or invalid).
/// - If `path` is `None`, tries the default path; returns defaults if the file doesn't exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path(),
    };

    if !config_path.exists() {
        if path.is_some() {
            anyhow::bail!("config file not found: {}", config_path.display());
        }
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file: {}", config_path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", config_path.display()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sqlite.cache_size_mb, 64);
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.search.list_limit, 20);
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/foo/bar");
        assert!(expanded.to_string_lossy().ends_with("foo/bar"));
        assert!(!expanded.to_string_lossy().starts_with("~"));

        let plain = expand_tilde("/absolute/path");
        assert_eq!(plain, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_load_missing_default_returns_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.search.default_limit, 10);
    }

    #[test]
    fn test_load_explicit_missing_errors() {
        let result = load_config(Some(Path::new("/nonexistent/seshdex.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            log_level = "debug"

            [sqlite]
            cache_size_mb = 128
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.sqlite.cache_size_mb, 128);
        // Unset fields get defaults
        assert_eq!(config.search.default_limit, 10);
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().ends_with(".seshdex/seshdex.toml"));
    }
}
