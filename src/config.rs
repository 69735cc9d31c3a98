//! Configuration and XDG path resolution.
//!
//! [`RootaraPaths`] locates the config and data directories following the
//! XDG Base Directory Specification. [`RootaraConfig`] is persisted as TOML at
//! `$XDG_CONFIG_HOME/rootara/config.toml`; every field has a default, and a
//! handful of `ROOTARA_*` environment variables override the file.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Language;

/// Directory name under each XDG base directory.
const APP_DIR: &str = "rootara";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(rootara::config::no_home),
        help("Set the HOME environment variable, or pass --data-dir and --config explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(rootara::config::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(rootara::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(rootara::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(rootara::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {var}: \"{value}\"")]
    #[diagnostic(code(rootara::config::env), help("{hint}"))]
    InvalidEnv {
        var: &'static str,
        value: String,
        hint: String,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// XDG-compliant directories for rootara.
#[derive(Debug, Clone)]
pub struct RootaraPaths {
    /// `$XDG_CONFIG_HOME/rootara/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/rootara/`
    pub data_dir: PathBuf,
}

impl RootaraPaths {
    /// Resolve from the process environment.
    pub fn resolve() -> ConfigResult<Self> {
        Self::resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` for environment variables.
    pub fn resolve_with(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let home = lookup("HOME").map(PathBuf::from).ok_or(ConfigError::NoHome)?;

        let config_dir = lookup("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config"))
            .join(APP_DIR);

        let data_dir = lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".local/share"))
            .join(APP_DIR);

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Paths rooted at an explicit data directory (`--data-dir`).
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    /// Create all directories. Idempotent.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.store_dir(),
            &self.catalog_dir(),
        ] {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Directory holding the user trait database.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    /// Directory scanned for additional catalog files.
    pub fn catalog_dir(&self) -> PathBuf {
        self.data_dir.join("catalog")
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Top-level configuration, persisted as TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootaraConfig {
    /// Language used for names and descriptions in CLI output.
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Genomics backend connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    /// Sent as the `x-api-key` header.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://0.0.0.0:8000".into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// User trait storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Overrides the XDG data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// When false, user traits are kept in memory only.
    #[serde(default = "default_persistent")]
    pub persistent: bool,
}

fn default_persistent() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            persistent: default_persistent(),
        }
    }
}

/// Where the HTTP API takes genotypes from when a report id is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenotypeMode {
    /// Use the genotypes stored on each trait.
    #[default]
    Stored,
    /// Use the bundled demo table.
    Demo,
    /// Ask the genomics backend.
    Backend,
}

/// HTTP API listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub genotypes: GenotypeMode,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            genotypes: GenotypeMode::default(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl RootaraConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load from a TOML file, or fall back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Apply `ROOTARA_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `ROOTARA_*` overrides using `lookup` for environment variables.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(url) = lookup("ROOTARA_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Some(key) = lookup("ROOTARA_BACKEND_API_KEY") {
            self.backend.api_key = key;
        }
        if let Some(dir) = lookup("ROOTARA_DATA_DIR") {
            self.store.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(bind) = lookup("ROOTARA_SERVER_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = lookup("ROOTARA_SERVER_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "ROOTARA_SERVER_PORT",
                value: port.clone(),
                hint: "Use a port number between 1 and 65535.".into(),
            })?;
        }
        Ok(())
    }

    /// Data directory: the configured override, else the XDG one.
    pub fn data_dir(&self, paths: &RootaraPaths) -> PathBuf {
        self.store
            .data_dir
            .clone()
            .unwrap_or_else(|| paths.data_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn xdg_resolution_with_fallbacks() {
        let paths = RootaraPaths::resolve_with(env(&[("HOME", "/home/u")])).unwrap();
        assert_eq!(paths.config_dir, PathBuf::from("/home/u/.config/rootara"));
        assert_eq!(paths.data_dir, PathBuf::from("/home/u/.local/share/rootara"));
        assert_eq!(paths.config_file(), PathBuf::from("/home/u/.config/rootara/config.toml"));

        let paths = RootaraPaths::resolve_with(env(&[
            ("HOME", "/home/u"),
            ("XDG_DATA_HOME", "/data"),
        ]))
        .unwrap();
        assert_eq!(paths.store_dir(), PathBuf::from("/data/rootara/store"));

        assert!(matches!(
            RootaraPaths::resolve_with(env(&[])),
            Err(ConfigError::NoHome)
        ));
    }

    #[test]
    fn defaults() {
        let cfg = RootaraConfig::default();
        assert_eq!(cfg.backend.base_url, "http://0.0.0.0:8000");
        assert!(cfg.backend.api_key.is_empty());
        assert!(cfg.store.persistent);
        assert_eq!(cfg.server.address(), "0.0.0.0:8300");
        assert_eq!(cfg.server.genotypes, GenotypeMode::Stored);
        assert_eq!(cfg.language, Language::En);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: RootaraConfig = toml::from_str(
            r#"
                language = "zh-CN"
                [backend]
                api_key = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.language, Language::ZhCn);
        assert_eq!(cfg.backend.api_key, "secret");
        assert_eq!(cfg.backend.timeout_secs, 30);
        assert_eq!(cfg.server.port, 8300);
    }

    #[test]
    fn config_roundtrip_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut cfg = RootaraConfig::default();
        cfg.server.port = 9000;
        cfg.store.persistent = false;
        cfg.save(&path).unwrap();

        assert_eq!(RootaraConfig::load(&path).unwrap(), cfg);
        assert_eq!(
            RootaraConfig::load_or_default(&tmp.path().join("missing.toml")).unwrap(),
            RootaraConfig::default()
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = RootaraConfig::default();
        cfg.apply_env_with(env(&[
            ("ROOTARA_BACKEND_URL", "https://genomics.example"),
            ("ROOTARA_BACKEND_API_KEY", "k"),
            ("ROOTARA_DATA_DIR", "/srv/rootara"),
            ("ROOTARA_SERVER_PORT", "9100"),
        ]))
        .unwrap();
        assert_eq!(cfg.backend.base_url, "https://genomics.example");
        assert_eq!(cfg.backend.api_key, "k");
        assert_eq!(cfg.server.port, 9100);

        let paths = RootaraPaths::resolve_with(env(&[("HOME", "/home/u")])).unwrap();
        assert_eq!(cfg.data_dir(&paths), PathBuf::from("/srv/rootara"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut cfg = RootaraConfig::default();
        let err = cfg
            .apply_env_with(env(&[("ROOTARA_SERVER_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "ROOTARA_SERVER_PORT", .. }));
    }
}
