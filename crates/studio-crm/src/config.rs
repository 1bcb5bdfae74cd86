//! Configuration for the studio CRM server

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::constants;

// =============================================================================
// File-based Configuration (config.toml)
// =============================================================================

/// Configuration loaded from config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub storage: StorageSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Socket address the API listens on
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: constants::DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(constants::DEFAULT_DATA_DIR).join(constants::DATABASE_FILENAME),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Lifetime of a login session
    pub session_ttl_hours: i64,
    /// Allow sign-up after the first user exists
    pub allow_registration: bool,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            session_ttl_hours: constants::DEFAULT_SESSION_TTL_HOURS,
            allow_registration: false,
        }
    }
}

/// Where uploaded documents live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    B2,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    /// Directory for the local backend
    pub local_dir: PathBuf,
    /// URL prefix the local backend is served under
    pub public_path: String,
    pub max_upload_bytes: usize,
    pub b2: Option<B2Section>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_dir: PathBuf::from(constants::DEFAULT_DATA_DIR)
                .join(constants::DOCUMENTS_DIRNAME),
            public_path: constants::FILES_ROUTE.to_string(),
            max_upload_bytes: constants::DEFAULT_MAX_UPLOAD_BYTES,
            b2: None,
        }
    }
}

/// Backblaze B2 credentials
#[derive(Debug, Clone, Deserialize)]
pub struct B2Section {
    pub key_id: String,
    pub application_key: String,
    pub bucket_id: String,
    pub bucket_name: String,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).with_context(|| {
            "Failed to parse config.toml. Check for:\n\
             - Invalid TOML syntax (missing quotes, brackets, etc.)\n\
             - Incorrect data types (strings vs numbers)\n\
             - An unknown storage backend (expected \"local\" or \"b2\")\n\n\
             See config.toml.example for the expected format."
        })
    }

    /// Load the file if present, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Command-line values that take precedence over the file
#[derive(Debug, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub database: Option<PathBuf>,
}

/// Main configuration struct with validated values
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub database_path: PathBuf,
    pub session_ttl: chrono::Duration,
    pub allow_registration: bool,
    pub max_upload_bytes: usize,
    pub storage: StorageConfig,
}

/// Validated storage settings
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { dir: PathBuf, public_path: String },
    B2(B2Section),
}

impl Config {
    /// Create config from file config and command-line overrides
    pub fn from_file(file_config: &FileConfig, overrides: Overrides) -> Result<Self> {
        let ttl_hours = file_config.auth.session_ttl_hours;
        if !(1..=constants::MAX_SESSION_TTL_HOURS).contains(&ttl_hours) {
            anyhow::bail!(
                "auth.session_ttl_hours must be between 1 and {}, got {}",
                constants::MAX_SESSION_TTL_HOURS,
                ttl_hours
            );
        }

        let storage = match file_config.storage.backend {
            StorageBackend::Local => {
                let public_path = file_config.storage.public_path.trim_end_matches('/');
                if !public_path.starts_with('/') {
                    anyhow::bail!("storage.public_path must be an absolute path like \"/files\"");
                }
                StorageConfig::Local {
                    dir: file_config.storage.local_dir.clone(),
                    public_path: public_path.to_string(),
                }
            }
            StorageBackend::B2 => {
                let b2 = file_config
                    .storage
                    .b2
                    .clone()
                    .context("storage.backend = \"b2\" requires a [storage.b2] section")?;
                StorageConfig::B2(b2)
            }
        };

        Ok(Self {
            bind: overrides.bind.unwrap_or_else(|| file_config.server.bind.clone()),
            database_path: overrides
                .database
                .unwrap_or_else(|| file_config.database.path.clone()),
            session_ttl: chrono::Duration::hours(ttl_hours),
            allow_registration: file_config.auth.allow_registration,
            max_upload_bytes: file_config.storage.max_upload_bytes,
            storage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::from_file(&FileConfig::default(), Overrides::default()).unwrap();

        assert_eq!(config.bind, constants::DEFAULT_BIND);
        assert_eq!(config.session_ttl, chrono::Duration::hours(168));
        assert!(!config.allow_registration);
        assert!(matches!(config.storage, StorageConfig::Local { .. }));
    }

    #[test]
    fn test_parse_full_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [server]
            bind = "127.0.0.1:8080"

            [database]
            path = "/var/lib/crm/crm.sqlite"

            [auth]
            session_ttl_hours = 12
            allow_registration = true

            [storage]
            backend = "b2"
            max_upload_bytes = 1024

            [storage.b2]
            key_id = "key"
            application_key = "secret"
            bucket_id = "bucket-id"
            bucket_name = "studio-docs"
            "#,
        )
        .unwrap();

        let config = Config::from_file(&file, Overrides::default()).unwrap();
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.database_path, PathBuf::from("/var/lib/crm/crm.sqlite"));
        assert_eq!(config.session_ttl, chrono::Duration::hours(12));
        assert!(config.allow_registration);
        assert_eq!(config.max_upload_bytes, 1024);
        match config.storage {
            StorageConfig::B2(b2) => assert_eq!(b2.bucket_name, "studio-docs"),
            other => panic!("expected b2 storage, got {other:?}"),
        }
    }

    #[test]
    fn test_b2_requires_credentials() {
        let file: FileConfig = toml::from_str("[storage]\nbackend = \"b2\"\n").unwrap();
        assert!(Config::from_file(&file, Overrides::default()).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let overrides = Overrides {
            bind: Some("0.0.0.0:9999".to_string()),
            database: Some(PathBuf::from("other.sqlite")),
        };
        let config = Config::from_file(&FileConfig::default(), overrides).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9999");
        assert_eq!(config.database_path, PathBuf::from("other.sqlite"));
    }

    #[test]
    fn test_session_ttl_bounds() {
        for hours in [0, -5, constants::MAX_SESSION_TTL_HOURS + 1, 2_000_000_000_000] {
            let file: FileConfig =
                toml::from_str(&format!("[auth]\nsession_ttl_hours = {hours}\n")).unwrap();
            let err = Config::from_file(&file, Overrides::default()).unwrap_err();
            assert!(err.to_string().contains("session_ttl_hours"));
        }

        let file: FileConfig = toml::from_str(&format!(
            "[auth]\nsession_ttl_hours = {}\n",
            constants::MAX_SESSION_TTL_HOURS
        ))
        .unwrap();
        let config = Config::from_file(&file, Overrides::default()).unwrap();
        assert_eq!(config.session_ttl, chrono::Duration::days(365));
    }

    #[test]
    fn test_public_path_must_be_absolute() {
        let file: FileConfig = toml::from_str("[storage]\npublic_path = \"files\"\n").unwrap();
        assert!(Config::from_file(&file, Overrides::default()).is_err());

        let file: FileConfig = toml::from_str("[storage]\npublic_path = \"/\"\n").unwrap();
        assert!(Config::from_file(&file, Overrides::default()).is_err());
    }

    #[test]
    fn test_public_path_trailing_slash_trimmed() {
        let file: FileConfig = toml::from_str("[storage]\npublic_path = \"/docs/\"\n").unwrap();
        let config = Config::from_file(&file, Overrides::default()).unwrap();
        match config.storage {
            StorageConfig::Local { public_path, .. } => assert_eq!(public_path, "/docs"),
            other => panic!("expected local storage, got {other:?}"),
        }
    }
}
