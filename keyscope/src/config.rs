//! Command-line arguments and TOML configuration.

use std::path::{Path, PathBuf};

use clap::Parser;
use common::{RedbStorageConfig, StorageConfig};
use serde::{Deserialize, Serialize};

use crate::model::{DEFAULT_PREVIEW_CHARS, MatchMode};

/// CLI arguments for the keyscope server.
#[derive(Parser, Debug, Default)]
#[command(about = "Line-delimited JSON front end for an embedded key-value store")]
pub struct CliArgs {
    /// Path to config file (TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Open the store in this directory at start-up.
    #[arg(long)]
    pub open: Option<PathBuf>,

    /// Keep data in memory instead of on disk.
    #[arg(long)]
    pub in_memory: bool,
}

impl CliArgs {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load configuration from file or use defaults, then apply CLI overrides.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if self.in_memory {
            config.store.backend = Backend::InMemory;
        }
        Ok(config)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub query: QueryConfig,
    pub backup: BackupConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Reads a TOML configuration file. Missing sections and fields take
    /// their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }
}

/// Storage backend used when a directory is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Redb,
    InMemory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Database file created inside the opened directory.
    pub file_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Redb,
            file_name: "keyscope.redb".to_string(),
        }
    }
}

impl StoreConfig {
    /// Storage configuration for a store kept in directory `dir`.
    pub fn storage_config(&self, dir: &Path) -> StorageConfig {
        match self.backend {
            Backend::InMemory => StorageConfig::InMemory,
            Backend::Redb => StorageConfig::Redb(RedbStorageConfig {
                path: dir.join(&self.file_name).display().to_string(),
            }),
        }
    }
}

/// Defaults applied to `list_keys` requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size used when a request gives no limit.
    pub page_size: usize,
    pub preview_chars: usize,
    /// Match mode used when a request gives none.
    pub default_mode: MatchMode,
    pub case_sensitive: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            default_mode: MatchMode::Prefix,
            case_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Back up a key's value before `put_commit` or `delete_key` changes it.
    pub auto_backup_on_write: bool,
    pub path: PathBuf,
    /// Backups kept per key, newest first. 0 keeps all of them.
    pub retention: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            auto_backup_on_write: false,
            path: PathBuf::from("./backups"),
            retention: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Responses buffered ahead of the output writer before request tasks
    /// wait.
    pub response_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            response_queue_depth: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn should_default_every_missing_field() {
        // when
        let config: Config = toml::from_str("").unwrap();

        // then
        assert_eq!(config, Config::default());
        assert_eq!(config.query.page_size, 200);
        assert_eq!(config.backup.retention, 3);
        assert_eq!(config.store.backend, Backend::Redb);
    }

    #[test]
    fn should_parse_partial_sections() {
        // given
        let toml = r#"
            [store]
            backend = "in_memory"

            [query]
            default_mode = "substring"
            case_sensitive = false

            [backup]
            auto_backup_on_write = true
            path = "/tmp/kb"
        "#;

        // when
        let config: Config = toml::from_str(toml).unwrap();

        // then
        assert_eq!(config.store.backend, Backend::InMemory);
        assert_eq!(config.store.file_name, "keyscope.redb");
        assert_eq!(config.query.default_mode, MatchMode::Substring);
        assert!(!config.query.case_sensitive);
        assert_eq!(config.query.page_size, 200);
        assert!(config.backup.auto_backup_on_write);
        assert_eq!(config.backup.path, PathBuf::from("/tmp/kb"));
        assert_eq!(config.server.response_queue_depth, 1024);
    }

    #[test]
    fn should_load_file_and_apply_cli_overrides() {
        // given
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[query]\npage_size = 50").unwrap();
        let args = CliArgs {
            config: Some(file.path().to_path_buf()),
            open: None,
            in_memory: true,
        };

        // when
        let config = args.load_config().unwrap();

        // then
        assert_eq!(config.query.page_size, 50);
        assert_eq!(config.store.backend, Backend::InMemory);
    }

    #[test]
    fn should_fail_on_unreadable_config() {
        // given
        let args = CliArgs {
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            ..CliArgs::default()
        };

        // then
        assert!(args.load_config().is_err());
    }

    #[test]
    fn should_place_redb_file_inside_directory() {
        // given
        let config = StoreConfig::default();

        // when
        let storage = config.storage_config(Path::new("/data"));

        // then
        assert_eq!(
            storage,
            StorageConfig::Redb(RedbStorageConfig {
                path: "/data/keyscope.redb".to_string()
            })
        );
    }

    #[test]
    fn should_parse_cli_flags() {
        // when
        let args = CliArgs::try_parse_from(["keyscope", "--open", "/data", "--in-memory"]).unwrap();

        // then
        assert_eq!(args.open, Some(PathBuf::from("/data")));
        assert!(args.in_memory);
        assert!(args.config.is_none());
    }
}
