//! Copies of values taken before they are overwritten or deleted.
//!
//! Backups are plain files named `<key>_<YYYYMMDD-HHMMSS.mmm>.bak`, with
//! characters that are unsafe in file names replaced by `_`. Only the newest
//! `retention` backups of each key are kept.

use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::config::BackupConfig;
use crate::error::{Error, Result};
use crate::store::Store;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S%.3f";
const EXTENSION: &str = ".bak";

/// Replaces characters that are invalid in file names on common platforms.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

fn backup_error(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::Backup(format!("failed to {} {}: {}", action, path.display(), err))
}

/// Backs up `key` if `config` enables backups on write.
pub async fn before_write(store: &Store, key: &str, config: &BackupConfig) -> Result<()> {
    if config.auto_backup_on_write {
        backup_value(store, key, config).await?;
    }
    Ok(())
}

/// Writes the current value of `key` to a new backup file and prunes old
/// backups of the same key.
///
/// Returns the backup's path, or `None` if the key has no value.
pub async fn backup_value(store: &Store, key: &str, config: &BackupConfig) -> Result<Option<PathBuf>> {
    let value = match store.get(key).await {
        Ok(value) => value,
        Err(Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    tokio::fs::create_dir_all(&config.path)
        .await
        .map_err(|e| backup_error("create backup directory", &config.path, e))?;

    let stem = sanitize_key(key);
    let timestamp = Utc::now().format(TIMESTAMP_FORMAT);
    let path = config
        .path
        .join(format!("{}_{}{}", stem, timestamp, EXTENSION));
    tokio::fs::write(&path, &value)
        .await
        .map_err(|e| backup_error("write backup", &path, e))?;
    debug!(key, path = %path.display(), size = value.len(), "backed up value");

    if config.retention > 0 {
        prune(&config.path, &stem, config.retention).await?;
    }
    Ok(Some(path))
}

/// Whether `file_name` is a backup of the key sanitized to `stem`.
///
/// The timestamp suffix is checked so that backups of `a` are not confused
/// with backups of `a_b`.
fn is_backup_of(file_name: &str, stem: &str) -> bool {
    file_name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(EXTENSION))
        .is_some_and(|ts| NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).is_ok())
}

/// Deletes all but the newest `retention` backups of `stem` in `dir`.
async fn prune(dir: &Path, stem: &str, retention: usize) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| backup_error("list backup directory", dir, e))?;
    let mut backups = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| backup_error("list backup directory", dir, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_backup_of(&name, stem) {
            backups.push(name);
        }
    }

    // Fixed-width timestamps sort chronologically.
    backups.sort_unstable_by(|a, b| b.cmp(a));
    for name in backups.into_iter().skip(retention) {
        let path = dir.join(&name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "failed to prune backup");
        }
    }
    Ok(())
}
