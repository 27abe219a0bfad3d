//! Entries file: the persisted raw pool list
//!
//! One raw entry per line (bearer token, `email----password`, or
//! `email----password----token`). Blank lines and `#` comments are ignored.
//! All writes use atomic temp-file + rename so a crash mid-write never leaves
//! a truncated list behind, and a tokio Mutex serializes concurrent writers
//! (admin replace and background refresh).

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Split entries file contents into raw entries.
pub fn parse_entry_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// File-backed persistence for the raw pool list.
pub struct EntryFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl EntryFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw entries. A missing file is a cold start with zero entries.
    pub async fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "entries file not found, starting with empty list");
            return Ok(Vec::new());
        }
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Io(format!("reading entries file: {e}")))?;
        let entries = parse_entry_list(&contents);
        info!(path = %self.path.display(), entries = entries.len(), "loaded entries");
        Ok(entries)
    }

    /// Replace the file contents with `entries`, one per line.
    pub async fn save(&self, entries: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut contents = entries.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        write_atomic(&self.path, &contents).await?;
        debug!(path = %self.path.display(), entries = entries.len(), "persisted entries");
        Ok(())
    }
}

/// Write the entries file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Permissions are 0600 since the file holds passwords and tokens.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("entries path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".entries.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, contents.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp entries file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting entries file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp entries file: {e}")))?;

    Ok(())
}
