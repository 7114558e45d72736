//! Local backup retention

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::artifact::BACKUP_FILE_PATTERN;
use crate::error::{Error, Result};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// How long local backup archives are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub keep_local_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { keep_local_days: 7 }
    }
}

impl RetentionPolicy {
    pub fn new(keep_local_days: u32) -> Self {
        Self { keep_local_days }
    }

    /// Files last modified strictly before this instant are eligible for deletion
    pub fn cutoff(&self, now: SystemTime) -> SystemTime {
        let age = Duration::from_secs(u64::from(self.keep_local_days) * SECS_PER_DAY);
        now.checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH)
    }

    /// Delete backup archives in `dir` older than the retention window.
    ///
    /// Only regular files whose name matches `backup_*.json.gz` are
    /// considered. Returns the deleted paths, sorted. A directory that does
    /// not exist holds nothing to sweep.
    pub fn sweep(&self, dir: &Path, now: SystemTime) -> Result<Vec<PathBuf>> {
        let pattern = glob::Pattern::new(BACKUP_FILE_PATTERN)
            .map_err(|e| Error::General(format!("invalid backup pattern: {e}")))?;
        let cutoff = self.cutoff(now);

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = %dir.display(), "Backup directory absent, nothing to sweep");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let mut deleted = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !pattern.matches(name) {
                continue;
            }

            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }

            if meta.modified()? < cutoff {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::info!(path = %path.display(), "Removed expired local backup");
                deleted.push(path);
            }
        }

        deleted.sort();
        Ok(deleted)
    }
}
