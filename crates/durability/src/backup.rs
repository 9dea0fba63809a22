//! Timestamped backups with retention cleanup
//!
//! Backups live in a slot-scoped `backups/` directory next to the save
//! file, named `save_backup_<timestamp>.json`. The timestamp embeds
//! milliseconds and is bumped forward on collision, so filenames sort in
//! creation order. Backup records are derived purely by listing the
//! directory; nothing about them is persisted separately.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::integrity;
use chronicle_core::{Result, SaveError, BACKUPS_DIR_NAME, SAVE_FILE_NAME};

/// Timestamp layout embedded in backup filenames
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

const BACKUP_PREFIX: &str = "save_backup_";
const BACKUP_SUFFIX: &str = ".json";

/// Default number of backups retained per slot
pub const DEFAULT_RETAIN: usize = 4;

/// A backup file derived from a directory listing
#[derive(Debug, Clone)]
pub struct BackupRecord {
    /// Full path to the backup file
    pub path: PathBuf,
    /// Creation time embedded in the filename (mtime fallback)
    pub created: DateTime<Utc>,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Backup creation, restore and retention for slot directories
#[derive(Debug, Clone)]
pub struct BackupManager {
    retain: usize,
}

impl BackupManager {
    /// Create a manager retaining `retain` backups per slot
    pub fn new(retain: usize) -> Self {
        BackupManager { retain }
    }

    /// Copy the slot's current save file into its backup directory
    ///
    /// Returns `Ok(None)` when no save file exists: nothing to back up is
    /// not an error. Retention cleanup runs immediately after creation.
    pub fn create_backup(&self, slot_dir: &Path) -> Result<Option<BackupRecord>> {
        let save_path = slot_dir.join(SAVE_FILE_NAME);
        if !save_path.exists() {
            debug!(slot_dir = %slot_dir.display(), "No save file, nothing to back up");
            return Ok(None);
        }

        let backups_dir = slot_dir.join(BACKUPS_DIR_NAME);
        std::fs::create_dir_all(&backups_dir)?;

        // Bump the timestamp forward until the name is free, so two
        // backups in the same millisecond still sort correctly.
        let mut stamp = Utc::now();
        let backup_path = loop {
            let candidate = backups_dir.join(format!(
                "{}{}{}",
                BACKUP_PREFIX,
                stamp.format(BACKUP_TIMESTAMP_FORMAT),
                BACKUP_SUFFIX
            ));
            if !candidate.exists() {
                break candidate;
            }
            stamp += ChronoDuration::milliseconds(1);
        };

        std::fs::copy(&save_path, &backup_path)?;
        let size_bytes = std::fs::metadata(&backup_path)?.len();

        info!(
            path = %backup_path.display(),
            size_bytes,
            "Backup created"
        );

        self.cleanup_old(slot_dir)?;

        Ok(Some(BackupRecord {
            path: backup_path,
            created: stamp,
            size_bytes,
        }))
    }

    /// List a slot's backups, newest first
    pub fn list_backups(&self, slot_dir: &Path) -> Result<Vec<BackupRecord>> {
        let backups_dir = slot_dir.join(BACKUPS_DIR_NAME);
        if !backups_dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&backups_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(BACKUP_PREFIX) || !name.ends_with(BACKUP_SUFFIX) {
                continue;
            }

            let meta = entry.metadata()?;
            let created = parse_backup_timestamp(name)
                .or_else(|| meta.modified().ok().map(DateTime::<Utc>::from));
            let Some(created) = created else { continue };

            records.push(BackupRecord {
                path,
                created,
                size_bytes: meta.len(),
            });
        }

        records.sort_by(|a, b| b.created.cmp(&a.created).then(b.path.cmp(&a.path)));
        Ok(records)
    }

    /// Overwrite the slot's save file with its most recent backup
    ///
    /// Returns the restored backup's creation time, or `None` when the
    /// slot has no backups.
    pub fn restore_latest(&self, slot_dir: &Path) -> Result<Option<DateTime<Utc>>> {
        let backups = self.list_backups(slot_dir)?;
        let Some(latest) = backups.first() else {
            return Ok(None);
        };
        self.restore_specific(slot_dir, &latest.path)?;
        Ok(Some(latest.created))
    }

    /// Overwrite the slot's save file with an explicit backup file
    pub fn restore_specific(&self, slot_dir: &Path, backup_path: &Path) -> Result<()> {
        if !backup_path.exists() {
            return Err(SaveError::BackupNotFound(backup_path.to_path_buf()));
        }
        let bytes = std::fs::read(backup_path)?;
        integrity::write_atomic(&slot_dir.join(SAVE_FILE_NAME), &bytes)?;
        info!(
            backup = %backup_path.display(),
            slot_dir = %slot_dir.display(),
            "Backup restored over save file"
        );
        Ok(())
    }

    /// Delete all but the `retain` most recent backups
    ///
    /// A file that cannot be deleted (e.g. held open) is logged and
    /// skipped; the rest of the batch continues. Returns the number of
    /// files actually deleted.
    pub fn cleanup_old(&self, slot_dir: &Path) -> Result<usize> {
        let backups = self.list_backups(slot_dir)?;
        let mut deleted = 0;
        for record in backups.iter().skip(self.retain) {
            match std::fs::remove_file(&record.path) {
                Ok(()) => {
                    debug!(path = %record.path.display(), "Deleted expired backup");
                    deleted += 1;
                }
                Err(e) => {
                    warn!(
                        path = %record.path.display(),
                        error = %e,
                        "Failed to delete expired backup, skipping"
                    );
                }
            }
        }
        Ok(deleted)
    }
}

impl Default for BackupManager {
    fn default() -> Self {
        Self::new(DEFAULT_RETAIN)
    }
}

fn parse_backup_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
    let stamp = file_name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(BACKUP_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
