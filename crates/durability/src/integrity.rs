//! Checksums, atomic writes, and lock-aware reads
//!
//! ## Atomic write
//!
//! Uses the temp file + rename pattern:
//! 1. Write to a sibling `.tmp` file in the same directory
//! 2. Sync the temp file
//! 3. Rename temp over the target (atomic on POSIX)
//!
//! A crash between steps can orphan a temp file but never leaves the
//! target half-written: readers observe either the old complete content or
//! the new complete content.
//!
//! ## Checksums
//!
//! SHA-256, lowercase hex on write, case-insensitive compare on read.
//! The digest is computed over exactly the canonical bytes that the
//! document layer produces with the checksum field excluded.

use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use chronicle_core::{Result, SaveError};

/// Poll interval for [`wait_for_available`]
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Compute the SHA-256 digest of `bytes`, lowercase hex encoded
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Recompute and compare, case-insensitively
///
/// An empty or absent expected hash is always invalid: documents without a
/// checksum are never trusted.
pub fn validate(bytes: &[u8], expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    checksum(bytes).eq_ignore_ascii_case(expected)
}

/// Write `bytes` to `path` atomically
///
/// Creates intermediate directories as needed. On any failure the temp
/// file is removed and the target is untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = temp_sibling(path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| SaveError::WriteFailed {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    // Stale temp from a previous failed attempt
    if temp_path.exists() {
        warn!(path = %temp_path.display(), "Removing stale temp file");
        let _ = std::fs::remove_file(&temp_path);
    }

    debug!(
        final_path = %path.display(),
        temp_path = %temp_path.display(),
        len = bytes.len(),
        "Starting atomic write"
    );

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    })();

    match result {
        Ok(()) => Ok(()),
        Err(source) => {
            warn!(
                temp_path = %temp_path.display(),
                error = %source,
                "Atomic write failed, cleaning up temp file"
            );
            let _ = std::fs::remove_file(&temp_path);
            Err(SaveError::WriteFailed {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

/// Read the whole file while holding a shared lock
///
/// The lock keeps a concurrent exclusive writer from interleaving with the
/// read; it is released when the file handle drops.
pub fn read_locked(path: &Path) -> Result<Vec<u8>> {
    let mut file = OpenOptions::new().read(true).open(path)?;
    fs2::FileExt::lock_shared(&file)?;
    let mut buf = Vec::new();
    let result = file.read_to_end(&mut buf);
    let _ = fs2::FileExt::unlock(&file);
    result?;
    Ok(buf)
}

/// Poll until the file can be opened and shared-locked, up to `timeout`
///
/// Returns true immediately for non-existent files (nothing to wait for),
/// true once the file becomes readable, false on timeout.
pub fn wait_for_available(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !path.exists() {
            return true;
        }
        if let Ok(file) = OpenOptions::new().read(true).open(path) {
            if fs2::FileExt::try_lock_shared(&file).is_ok() {
                let _ = fs2::FileExt::unlock(&file);
                return true;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(LOCK_POLL_INTERVAL);
    }
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checksum_stable() {
        let a = checksum(b"hello world");
        let b = checksum(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_checksum_sensitive_to_any_byte() {
        assert_ne!(checksum(b"hello world"), checksum(b"hello worlD"));
    }

    #[test]
    fn test_validate_case_insensitive() {
        let hash = checksum(b"data").to_uppercase();
        assert!(validate(b"data", &hash));
    }

    #[test]
    fn test_validate_empty_expected_always_invalid() {
        assert!(!validate(b"data", ""));
        assert!(!validate(b"", ""));
    }

    #[test]
    fn test_validate_mismatch() {
        let mut hash = checksum(b"data");
        // Flip one hex character
        let flipped = if hash.ends_with('0') { "1" } else { "0" };
        hash.replace_range(hash.len() - 1.., flipped);
        assert!(!validate(b"data", &hash));
    }

    #[test]
    fn test_write_atomic_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");

        write_atomic(&path, b"content").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"content");
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn test_write_atomic_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slot_1").join("backups").join("b.json");

        write_atomic(&path, b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");

        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new content").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new content");
    }

    #[test]
    fn test_write_atomic_cleans_stale_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        std::fs::write(temp_sibling(&path), b"stale").unwrap();

        write_atomic(&path, b"fresh").unwrap();
        assert!(!temp_sibling(&path).exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"fresh");
    }

    #[test]
    fn test_orphan_temp_never_corrupts_target() {
        // Simulates a crash between temp write and rename: the temp file
        // exists with new content, but the target still has old content.
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");

        write_atomic(&path, b"old complete content").unwrap();
        std::fs::write(temp_sibling(&path), b"half-writ").unwrap();

        // Target unaffected by the orphan
        assert_eq!(std::fs::read(&path).unwrap(), b"old complete content");

        // The next atomic write recovers
        write_atomic(&path, b"new complete content").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new complete content");
    }

    #[test]
    fn test_read_locked_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        std::fs::write(&path, b"locked read").unwrap();

        assert_eq!(read_locked(&path).unwrap(), b"locked read");
    }

    #[test]
    fn test_read_locked_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = read_locked(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(SaveError::Io(_))));
    }

    #[test]
    fn test_wait_for_available_nonexistent_is_immediate() {
        let dir = TempDir::new().unwrap();
        let start = Instant::now();
        assert!(wait_for_available(
            &dir.path().join("missing.json"),
            Duration::from_secs(5)
        ));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_wait_for_available_readable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        std::fs::write(&path, b"x").unwrap();
        assert!(wait_for_available(&path, Duration::from_millis(200)));
    }
}
