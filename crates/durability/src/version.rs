//! Format version detection and migration
//!
//! Migrations form a sequential chain: each registered step upgrades a
//! document from one version to the next, the document is retagged and
//! persisted atomically after every step, and a version boundary with no
//! registered step fails closed. Before the first step runs, the original
//! file is copied to a version-tagged backup; any failure restores it so
//! the file is left byte-identical to before the attempt.
//!
//! Version history:
//! - v1: initial format, no `producer_version` field
//! - v2: producer version recorded
//! - v3: calendar and weather subsystems merged into one unit
//!   (`calendar` renamed to `calendar_weather`), `discovery` renamed
//!   to `discoveries`

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::codec;
use crate::integrity;
use chronicle_core::{
    Result, SaveDocument, SaveError, CURRENT_FORMAT_VERSION, OLDEST_KNOWN_VERSION,
};

/// Oldest format version that can still be migrated
pub const MIN_SUPPORTED_VERSION: u32 = OLDEST_KNOWN_VERSION;

/// A pure transform upgrading a document by exactly one version
pub type MigrationFn =
    Box<dyn Fn(SaveDocument) -> std::result::Result<SaveDocument, String> + Send + Sync>;

/// Result of probing a file for its format version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedVersion {
    /// A structured document with this version (explicit or assumed)
    Version(u32),
    /// Content is not parseable as the expected structured format
    Undetectable,
}

/// Summary of a completed migration
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// Version found before migration
    pub from: u32,
    /// Version after migration (always the current version)
    pub to: u32,
    /// Number of steps applied (0 for a no-op)
    pub steps_applied: u32,
    /// Pre-migration backup, when one was taken
    pub backup_path: Option<PathBuf>,
}

/// Ordered migration table and version compatibility checks
pub struct VersionManager {
    steps: BTreeMap<u32, MigrationFn>,
}

impl VersionManager {
    /// Manager with the built-in migration chain registered
    pub fn new() -> Self {
        let mut manager = VersionManager {
            steps: BTreeMap::new(),
        };
        manager.register_step(1, Box::new(migrate_v1_to_v2));
        manager.register_step(2, Box::new(migrate_v2_to_v3));
        manager
    }

    /// Manager with no steps registered (for tests and tooling)
    pub fn empty() -> Self {
        VersionManager {
            steps: BTreeMap::new(),
        }
    }

    /// Register or replace the step upgrading `from` to `from + 1`
    pub fn register_step(&mut self, from: u32, step: MigrationFn) {
        self.steps.insert(from, step);
    }

    /// Read just enough of the content to determine its format version
    ///
    /// Transparently decompresses. An absent `format_version` field means
    /// the artifact predates versioning and is assumed to be the oldest
    /// known version. Unparseable content is undetectable.
    pub fn detect_version(&self, bytes: &[u8]) -> DetectedVersion {
        let raw = match codec::decompress_auto(bytes) {
            Ok(raw) => raw,
            Err(_) => return DetectedVersion::Undetectable,
        };
        let value: Value = match serde_json::from_slice(&raw) {
            Ok(v) => v,
            Err(_) => return DetectedVersion::Undetectable,
        };
        let Some(obj) = value.as_object() else {
            return DetectedVersion::Undetectable;
        };
        match obj.get("format_version") {
            Some(v) => match v.as_u64() {
                Some(n) => DetectedVersion::Version(n as u32),
                None => DetectedVersion::Undetectable,
            },
            None => DetectedVersion::Version(OLDEST_KNOWN_VERSION),
        }
    }

    /// Whether a detected version falls inside the supported window
    ///
    /// Undetectable content is never compatible.
    pub fn is_compatible(&self, detected: DetectedVersion) -> bool {
        match detected {
            DetectedVersion::Version(v) => {
                (MIN_SUPPORTED_VERSION..=CURRENT_FORMAT_VERSION).contains(&v)
            }
            DetectedVersion::Undetectable => false,
        }
    }

    /// Migrate the file at `path` up to the current format version
    ///
    /// A document already at the current version is a no-op success. The
    /// in-place working file is only ever replaced atomically after a step
    /// succeeds; on failure the pre-migration backup is restored and the
    /// file is exactly as it was found.
    pub fn migrate(&self, path: &Path) -> Result<MigrationOutcome> {
        let original_bytes = std::fs::read(path)?;
        let raw = codec::decompress_auto(&original_bytes)?;

        let from = match self.detect_version(&original_bytes) {
            DetectedVersion::Version(v) => v,
            DetectedVersion::Undetectable => {
                return Err(SaveError::UnsupportedVersion {
                    found: 0,
                    min: MIN_SUPPORTED_VERSION,
                    max: CURRENT_FORMAT_VERSION,
                })
            }
        };

        if !self.is_compatible(DetectedVersion::Version(from)) {
            return Err(SaveError::UnsupportedVersion {
                found: from,
                min: MIN_SUPPORTED_VERSION,
                max: CURRENT_FORMAT_VERSION,
            });
        }

        if from == CURRENT_FORMAT_VERSION {
            return Ok(MigrationOutcome {
                from,
                to: from,
                steps_applied: 0,
                backup_path: None,
            });
        }

        // Version-tagged pre-migration backup, used for rollback
        let backup_path = tagged_backup_path(path, from);
        std::fs::write(&backup_path, &original_bytes)?;

        info!(
            path = %path.display(),
            from,
            to = CURRENT_FORMAT_VERSION,
            backup = %backup_path.display(),
            "Starting migration"
        );

        match self.run_chain(path, &raw) {
            Ok(steps_applied) => Ok(MigrationOutcome {
                from,
                to: CURRENT_FORMAT_VERSION,
                steps_applied,
                backup_path: Some(backup_path),
            }),
            Err((step, reason)) => {
                warn!(
                    path = %path.display(),
                    step,
                    reason = %reason,
                    "Migration step failed, restoring pre-migration backup"
                );
                // Rollback goes through the same atomic path as the
                // steps: the working file is never left torn
                if let Err(e) = integrity::write_atomic(path, &original_bytes) {
                    warn!(error = %e, "Failed to restore pre-migration backup");
                }
                Err(SaveError::MigrationFailed { from, step, reason })
            }
        }
    }

    /// Apply steps in strictly ascending order, persisting after each.
    /// Returns the number of steps applied, or the failing step's source
    /// version and reason.
    fn run_chain(&self, path: &Path, raw: &[u8]) -> std::result::Result<u32, (u32, String)> {
        let mut doc = SaveDocument::from_slice(raw)
            .map_err(|e| (0, format!("document unparseable: {}", e)))?;
        let mut steps_applied = 0;

        while doc.format_version < CURRENT_FORMAT_VERSION {
            let v = doc.format_version;
            let step = self
                .steps
                .get(&v)
                .ok_or_else(|| (v, "no migration step registered".to_string()))?;

            doc = step(doc).map_err(|reason| (v, reason))?;
            // Retag regardless of what the step itself did
            doc.format_version = v + 1;

            let canonical = doc
                .canonical_bytes()
                .map_err(|e| (v, format!("canonical serialization: {}", e)))?;
            doc.checksum = Some(integrity::checksum(&canonical));

            let bytes = doc
                .to_writable_bytes()
                .map_err(|e| (v, format!("serialization: {}", e)))?;
            integrity::write_atomic(path, &bytes).map_err(|e| (v, e.to_string()))?;

            steps_applied += 1;
            info!(from = v, to = v + 1, "Migration step applied");
        }

        Ok(steps_applied)
    }
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn tagged_backup_path(path: &Path, from: u32) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".v{}.bak", from));
    path.with_file_name(name)
}

/// v1 documents did not record the producer
fn migrate_v1_to_v2(mut doc: SaveDocument) -> std::result::Result<SaveDocument, String> {
    if doc.producer_version.is_empty() {
        doc.producer_version = "unknown".to_string();
    }
    Ok(doc)
}

/// v3 merged the calendar and weather subsystems and pluralized the
/// discovery log key; blocks are carried over untouched under new keys
fn migrate_v2_to_v3(mut doc: SaveDocument) -> std::result::Result<SaveDocument, String> {
    let renames = [("calendar", "calendar_weather"), ("discovery", "discoveries")];
    let mut units = chronicle_core::UnitBlocks::new();
    for (key, block) in std::mem::take(&mut doc.units) {
        let new_key = renames
            .iter()
            .find(|(old, _)| *old == key)
            .map(|(_, new)| (*new).to_string())
            .unwrap_or(key);
        units.insert(new_key, block);
    }
    doc.units = units;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_versioned_doc(path: &Path, version: u32) -> SaveDocument {
        let mut units = chronicle_core::UnitBlocks::new();
        units.insert("character".to_string(), json!({"hp": 50}));
        units.insert("calendar".to_string(), json!({"day": 12}));
        let mut doc = SaveDocument::new(units);
        doc.format_version = version;
        if version < 2 {
            doc.producer_version = String::new();
        }
        let canonical = doc.canonical_bytes().unwrap();
        doc.checksum = Some(integrity::checksum(&canonical));
        std::fs::write(path, doc.to_writable_bytes().unwrap()).unwrap();
        doc
    }

    #[test]
    fn test_detect_explicit_version() {
        let manager = VersionManager::new();
        let bytes = br#"{"format_version":2,"units":{}}"#;
        assert_eq!(manager.detect_version(bytes), DetectedVersion::Version(2));
    }

    #[test]
    fn test_detect_missing_version_assumes_oldest() {
        let manager = VersionManager::new();
        let bytes = br#"{"units":{}}"#;
        assert_eq!(
            manager.detect_version(bytes),
            DetectedVersion::Version(OLDEST_KNOWN_VERSION)
        );
    }

    #[test]
    fn test_detect_unparseable_content() {
        let manager = VersionManager::new();
        assert_eq!(
            manager.detect_version(b"not json at all"),
            DetectedVersion::Undetectable
        );
        assert_eq!(
            manager.detect_version(br#"[1,2,3]"#),
            DetectedVersion::Undetectable
        );
    }

    #[test]
    fn test_detect_through_compression() {
        let manager = VersionManager::new();
        let compressed = codec::compress(br#"{"format_version":3,"units":{}}"#, 3).unwrap();
        assert_eq!(
            manager.detect_version(&compressed),
            DetectedVersion::Version(3)
        );
    }

    #[test]
    fn test_compat_window() {
        let manager = VersionManager::new();
        assert!(!manager.is_compatible(DetectedVersion::Version(MIN_SUPPORTED_VERSION - 1)));
        assert!(manager.is_compatible(DetectedVersion::Version(MIN_SUPPORTED_VERSION)));
        assert!(manager.is_compatible(DetectedVersion::Version(CURRENT_FORMAT_VERSION)));
        assert!(!manager.is_compatible(DetectedVersion::Version(CURRENT_FORMAT_VERSION + 1)));
        assert!(!manager.is_compatible(DetectedVersion::Undetectable));
    }

    #[test]
    fn test_migrate_current_version_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        write_versioned_doc(&path, CURRENT_FORMAT_VERSION);
        let before = std::fs::read(&path).unwrap();

        let outcome = VersionManager::new().migrate(&path).unwrap();
        assert_eq!(outcome.steps_applied, 0);
        assert!(outcome.backup_path.is_none());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_migrate_full_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        write_versioned_doc(&path, 1);

        let outcome = VersionManager::new().migrate(&path).unwrap();
        assert_eq!(outcome.from, 1);
        assert_eq!(outcome.to, CURRENT_FORMAT_VERSION);
        assert_eq!(outcome.steps_applied, CURRENT_FORMAT_VERSION - 1);

        let migrated = SaveDocument::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(migrated.format_version, CURRENT_FORMAT_VERSION);
        // v1->v2 filled the producer, v2->v3 renamed the calendar unit
        assert_eq!(migrated.producer_version, "unknown");
        assert!(migrated.units.contains_key("calendar_weather"));
        assert!(!migrated.units.contains_key("calendar"));

        // Migrated document passes checksum validation
        let expected = migrated.checksum.clone().unwrap();
        assert!(integrity::validate(
            &migrated.canonical_bytes().unwrap(),
            &expected
        ));
    }

    #[test]
    fn test_migrate_writes_version_tagged_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        write_versioned_doc(&path, 2);
        let before = std::fs::read(&path).unwrap();

        let outcome = VersionManager::new().migrate(&path).unwrap();
        let backup = outcome.backup_path.unwrap();
        assert!(backup.to_string_lossy().ends_with("save.json.v2.bak"));
        assert_eq!(std::fs::read(&backup).unwrap(), before);
    }

    #[test]
    fn test_missing_step_fails_closed_and_preserves_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        write_versioned_doc(&path, 1);
        let before = std::fs::read(&path).unwrap();

        // Only step 2 registered: the 1 -> 2 boundary has a gap
        let mut manager = VersionManager::empty();
        manager.register_step(2, Box::new(migrate_v2_to_v3));

        let err = manager.migrate(&path).unwrap_err();
        assert!(matches!(
            err,
            SaveError::MigrationFailed { from: 1, step: 1, .. }
        ));
        // Byte-identical to before the attempt
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_failing_step_rolls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        write_versioned_doc(&path, 1);
        let before = std::fs::read(&path).unwrap();

        let mut manager = VersionManager::empty();
        manager.register_step(1, Box::new(migrate_v1_to_v2));
        manager.register_step(2, Box::new(|_| Err("weather table illegible".to_string())));

        let err = manager.migrate(&path).unwrap_err();
        assert!(matches!(
            err,
            SaveError::MigrationFailed { from: 1, step: 2, .. }
        ));
        // Rolled back even though step 1 had already been persisted, and
        // the rollback itself went through the atomic write path
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!dir.path().join("save.json.tmp").exists());
    }

    #[test]
    fn test_migrate_undetectable_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        std::fs::write(&path, b"definitely not a save").unwrap();

        let err = VersionManager::new().migrate(&path).unwrap_err();
        assert!(matches!(err, SaveError::UnsupportedVersion { found: 0, .. }));
    }

    #[test]
    fn test_migrate_future_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        write_versioned_doc(&path, CURRENT_FORMAT_VERSION + 5);

        let err = VersionManager::new().migrate(&path).unwrap_err();
        assert!(matches!(err, SaveError::UnsupportedVersion { .. }));
    }
}
