//! Error types for the Chronicle save system
//!
//! This module defines all fatal error categories used throughout the
//! pipeline. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Non-fatal categories (partial capture/restore failures, cleanup
//! failures) are deliberately *not* errors: they are accumulated into
//! operation outcomes and reported alongside success, so one broken
//! subsystem never prevents saving or loading the rest of the game state.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Chronicle operations
pub type Result<T> = std::result::Result<T, SaveError>;

/// Fatal error categories for the save/load pipeline
#[derive(Debug, Error)]
pub enum SaveError {
    /// Target storage cannot accept a write (disk space, permissions).
    /// No write is attempted.
    #[error("storage unavailable for slot {slot_id}: {reason}")]
    StorageUnavailable {
        /// Slot being saved
        slot_id: u32,
        /// Human-readable cause
        reason: String,
    },

    /// Document could not be serialized. No write is attempted.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// The atomic write itself failed. The previous save file is intact.
    #[error("write failed for {path}: {source}")]
    WriteFailed {
        /// Target path of the failed write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// No save file exists for the requested slot
    #[error("no save found for slot {0}")]
    SaveNotFound(u32),

    /// Checksum mismatch or missing checksum. Treated as corruption;
    /// no unit is restored.
    #[error("integrity violation for slot {slot_id}: {detail}")]
    IntegrityViolation {
        /// Slot being loaded
        slot_id: u32,
        /// What failed (missing checksum, mismatch, ...)
        detail: String,
    },

    /// Document format version outside the supported window
    #[error("unsupported format version {found} (supported {min}..={max})")]
    UnsupportedVersion {
        /// Version found in the document (0 when undetectable)
        found: u32,
        /// Minimum supported version
        min: u32,
        /// Current (maximum) version
        max: u32,
    },

    /// A migration step failed. The original file was restored from the
    /// pre-migration backup and is byte-identical to before the attempt.
    #[error("migration from version {from} failed at step {step}: {reason}")]
    MigrationFailed {
        /// Version of the document before migration started
        from: u32,
        /// Source version of the step that failed
        step: u32,
        /// Why the step failed
        reason: String,
    },

    /// An explicitly requested backup file does not exist
    #[error("backup not found: {0}")]
    BackupNotFound(PathBuf),

    /// Slot identifiers start at 1; the auto-save slot is reserved
    #[error("invalid slot id {0}: slot ids start at 1")]
    InvalidSlot(u32),

    /// Slot directory already exists
    #[error("slot {0} already exists")]
    SlotExists(u32),

    /// A unit key was registered twice
    #[error("duplicate unit key: {0}")]
    DuplicateKey(String),

    /// I/O error outside the atomic-write path
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for SaveError {
    fn from(e: serde_json::Error) -> Self {
        SaveError::SerializationFailed(e.to_string())
    }
}

/// Error raised by a persistable unit's `capture` or `restore`
///
/// Units must fail with this typed error on malformed input, never panic.
/// Unit errors are non-fatal at the pipeline level: the failing unit is
/// recorded in the outcome's failed-units list and the operation continues.
#[derive(Debug, Error)]
pub enum UnitError {
    /// The block handed to `restore` does not match the unit's schema
    #[error("malformed block: {0}")]
    MalformedBlock(String),

    /// The unit could not capture its current state
    #[error("capture failed: {0}")]
    CaptureFailed(String),

    /// The unit could not apply an otherwise well-formed block
    #[error("restore failed: {0}")]
    RestoreFailed(String),
}
