//! Durability layer for Chronicle
//!
//! This crate handles everything that touches disk:
//!
//! - Integrity: SHA-256 checksums, atomic writes (temp file + rename),
//!   shared-lock reads and bounded lock waiting
//! - Codec: optional zstd compression with magic-prefix auto-detection
//! - Backups: timestamped backup creation, retention cleanup, restore
//! - Versioning: format version detection, sequential migration chain with
//!   pre-migration backup and rollback

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backup;
pub mod codec;
pub mod integrity;
pub mod version;

pub use backup::{BackupManager, BackupRecord};
pub use codec::{compress, decompress_auto, is_compressed, CodecError, ZSTD_MAGIC};
pub use integrity::{checksum, read_locked, validate, wait_for_available, write_atomic};
pub use version::{
    DetectedVersion, MigrationOutcome, VersionManager, MIN_SUPPORTED_VERSION,
};
