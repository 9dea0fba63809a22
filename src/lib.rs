//! Chronicle - Durable save/load persistence for open-world simulations
//!
//! Chronicle turns a set of in-game subsystems into versioned, checksummed
//! save files on disk: register each subsystem as a [`Persistable`] unit,
//! then save and load whole slots through the [`SaveManager`].
//!
//! # Quick Start
//!
//! ```ignore
//! use chronicle::{SaveManager, Persistable};
//!
//! // Open (or create) a save root; reads chronicle.toml if present
//! let manager = SaveManager::open("./saves")?;
//!
//! // Register the subsystems that participate in saves
//! manager.register_unit(character_state)?;
//! manager.register_unit(world_state)?;
//!
//! // Save slot 2, then load it back later
//! let outcome = manager.save_slot(2)?;
//! let loaded = manager.load_slot(2)?;
//! ```
//!
//! # Architecture
//!
//! All saves and loads run through the [`SaveManager`], which sequences
//! validation, unit capture, checksumming, atomic writes, backups, and
//! version migration. The durability layer (checksums, backups,
//! migrations) is re-exported for callers that need to inspect or repair
//! save files directly.

// Re-export the public API from chronicle-engine, which itself re-exports
// the core document and unit types
pub use chronicle_engine::*;

// Durability primitives for direct save-file inspection and repair
pub use chronicle_durability::{
    checksum, is_compressed, validate, BackupManager, BackupRecord, DetectedVersion,
    MigrationOutcome, VersionManager, MIN_SUPPORTED_VERSION,
};
