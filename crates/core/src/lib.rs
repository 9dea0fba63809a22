//! Core types for the Chronicle save system
//!
//! This crate defines the shared vocabulary of the save/load pipeline:
//!
//! - SaveDocument: the root persisted artifact and its canonical encoding
//! - Persistable: the contract every game subsystem implements to take part
//!   in a save
//! - UnitRegistry: the ordered registration table of persistable units
//! - SlotMetadata: bookkeeping for a save slot, independent of save content
//! - SaveError: the error taxonomy shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod slot;
pub mod unit;

pub use document::{SaveDocument, UnitBlocks, CURRENT_FORMAT_VERSION, OLDEST_KNOWN_VERSION};
pub use error::{Result, SaveError, UnitError};
pub use slot::{
    parse_slot_dir_name, slot_dir_name, SlotId, SlotMetadata, AUTO_SAVE_SLOT, BACKUPS_DIR_NAME,
    METADATA_FILE_NAME, SAVE_FILE_NAME,
};
pub use unit::{Persistable, UnitRegistry};
