//! Save slot identity and metadata
//!
//! Slot metadata is bookkeeping *about* a slot (playtime, last location,
//! counters, file size), independent of save content. It lives next to the
//! save file as `metadata.json`. Metadata corruption never blocks a
//! save/load: the slot manager synthesizes replacement metadata from the
//! raw save file's timestamp and size.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Slot identifier; valid ids start at 1
pub type SlotId = u32;

/// Reserved slot for auto-saves
pub const AUTO_SAVE_SLOT: SlotId = 1;

/// Save document file name inside a slot directory
pub const SAVE_FILE_NAME: &str = "save.json";

/// Metadata file name inside a slot directory
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Backup directory name inside a slot directory
pub const BACKUPS_DIR_NAME: &str = "backups";

/// Directory name for a slot under the save root
pub fn slot_dir_name(slot_id: SlotId) -> String {
    format!("slot_{}", slot_id)
}

/// Parse a slot id back out of a directory name, if it follows the
/// `slot_<id>` convention
pub fn parse_slot_dir_name(name: &str) -> Option<SlotId> {
    name.strip_prefix("slot_")?.parse().ok().filter(|id| *id >= 1)
}

/// Per-slot bookkeeping, persisted as `metadata.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotMetadata {
    /// Slot this metadata belongs to
    pub slot_id: SlotId,
    /// Wall-clock time of the last successful save
    pub last_save_time: DateTime<Utc>,
    /// Cumulative play time in seconds
    #[serde(default)]
    pub play_time_secs: u64,
    /// Last-known location summary (free-form, e.g. "tundra 120,-40")
    #[serde(default)]
    pub last_location: String,
    /// How many sessions visited this slot
    #[serde(default)]
    pub visits: u64,
    /// How many saves were written to this slot
    #[serde(default)]
    pub entries: u64,
    /// Size of the save file after the last save
    #[serde(default)]
    pub file_size_bytes: u64,
}

impl SlotMetadata {
    /// Fresh metadata for a newly created slot
    pub fn new(slot_id: SlotId) -> Self {
        SlotMetadata {
            slot_id,
            last_save_time: Utc::now(),
            play_time_secs: 0,
            last_location: String::new(),
            visits: 0,
            entries: 0,
            file_size_bytes: 0,
        }
    }

    /// Metadata reconstructed from a save file's observable properties
    ///
    /// Used when `metadata.json` is missing or corrupt but a save file
    /// exists; playtime and counters are unrecoverable and reset to zero.
    pub fn synthesized(slot_id: SlotId, modified: DateTime<Utc>, file_size_bytes: u64) -> Self {
        SlotMetadata {
            slot_id,
            last_save_time: modified,
            play_time_secs: 0,
            last_location: String::new(),
            visits: 0,
            entries: 0,
            file_size_bytes,
        }
    }

    /// Record a successful save of `file_size_bytes` bytes
    pub fn record_save(&mut self, file_size_bytes: u64) {
        self.last_save_time = Utc::now();
        self.entries += 1;
        self.file_size_bytes = file_size_bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metadata_zeroed() {
        let meta = SlotMetadata::new(2);
        assert_eq!(meta.slot_id, 2);
        assert_eq!(meta.entries, 0);
        assert_eq!(meta.play_time_secs, 0);
        assert!(meta.last_location.is_empty());
    }

    #[test]
    fn test_record_save_bumps_counters() {
        let mut meta = SlotMetadata::new(1);
        let before = meta.last_save_time;
        meta.record_save(4096);
        assert_eq!(meta.entries, 1);
        assert_eq!(meta.file_size_bytes, 4096);
        assert!(meta.last_save_time >= before);
    }

    #[test]
    fn test_synthesized_resets_unrecoverable_fields() {
        let modified = Utc::now();
        let meta = SlotMetadata::synthesized(5, modified, 1234);
        assert_eq!(meta.slot_id, 5);
        assert_eq!(meta.last_save_time, modified);
        assert_eq!(meta.file_size_bytes, 1234);
        assert_eq!(meta.play_time_secs, 0);
        assert_eq!(meta.entries, 0);
    }

    #[test]
    fn test_metadata_json_roundtrip() {
        let mut meta = SlotMetadata::new(3);
        meta.last_location = "glacier 10,-7".to_string();
        meta.play_time_secs = 3600;

        let bytes = serde_json::to_vec(&meta).unwrap();
        let parsed: SlotMetadata = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_metadata_tolerates_missing_optional_fields() {
        let raw = r#"{"slot_id":1,"last_save_time":"2026-01-01T00:00:00Z"}"#;
        let parsed: SlotMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.slot_id, 1);
        assert_eq!(parsed.entries, 0);
    }

    #[test]
    fn test_slot_dir_name_roundtrip() {
        assert_eq!(slot_dir_name(7), "slot_7");
        assert_eq!(parse_slot_dir_name("slot_7"), Some(7));
        assert_eq!(parse_slot_dir_name("slot_0"), None);
        assert_eq!(parse_slot_dir_name("slot_abc"), None);
        assert_eq!(parse_slot_dir_name("backups"), None);
    }
}
