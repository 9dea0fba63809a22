//! Slot lifecycle and metadata management
//!
//! Slots live under the save root as `slot_<id>/` directories. Metadata is
//! cached read-mostly and refreshed on write. A slot with a valid save
//! file is never reported as absent due to metadata corruption alone: the
//! manager synthesizes metadata from the save file's modification time and
//! size, persists it, and carries on.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use chronicle_core::{
    parse_slot_dir_name, slot_dir_name, Result, SaveError, SlotId, SlotMetadata,
    AUTO_SAVE_SLOT, METADATA_FILE_NAME, SAVE_FILE_NAME,
};
use chronicle_durability::integrity;

/// Multi-slot lifecycle and metadata, independent of save content
pub struct SlotManager {
    root: PathBuf,
    cache: RwLock<HashMap<SlotId, SlotMetadata>>,
}

impl SlotManager {
    /// Manage slots under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SlotManager {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Directory for a slot
    pub fn slot_dir(&self, slot_id: SlotId) -> PathBuf {
        self.root.join(slot_dir_name(slot_id))
    }

    /// Save file path for a slot
    pub fn save_path(&self, slot_id: SlotId) -> PathBuf {
        self.slot_dir(slot_id).join(SAVE_FILE_NAME)
    }

    /// Metadata file path for a slot
    pub fn metadata_path(&self, slot_id: SlotId) -> PathBuf {
        self.slot_dir(slot_id).join(METADATA_FILE_NAME)
    }

    /// Create a new slot directory with metadata
    ///
    /// Fails if the slot directory already exists.
    pub fn create_slot(
        &self,
        slot_id: SlotId,
        initial: Option<SlotMetadata>,
    ) -> Result<SlotMetadata> {
        if slot_id == 0 {
            return Err(SaveError::InvalidSlot(slot_id));
        }
        let dir = self.slot_dir(slot_id);
        if dir.exists() {
            return Err(SaveError::SlotExists(slot_id));
        }
        std::fs::create_dir_all(&dir)?;

        let mut meta = initial.unwrap_or_else(|| SlotMetadata::new(slot_id));
        meta.slot_id = slot_id;
        self.persist_metadata(&meta)?;
        info!(slot_id, "Slot created");
        Ok(meta)
    }

    /// Recursively remove a slot: save file, backups, metadata.
    /// Irreversible. Returns false when the slot did not exist.
    pub fn delete_slot(&self, slot_id: SlotId) -> Result<bool> {
        let dir = self.slot_dir(slot_id);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        self.cache.write().remove(&slot_id);
        info!(slot_id, "Slot deleted");
        Ok(true)
    }

    /// Metadata for a slot: cached, loaded from disk, or synthesized from
    /// the save file when the metadata file is missing or corrupt
    pub fn slot_info(&self, slot_id: SlotId) -> Result<Option<SlotMetadata>> {
        if let Some(meta) = self.cache.read().get(&slot_id) {
            return Ok(Some(meta.clone()));
        }

        let meta_path = self.metadata_path(slot_id);
        if meta_path.exists() {
            match std::fs::read(&meta_path)
                .map_err(SaveError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<SlotMetadata>(&bytes)?))
            {
                Ok(meta) => {
                    self.cache.write().insert(slot_id, meta.clone());
                    return Ok(Some(meta));
                }
                Err(e) => {
                    warn!(slot_id, error = %e, "Metadata unreadable, trying to synthesize");
                }
            }
        }

        // No (usable) metadata: fall back to the save file itself
        let save_path = self.save_path(slot_id);
        if !save_path.exists() {
            return Ok(None);
        }
        let meta = self.synthesize_metadata(slot_id, &save_path)?;
        Ok(Some(meta))
    }

    /// Enumerate slot directories and resolve each via `slot_info`
    pub fn all_slots(&self) -> Result<Vec<SlotMetadata>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<SlotId> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| parse_slot_dir_name(&entry.file_name().to_string_lossy()))
            .collect();
        ids.sort_unstable();

        let mut slots = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(meta) = self.slot_info(id)? {
                slots.push(meta);
            }
        }
        Ok(slots)
    }

    /// Lowest unused manual slot id, filling gaps left by deletion
    ///
    /// The reserved auto-save slot is never handed out, so a manual save
    /// cannot claim it and be clobbered by the next auto-save.
    pub fn next_available_id(&self) -> Result<SlotId> {
        let used: std::collections::HashSet<SlotId> = if self.root.exists() {
            std::fs::read_dir(&self.root)?
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| parse_slot_dir_name(&entry.file_name().to_string_lossy()))
                .collect()
        } else {
            Default::default()
        };

        let mut id = AUTO_SAVE_SLOT + 1;
        while used.contains(&id) {
            id += 1;
        }
        Ok(id)
    }

    /// Refresh metadata after a successful save
    ///
    /// Creates the metadata from scratch when the slot was saved without
    /// `create_slot` having run first.
    pub fn record_save(&self, slot_id: SlotId, file_size_bytes: u64) -> Result<SlotMetadata> {
        let mut meta = self
            .slot_info(slot_id)?
            .unwrap_or_else(|| SlotMetadata::new(slot_id));
        meta.record_save(file_size_bytes);
        self.persist_metadata(&meta)?;
        Ok(meta)
    }

    /// Add play time to a slot's running total
    pub fn add_play_time(&self, slot_id: SlotId, secs: u64) -> Result<()> {
        self.update(slot_id, |meta| meta.play_time_secs += secs)
    }

    /// Record the player's last-known location summary
    pub fn touch_location(&self, slot_id: SlotId, location: &str) -> Result<()> {
        self.update(slot_id, |meta| meta.last_location = location.to_string())
    }

    /// Count a session visiting this slot
    pub fn record_visit(&self, slot_id: SlotId) -> Result<()> {
        self.update(slot_id, |meta| meta.visits += 1)
    }

    fn update(&self, slot_id: SlotId, f: impl FnOnce(&mut SlotMetadata)) -> Result<()> {
        let mut meta = self
            .slot_info(slot_id)?
            .unwrap_or_else(|| SlotMetadata::new(slot_id));
        f(&mut meta);
        self.persist_metadata(&meta)
    }

    fn persist_metadata(&self, meta: &SlotMetadata) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(meta)?;
        integrity::write_atomic(&self.metadata_path(meta.slot_id), &bytes)?;
        self.cache.write().insert(meta.slot_id, meta.clone());
        Ok(())
    }

    fn synthesize_metadata(&self, slot_id: SlotId, save_path: &Path) -> Result<SlotMetadata> {
        let file_meta = std::fs::metadata(save_path)?;
        let modified = file_meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let meta = SlotMetadata::synthesized(slot_id, modified, file_meta.len());

        debug!(slot_id, "Synthesized metadata from save file");
        // Best effort: synthesis must never block a save/load
        if let Err(e) = self.persist_metadata(&meta) {
            warn!(slot_id, error = %e, "Could not persist synthesized metadata");
            self.cache.write().insert(slot_id, meta.clone());
        }
        Ok(meta)
    }
}
