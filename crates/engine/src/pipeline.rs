//! Canonical serialization, delta filtering, and compression
//!
//! ## Delta-save
//!
//! Each unit's compact serialized form is compared against the snapshot
//! taken at the previous save of the same slot; byte-identical blocks are
//! omitted from the outgoing document. On load, an omitted key simply
//! means "unchanged since last save" and the unit is left untouched. On a
//! first save, or for a key never previously snapshotted, the block is
//! always included. After filtering, the full current map replaces the
//! snapshot, regardless of what was written.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use chronicle_core::{Result, SlotId, UnitBlocks};
use chronicle_durability::codec;

type BlockSnapshot = HashMap<String, Vec<u8>>;

/// Serialization/compression/delta stage of the save pipeline
pub struct SavePipeline {
    compression: bool,
    compression_level: i32,
    delta_save: bool,
    /// Last captured serialized forms, keyed per slot
    snapshots: Mutex<HashMap<SlotId, BlockSnapshot>>,
}

impl SavePipeline {
    /// Build a pipeline stage from configuration flags
    pub fn new(compression: bool, compression_level: i32, delta_save: bool) -> Self {
        SavePipeline {
            compression,
            compression_level,
            delta_save,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Whether delta filtering is enabled
    pub fn delta_enabled(&self) -> bool {
        self.delta_save
    }

    /// Filter out unit blocks unchanged since the last save of `slot_id`
    ///
    /// Returns the (possibly reduced) outgoing map and the number of
    /// omitted blocks. The snapshot is refreshed with the full current map
    /// even when filtering is disabled, so enabling delta-save later
    /// starts from a correct baseline.
    pub fn delta_filter(&self, slot_id: SlotId, units: UnitBlocks) -> Result<(UnitBlocks, usize)> {
        let mut serialized: HashMap<String, Vec<u8>> = HashMap::with_capacity(units.len());
        for (key, block) in &units {
            serialized.insert(key.clone(), serde_json::to_vec(block)?);
        }

        let mut snapshots = self.snapshots.lock();
        let previous = snapshots.get(&slot_id);

        let mut outgoing = UnitBlocks::new();
        let mut omitted = 0;
        for (key, block) in &units {
            let unchanged = self.delta_save
                && previous
                    .and_then(|snap| snap.get(key))
                    .map(|last| last == &serialized[key])
                    .unwrap_or(false);
            if unchanged {
                omitted += 1;
            } else {
                outgoing.insert(key.clone(), block.clone());
            }
        }

        if omitted > 0 {
            debug!(slot_id, omitted, "Delta filter omitted unchanged blocks");
        }
        snapshots.insert(slot_id, serialized);
        Ok((outgoing, omitted))
    }

    /// Drop the snapshot for a slot (after deletion)
    pub fn forget_slot(&self, slot_id: SlotId) {
        self.snapshots.lock().remove(&slot_id);
    }

    /// Apply the configured compression to serialized document bytes
    pub fn encode(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        if self.compression {
            Ok(codec::compress(&bytes, self.compression_level)?)
        } else {
            Ok(bytes)
        }
    }

    /// Undo compression if the input carries the magic prefix
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(codec::decompress_auto(bytes)?)
    }
}
