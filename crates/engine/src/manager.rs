//! Save/load orchestration
//!
//! `SaveManager` is the single entry point for saving and loading a named
//! slot. It owns the unit registry, sequences the pipeline phases, and
//! enforces the single-writer guarantee: one operation gate serializes
//! saves *and* loads per manager, so a concurrent save and load against
//! the same slot cannot interleave. Explicit calls block on the gate;
//! auto-save triggers that arrive while an operation is in flight are
//! suppressed rather than queued, to avoid unbounded backlog.
//!
//! ## Save phases
//!
//! 1. Validating: slot id, free space, writability
//! 2. Collecting: `capture()` per registered unit, in registration order,
//!    tolerating per-unit failures
//! 3. Processing: delta filter, canonical serialization, checksum over the
//!    pre-compression canonical bytes, optional compression
//! 4. Writing: atomic temp-file + rename
//! 5. Complete: metadata refresh, metrics, events

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use chronicle_core::{
    Persistable, Result, SaveDocument, SaveError, SlotId, SlotMetadata, UnitBlocks, UnitRegistry,
    AUTO_SAVE_SLOT, CURRENT_FORMAT_VERSION,
};
use chronicle_durability::{
    integrity, BackupManager, BackupRecord, DetectedVersion, VersionManager, MIN_SUPPORTED_VERSION,
};

use crate::autosave::{AutoSavePolicy, SignificantEvent};
use crate::config::SaveConfig;
use crate::events::{EventBus, EventListener, SaveEvent};
use crate::instrumentation::{OpKind, PerfRecorder};
use crate::pipeline::SavePipeline;
use crate::slots::SlotManager;

/// A unit that failed during capture or restore, with the reason
#[derive(Debug, Clone)]
pub struct FailedUnit {
    /// The unit's registration key
    pub key: String,
    /// Why it failed
    pub reason: String,
}

/// Outcome of a completed save
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// Slot that was saved
    pub slot_id: SlotId,
    /// Document timestamp
    pub saved_at: DateTime<Utc>,
    /// Units successfully captured
    pub unit_count: usize,
    /// Unit blocks actually written (after delta filtering)
    pub units_written: usize,
    /// Units whose capture failed; the save still succeeded without them
    pub failed_units: Vec<FailedUnit>,
    /// Path of the written save file
    pub file_path: PathBuf,
    /// Bytes written to disk (after compression, when enabled)
    pub bytes_written: u64,
    /// Wall-clock duration of the save
    pub duration: Duration,
}

/// Outcome of a completed load
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// Slot that was loaded
    pub slot_id: SlotId,
    /// Format version of the document after any migration
    pub format_version: u32,
    /// Units whose `restore` ran successfully
    pub restored_units: usize,
    /// Keys present in the document but not registered; their blocks were
    /// left alone
    pub skipped_keys: Vec<String>,
    /// Units whose restore failed; previously restored units are not
    /// rolled back
    pub failed_units: Vec<FailedUnit>,
    /// Wall-clock duration of the load
    pub duration: Duration,
}

/// Top-level orchestrator for the save/load pipeline
pub struct SaveManager {
    root: PathBuf,
    config: SaveConfig,
    registry: RwLock<UnitRegistry>,
    /// Serializes saves and loads for this manager
    op_gate: Mutex<()>,
    slots: SlotManager,
    backups: BackupManager,
    versions: VersionManager,
    pipeline: SavePipeline,
    perf: PerfRecorder,
    events: EventBus,
    autosave: Mutex<AutoSavePolicy>,
}

impl SaveManager {
    /// Open a manager over `root`, loading (or creating) `chronicle.toml`
    pub fn open(root: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let root = root.into();
        let config = SaveConfig::load_or_init(&root)
            .map_err(|e| SaveError::SerializationFailed(e.to_string()))?;
        Ok(Self::open_with_config(root, config))
    }

    /// Open a manager with an explicit configuration
    pub fn open_with_config(root: impl Into<PathBuf>, config: SaveConfig) -> Arc<Self> {
        let root = root.into();
        let manager = SaveManager {
            slots: SlotManager::new(&root),
            backups: BackupManager::new(config.backup_retain),
            versions: VersionManager::new(),
            pipeline: SavePipeline::new(
                config.compression,
                config.compression_level,
                config.delta_save,
            ),
            perf: PerfRecorder::new(),
            events: EventBus::new(),
            autosave: Mutex::new(AutoSavePolicy::new(config.auto_save.clone())),
            registry: RwLock::new(UnitRegistry::new()),
            op_gate: Mutex::new(()),
            root,
            config,
        };
        Arc::new(manager)
    }

    /// Register a persistable unit; fails on duplicate key
    pub fn register_unit(&self, unit: Arc<dyn Persistable>) -> Result<()> {
        self.registry.write().register(unit)
    }

    /// Unregister a unit by key; returns true if it was registered
    pub fn unregister_unit(&self, key: &str) -> bool {
        self.registry.write().unregister(key)
    }

    /// Subscribe to progress and outcome events
    pub fn subscribe(&self, listener: EventListener) {
        self.events.subscribe(listener);
    }

    /// Save all registered units into `slot_id`
    ///
    /// Blocks behind the operation gate if another save or load is in
    /// flight.
    pub fn save_slot(&self, slot_id: SlotId) -> Result<SaveOutcome> {
        let _gate = self.op_gate.lock();
        self.save_locked(slot_id)
    }

    /// Load `slot_id` and restore every registered unit present in the
    /// document
    ///
    /// Loads take the same gate as saves, so a concurrent save and load
    /// against one slot are serialized.
    pub fn load_slot(&self, slot_id: SlotId) -> Result<LoadOutcome> {
        let _gate = self.op_gate.lock();
        self.load_locked(slot_id)
    }

    /// Advance the auto-save timer by `elapsed`
    ///
    /// When the configured interval is crossed, an auto-save of the
    /// reserved slot is triggered on a background thread without blocking
    /// the caller.
    pub fn tick(self: &Arc<Self>, elapsed: Duration) {
        if self.autosave.lock().tick(elapsed) {
            debug!("Auto-save interval crossed");
            self.trigger_auto_save();
        }
    }

    /// Publish a significant event from a collaborator
    ///
    /// Triggers an auto-save when that event kind is enabled in
    /// configuration.
    pub fn notify(self: &Arc<Self>, event: SignificantEvent) {
        if self.autosave.lock().event_enabled(event) {
            debug!(?event, "Significant event triggered auto-save");
            self.trigger_auto_save();
        } else {
            debug!(?event, "Significant event ignored by configuration");
        }
    }

    /// Back up the current save file of `slot_id`
    pub fn create_backup(&self, slot_id: SlotId) -> Result<Option<BackupRecord>> {
        self.backups.create_backup(&self.slots.slot_dir(slot_id))
    }

    /// Restore the most recent backup over the slot's save file
    pub fn restore_latest_backup(&self, slot_id: SlotId) -> Result<Option<DateTime<Utc>>> {
        let _gate = self.op_gate.lock();
        let restored = self.backups.restore_latest(&self.slots.slot_dir(slot_id))?;
        if restored.is_some() {
            // The on-disk predecessor changed; the delta baseline no
            // longer describes it
            self.pipeline.forget_slot(slot_id);
        }
        Ok(restored)
    }

    /// Restore a specific backup file over the slot's save file
    pub fn restore_backup(&self, slot_id: SlotId, backup_path: &Path) -> Result<()> {
        let _gate = self.op_gate.lock();
        self.backups
            .restore_specific(&self.slots.slot_dir(slot_id), backup_path)?;
        self.pipeline.forget_slot(slot_id);
        Ok(())
    }

    /// List a slot's backups, newest first
    pub fn list_backups(&self, slot_id: SlotId) -> Result<Vec<BackupRecord>> {
        self.backups.list_backups(&self.slots.slot_dir(slot_id))
    }

    /// Delete a slot and everything in it; returns false when absent
    pub fn delete_slot(&self, slot_id: SlotId) -> Result<bool> {
        let _gate = self.op_gate.lock();
        let removed = self.slots.delete_slot(slot_id)?;
        if removed {
            self.pipeline.forget_slot(slot_id);
        }
        Ok(removed)
    }

    /// Slot lifecycle and metadata
    pub fn slots(&self) -> &SlotManager {
        &self.slots
    }

    /// Metadata for one slot, if it exists
    pub fn slot_info(&self, slot_id: SlotId) -> Result<Option<SlotMetadata>> {
        self.slots.slot_info(slot_id)
    }

    /// Accumulated performance metrics
    pub fn perf(&self) -> &PerfRecorder {
        &self.perf
    }

    /// Write the diagnostics report to a file
    pub fn export_diagnostics(&self, path: &Path) -> Result<()> {
        self.perf.export_diagnostics(path)
    }

    fn trigger_auto_save(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("chronicle-autosave".to_string())
            .spawn(move || {
                // Suppress, don't queue: a trigger arriving while an
                // operation holds the gate is dropped.
                let Some(_gate) = manager.op_gate.try_lock() else {
                    debug!("Auto-save suppressed, operation in flight");
                    return;
                };
                match manager.save_locked(AUTO_SAVE_SLOT) {
                    Ok(outcome) => {
                        info!(
                            slot_id = outcome.slot_id,
                            unit_count = outcome.unit_count,
                            "Auto-save complete"
                        );
                    }
                    Err(e) => error!(error = %e, "Auto-save failed"),
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "Could not spawn auto-save thread");
        }
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    fn save_locked(&self, slot_id: SlotId) -> Result<SaveOutcome> {
        let started = Instant::now();

        // Phase 1: Validating
        if slot_id == 0 {
            return Err(SaveError::InvalidSlot(slot_id));
        }
        self.check_storage(slot_id)?;
        let slot_dir = self.slots.slot_dir(slot_id);
        debug!(slot_id, "Save starting");

        // Phase 2: Collecting
        let mut units = UnitBlocks::new();
        let mut failed_units = Vec::new();
        {
            let registry = self.registry.read();
            for unit in registry.iter() {
                match unit.capture() {
                    Ok(block) => {
                        units.insert(unit.key().to_string(), block);
                    }
                    Err(e) => {
                        warn!(key = unit.key(), error = %e, "Unit capture failed, excluding");
                        failed_units.push(FailedUnit {
                            key: unit.key().to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        let unit_count = units.len();

        // Previous artifact survives even a logically bad save
        if self.config.backup_on_save {
            if let Err(e) = self.backups.create_backup(&slot_dir) {
                warn!(slot_id, error = %e, "Pre-save backup failed, continuing");
            }
        }

        // Phase 3: Processing
        let (outgoing, omitted) = self.pipeline.delta_filter(slot_id, units)?;
        let units_written = outgoing.len();

        let mut doc = SaveDocument::new(outgoing);
        let canonical = doc.canonical_bytes()?;
        // Checksum covers the pre-compression canonical bytes, computed last
        doc.checksum = Some(integrity::checksum(&canonical));
        let saved_at = doc.saved_at;

        let raw = doc.to_writable_bytes()?;
        let bytes_raw = raw.len() as u64;
        let encoded = self.pipeline.encode(raw)?;
        let bytes_written = encoded.len() as u64;

        // Phase 4: Writing
        let file_path = self.slots.save_path(slot_id);
        integrity::write_atomic(&file_path, &encoded)?;

        // Phase 5: Complete
        if let Err(e) = self.slots.record_save(slot_id, bytes_written) {
            warn!(slot_id, error = %e, "Metadata refresh failed after save");
        }
        self.autosave.lock().reset_interval();

        let duration = started.elapsed();
        self.perf.record(
            OpKind::Save,
            slot_id,
            duration,
            bytes_raw,
            bytes_written,
            unit_count,
            omitted > 0,
        );

        info!(
            slot_id,
            unit_count,
            units_written,
            bytes_written,
            delta_applied = omitted > 0,
            duration_ms = duration.as_millis() as u64,
            "Save complete"
        );

        self.events.emit(&SaveEvent::SaveCompleted {
            slot_id,
            saved_at,
            unit_count,
            file_path: file_path.clone(),
        });
        if !failed_units.is_empty() {
            self.events.emit(&SaveEvent::PartialFailure {
                slot_id,
                failed_units: failed_units
                    .iter()
                    .map(|f| (f.key.clone(), f.reason.clone()))
                    .collect(),
            });
        }

        Ok(SaveOutcome {
            slot_id,
            saved_at,
            unit_count,
            units_written,
            failed_units,
            file_path,
            bytes_written,
            duration,
        })
    }

    /// Fail fast when the target volume cannot take the write
    fn check_storage(&self, slot_id: SlotId) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| SaveError::StorageUnavailable {
            slot_id,
            reason: format!("cannot create save root: {}", e),
        })?;

        let free = fs2::available_space(&self.root).map_err(|e| SaveError::StorageUnavailable {
            slot_id,
            reason: format!("cannot query free space: {}", e),
        })?;
        if free < self.config.min_free_bytes {
            return Err(SaveError::StorageUnavailable {
                slot_id,
                reason: format!(
                    "insufficient free space: {} bytes available, {} required",
                    free, self.config.min_free_bytes
                ),
            });
        }

        // Writability probe in the actual slot directory
        let slot_dir = self.slots.slot_dir(slot_id);
        std::fs::create_dir_all(&slot_dir).map_err(|e| SaveError::StorageUnavailable {
            slot_id,
            reason: format!("cannot create slot directory: {}", e),
        })?;
        let probe = slot_dir.join(".probe");
        std::fs::write(&probe, b"").map_err(|e| SaveError::StorageUnavailable {
            slot_id,
            reason: format!("slot directory not writable: {}", e),
        })?;
        let _ = std::fs::remove_file(&probe);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    fn load_locked(&self, slot_id: SlotId) -> Result<LoadOutcome> {
        let started = Instant::now();

        if slot_id == 0 {
            return Err(SaveError::InvalidSlot(slot_id));
        }
        let path = self.slots.save_path(slot_id);
        if !path.exists() {
            return Err(SaveError::SaveNotFound(slot_id));
        }
        debug!(slot_id, "Load starting");

        // Wait out a transient lock holder before reading
        let lock_wait = Duration::from_millis(self.config.lock_wait_ms);
        if !integrity::wait_for_available(&path, lock_wait) {
            return Err(SaveError::StorageUnavailable {
                slot_id,
                reason: format!("save file locked for longer than {:?}", lock_wait),
            });
        }

        // Validate integrity before anything else touches unit state
        let mut doc = self.read_validated(slot_id, &path)?;

        // Version gate, then migrate a stale-but-compatible document
        let detected = DetectedVersion::Version(doc.format_version);
        if !self.versions.is_compatible(detected) {
            return Err(SaveError::UnsupportedVersion {
                found: doc.format_version,
                min: MIN_SUPPORTED_VERSION,
                max: CURRENT_FORMAT_VERSION,
            });
        }
        if doc.format_version < CURRENT_FORMAT_VERSION {
            let outcome = self.versions.migrate(&path)?;
            info!(
                slot_id,
                from = outcome.from,
                steps = outcome.steps_applied,
                "Save migrated before load"
            );
            doc = self.read_validated(slot_id, &path)?;
        }

        // Dispatch blocks back to registered units, registration order
        let mut restored_units = 0;
        let mut failed_units = Vec::new();
        {
            let registry = self.registry.read();
            for unit in registry.iter() {
                let Some(block) = doc.units.get(unit.key()) else {
                    // Omitted by delta-save: unchanged, leave the unit be
                    continue;
                };
                match unit.restore(block) {
                    Ok(()) => restored_units += 1,
                    Err(e) => {
                        warn!(key = unit.key(), error = %e, "Unit restore failed, continuing");
                        failed_units.push(FailedUnit {
                            key: unit.key().to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            let skipped_keys: Vec<String> = doc
                .units
                .keys()
                .filter(|key| registry.get(key).is_none())
                .cloned()
                .collect();
            for key in &skipped_keys {
                warn!(key = %key, "Document block has no registered unit, skipping");
            }

            let duration = started.elapsed();
            self.perf.record(
                OpKind::Load,
                slot_id,
                duration,
                0,
                std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
                restored_units,
                false,
            );

            info!(
                slot_id,
                restored_units,
                failed = failed_units.len(),
                duration_ms = duration.as_millis() as u64,
                "Load complete"
            );
            self.events.emit(&SaveEvent::LoadCompleted {
                slot_id,
                restored_units,
            });
            if !failed_units.is_empty() {
                self.events.emit(&SaveEvent::PartialFailure {
                    slot_id,
                    failed_units: failed_units
                        .iter()
                        .map(|f| (f.key.clone(), f.reason.clone()))
                        .collect(),
                });
            }

            Ok(LoadOutcome {
                slot_id,
                format_version: doc.format_version,
                restored_units,
                skipped_keys,
                failed_units,
                duration,
            })
        }
    }

    /// Read, decompress, parse, and checksum-validate the save file
    fn read_validated(&self, slot_id: SlotId, path: &Path) -> Result<SaveDocument> {
        let bytes = integrity::read_locked(path)?;
        let raw = self.pipeline.decode(&bytes)?;

        let doc = SaveDocument::from_slice(&raw).map_err(|e| SaveError::IntegrityViolation {
            slot_id,
            detail: format!("document unparseable: {}", e),
        })?;

        let Some(expected) = doc.checksum.as_deref() else {
            return Err(SaveError::IntegrityViolation {
                slot_id,
                detail: "document has no checksum".to_string(),
            });
        };
        let canonical = doc.canonical_bytes()?;
        if !integrity::validate(&canonical, expected) {
            return Err(SaveError::IntegrityViolation {
                slot_id,
                detail: "checksum mismatch".to_string(),
            });
        }
        Ok(doc)
    }
}
