//! Chronicle save engine
//!
//! The engine sits on top of the durability layer and owns the pipeline:
//!
//! - SaveManager: the single entry point for saving/loading a slot, the
//!   auto-save triggers, and the single-writer concurrency guarantee
//! - SlotManager: slot lifecycle and metadata, independent of save content
//! - SavePipeline: canonical serialization, delta filtering, compression
//! - PerfRecorder: per-operation instrumentation and diagnostics export
//! - SaveConfig: `chronicle.toml` configuration in the save root

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod autosave;
pub mod config;
pub mod events;
pub mod instrumentation;
pub mod manager;
pub mod pipeline;
pub mod slots;

pub use autosave::{AutoSavePolicy, SignificantEvent};
pub use config::{AutoSaveConfig, ConfigError, SaveConfig, CONFIG_FILE_NAME};
pub use events::{EventBus, EventListener, SaveEvent};
pub use instrumentation::{OpKind, OpMetrics, PerfRecorder};
pub use manager::{FailedUnit, LoadOutcome, SaveManager, SaveOutcome};
pub use pipeline::SavePipeline;
pub use slots::SlotManager;

// Core document and unit types, re-exported for callers of the engine
pub use chronicle_core::{
    Persistable, Result, SaveDocument, SaveError, SlotId, SlotMetadata, UnitBlocks, UnitError,
    UnitRegistry, AUTO_SAVE_SLOT, CURRENT_FORMAT_VERSION, OLDEST_KNOWN_VERSION,
};
