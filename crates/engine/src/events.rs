//! Save/load outcome events
//!
//! The manager emits events to registered listeners after each operation.
//! Listeners run synchronously on the operating thread and should be
//! cheap; anything heavier belongs on the subscriber's own thread.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;

use chronicle_core::SlotId;

/// Progress and outcome notifications from the save manager
#[derive(Debug, Clone)]
pub enum SaveEvent {
    /// A save finished (possibly with partial unit failures, reported
    /// separately)
    SaveCompleted {
        /// Slot that was saved
        slot_id: SlotId,
        /// When the document was produced
        saved_at: DateTime<Utc>,
        /// Units captured into the document
        unit_count: usize,
        /// Path of the written save file
        file_path: PathBuf,
    },
    /// One or more units failed during capture or restore while the
    /// overall operation still succeeded
    PartialFailure {
        /// Slot involved
        slot_id: SlotId,
        /// Unit keys and their failure reasons
        failed_units: Vec<(String, String)>,
    },
    /// A load finished
    LoadCompleted {
        /// Slot that was loaded
        slot_id: SlotId,
        /// Units whose `restore` ran successfully
        restored_units: usize,
    },
}

/// Listener callback type
pub type EventListener = Box<dyn Fn(&SaveEvent) + Send + Sync>;

/// Registration list for event listeners
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<EventListener>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for all future events
    pub fn subscribe(&self, listener: EventListener) {
        self.listeners.lock().push(listener);
    }

    /// Deliver an event to every listener
    pub fn emit(&self, event: &SaveEvent) {
        for listener in self.listeners.lock().iter() {
            listener(event);
        }
    }
}
