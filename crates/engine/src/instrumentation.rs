//! Per-operation instrumentation
//!
//! Each save/load records its duration, byte sizes, unit count, and
//! whether delta filtering applied, keyed by operation kind and slot. The
//! recorder keeps a bounded ring of recent operations and can export an
//! aggregate diagnostics report to a file for offline inspection. None of
//! this sits on the save/load correctness path.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use chronicle_core::{Result, SlotId};
use chronicle_durability::integrity;

/// How many recent operations the ring retains
const RING_CAPACITY: usize = 256;

/// Operation kind for metric keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// A save operation
    Save,
    /// A load operation
    Load,
}

/// Metrics for one completed operation
#[derive(Debug, Clone, Serialize)]
pub struct OpMetrics {
    /// Save or load
    pub op: OpKind,
    /// Slot the operation targeted
    pub slot_id: SlotId,
    /// When the operation finished
    pub at: DateTime<Utc>,
    /// Wall-clock duration in microseconds
    pub duration_micros: u64,
    /// Serialized document size before compression
    pub bytes_raw: u64,
    /// Bytes actually read from / written to disk
    pub bytes_on_disk: u64,
    /// Units captured or restored
    pub unit_count: usize,
    /// Whether delta filtering omitted at least one block
    pub delta_applied: bool,
}

/// Aggregate figures for one operation kind
#[derive(Debug, Clone, Serialize, Default)]
struct OpAggregate {
    count: usize,
    total_duration_micros: u64,
    total_bytes_on_disk: u64,
}

/// Diagnostics report written by [`PerfRecorder::export_diagnostics`]
#[derive(Debug, Serialize)]
struct DiagnosticsReport<'a> {
    generated_at: DateTime<Utc>,
    saves: OpAggregate,
    loads: OpAggregate,
    recent: &'a VecDeque<OpMetrics>,
}

/// Bounded recorder of save/load metrics
#[derive(Default)]
pub struct PerfRecorder {
    ring: Mutex<VecDeque<OpMetrics>>,
}

impl PerfRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed operation
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        op: OpKind,
        slot_id: SlotId,
        duration: Duration,
        bytes_raw: u64,
        bytes_on_disk: u64,
        unit_count: usize,
        delta_applied: bool,
    ) {
        let metrics = OpMetrics {
            op,
            slot_id,
            at: Utc::now(),
            duration_micros: duration.as_micros() as u64,
            bytes_raw,
            bytes_on_disk,
            unit_count,
            delta_applied,
        };
        let mut ring = self.ring.lock();
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(metrics);
    }

    /// Recent operations, oldest first
    pub fn recent(&self) -> Vec<OpMetrics> {
        self.ring.lock().iter().cloned().collect()
    }

    /// Recent operations of one kind
    pub fn for_op(&self, op: OpKind) -> Vec<OpMetrics> {
        self.ring
            .lock()
            .iter()
            .filter(|m| m.op == op)
            .cloned()
            .collect()
    }

    /// Recent operations against one slot
    pub fn for_slot(&self, slot_id: SlotId) -> Vec<OpMetrics> {
        self.ring
            .lock()
            .iter()
            .filter(|m| m.slot_id == slot_id)
            .cloned()
            .collect()
    }

    /// Serialize the accumulated report to a file for offline inspection
    pub fn export_diagnostics(&self, path: &Path) -> Result<()> {
        let ring = self.ring.lock();

        let mut saves = OpAggregate::default();
        let mut loads = OpAggregate::default();
        for m in ring.iter() {
            let agg = match m.op {
                OpKind::Save => &mut saves,
                OpKind::Load => &mut loads,
            };
            agg.count += 1;
            agg.total_duration_micros += m.duration_micros;
            agg.total_bytes_on_disk += m.bytes_on_disk;
        }

        let report = DiagnosticsReport {
            generated_at: Utc::now(),
            saves,
            loads,
            recent: &ring,
        };
        let bytes = serde_json::to_vec_pretty(&report)?;
        integrity::write_atomic(path, &bytes)
    }
}
