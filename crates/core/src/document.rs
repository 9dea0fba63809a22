//! Save document model and canonical encoding
//!
//! The save document is the root persisted artifact. On disk it is plain
//! JSON (human-diffable), optionally wrapped in zstd compression by the
//! durability layer.
//!
//! ## Document layout
//!
//! ```json
//! {
//!   "format_version": 3,
//!   "saved_at": "2026-08-31T12:00:00Z",
//!   "producer_version": "0.1.0",
//!   "units": { "character": { ... }, "world": { ... } },
//!   "checksum": "ab34..."
//! }
//! ```
//!
//! ## Canonical form
//!
//! The canonical encoding is compact JSON (no whitespace) with the
//! `checksum` field omitted and `units` in insertion order. Identical
//! logical content always produces identical canonical bytes; this is the
//! foundation for checksum stability and delta comparison. The checksum is
//! always computed over the canonical form, last, and verified before any
//! unit block is handed back to consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Current save document format version
pub const CURRENT_FORMAT_VERSION: u32 = 3;

/// Oldest format version this producer has ever written
///
/// Documents with no `format_version` field predate versioning and are
/// assumed to be this version.
pub const OLDEST_KNOWN_VERSION: u32 = 1;

/// Ordered mapping of unit key to opaque captured block
///
/// `serde_json`'s `preserve_order` feature keeps insertion order, so the
/// on-disk map reflects unit registration order.
pub type UnitBlocks = serde_json::Map<String, Value>;

/// The root persisted artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveDocument {
    /// Format version, monotonically increasing across releases.
    /// Absent in pre-versioning artifacts, which are assumed to be the
    /// oldest known version.
    #[serde(default = "oldest_known_version")]
    pub format_version: u32,
    /// When this document was produced
    pub saved_at: DateTime<Utc>,
    /// Producer version string; informational, never used for
    /// compatibility decisions. Empty for v1-era documents, which did not
    /// record a producer.
    #[serde(default)]
    pub producer_version: String,
    /// One opaque block per captured unit, in registration order
    pub units: UnitBlocks,
    /// SHA-256 hex over the canonical form (which excludes this field).
    /// A document without a checksum is never trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

fn oldest_known_version() -> u32 {
    OLDEST_KNOWN_VERSION
}

/// Borrowing view used to produce the canonical form.
///
/// Field order matches `SaveDocument` with `checksum` absent.
#[derive(Serialize)]
struct CanonicalView<'a> {
    format_version: u32,
    saved_at: &'a DateTime<Utc>,
    producer_version: &'a str,
    units: &'a UnitBlocks,
}

impl SaveDocument {
    /// Create a new document at the current format version
    pub fn new(units: UnitBlocks) -> Self {
        SaveDocument {
            format_version: CURRENT_FORMAT_VERSION,
            saved_at: Utc::now(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            units,
            checksum: None,
        }
    }

    /// Serialize the canonical form: compact JSON, checksum excluded
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let view = CanonicalView {
            format_version: self.format_version,
            saved_at: &self.saved_at,
            producer_version: &self.producer_version,
            units: &self.units,
        };
        Ok(serde_json::to_vec(&view)?)
    }

    /// Serialize the full document, checksum included, for persistence
    pub fn to_writable_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a document from raw (already decompressed) bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Look up a unit block by key
    pub fn block(&self, key: &str) -> Option<&Value> {
        self.units.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_units() -> UnitBlocks {
        let mut units = UnitBlocks::new();
        units.insert("character".to_string(), json!({"hp": 100, "x": 1.5}));
        units.insert("world".to_string(), json!({"seed": 42}));
        units
    }

    #[test]
    fn test_new_document_defaults() {
        let doc = SaveDocument::new(sample_units());
        assert_eq!(doc.format_version, CURRENT_FORMAT_VERSION);
        assert!(doc.checksum.is_none());
        assert_eq!(doc.producer_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let doc = SaveDocument::new(sample_units());
        let a = doc.canonical_bytes().unwrap();
        let b = doc.canonical_bytes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_bytes_exclude_checksum() {
        let mut doc = SaveDocument::new(sample_units());
        let without = doc.canonical_bytes().unwrap();
        doc.checksum = Some("abcd".to_string());
        let with = doc.canonical_bytes().unwrap();
        assert_eq!(without, with);
    }

    #[test]
    fn test_canonical_bytes_compact() {
        let doc = SaveDocument::new(sample_units());
        let bytes = doc.canonical_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains('\n'));
        assert!(!text.contains(": "));
    }

    #[test]
    fn test_unit_order_preserved() {
        let mut units = UnitBlocks::new();
        units.insert("zebra".to_string(), json!(1));
        units.insert("alpha".to_string(), json!(2));
        units.insert("mid".to_string(), json!(3));
        let doc = SaveDocument::new(units);

        let bytes = doc.to_writable_bytes().unwrap();
        let parsed = SaveDocument::from_slice(&bytes).unwrap();
        let keys: Vec<&String> = parsed.units.keys().collect();
        assert_eq!(keys, vec!["zebra", "alpha", "mid"]);
    }

    #[test]
    fn test_writable_roundtrip_with_checksum() {
        let mut doc = SaveDocument::new(sample_units());
        doc.checksum = Some("deadbeef".to_string());

        let bytes = doc.to_writable_bytes().unwrap();
        let parsed = SaveDocument::from_slice(&bytes).unwrap();
        assert_eq!(parsed, doc);
        assert_eq!(parsed.checksum.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_changing_a_unit_changes_canonical_bytes() {
        let doc_a = SaveDocument::new(sample_units());

        let mut units = sample_units();
        units.insert("character".to_string(), json!({"hp": 99, "x": 1.5}));
        let mut doc_b = doc_a.clone();
        doc_b.units = units;

        assert_ne!(
            doc_a.canonical_bytes().unwrap(),
            doc_b.canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_missing_checksum_field_parses_as_none() {
        let raw = r#"{"format_version":1,"saved_at":"2026-01-01T00:00:00Z","producer_version":"0.0.1","units":{}}"#;
        let doc = SaveDocument::from_slice(raw.as_bytes()).unwrap();
        assert!(doc.checksum.is_none());
        assert_eq!(doc.format_version, 1);
    }

    #[test]
    fn test_missing_format_version_assumes_oldest_known() {
        // Pre-versioning artifacts carry no format_version field
        let raw = r#"{"saved_at":"2026-01-01T00:00:00Z","units":{"character":{"hp":1}}}"#;
        let doc = SaveDocument::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(doc.format_version, OLDEST_KNOWN_VERSION);
    }

    #[test]
    fn test_block_lookup() {
        let doc = SaveDocument::new(sample_units());
        assert!(doc.block("character").is_some());
        assert!(doc.block("missing").is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_block() -> impl Strategy<Value = Value> {
            prop_oneof![
                any::<i64>().prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
                "[a-z ]{0,24}".prop_map(Value::from),
                proptest::collection::vec(any::<u32>(), 0..8)
                    .prop_map(|v| serde_json::to_value(v).unwrap()),
            ]
        }

        fn arb_units() -> impl Strategy<Value = UnitBlocks> {
            proptest::collection::vec(("[a-z_]{1,16}", arb_block()), 0..6).prop_map(|pairs| {
                let mut units = UnitBlocks::new();
                for (key, block) in pairs {
                    units.insert(key, block);
                }
                units
            })
        }

        proptest! {
            #[test]
            fn canonical_bytes_roundtrip_parses_identical(units in arb_units()) {
                let doc = SaveDocument::new(units);
                let bytes = doc.canonical_bytes().unwrap();
                let parsed = SaveDocument::from_slice(&bytes).unwrap();
                prop_assert_eq!(&parsed, &doc);
                // Re-serializing the parse produces the same bytes
                prop_assert_eq!(parsed.canonical_bytes().unwrap(), bytes);
            }

            #[test]
            fn checksum_field_never_affects_canonical_bytes(
                units in arb_units(),
                checksum in proptest::option::of("[0-9a-f]{64}"),
            ) {
                let mut doc = SaveDocument::new(units);
                let without = doc.canonical_bytes().unwrap();
                doc.checksum = checksum;
                prop_assert_eq!(doc.canonical_bytes().unwrap(), without);
            }
        }
    }
}
