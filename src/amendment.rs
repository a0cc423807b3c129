// src/amendment.rs
//! Wire-level records: amendments, exported bundles, staged events.
//!
//! Field names are camelCase on disk so that log lines, bundles, and staged
//! events written by any front end (dashboards, scripts) stay readable by
//! this crate and vice versa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::loops::LoopKind;

/// Tag given to amendments appended directly to a live log.
pub const LIVE_TAG: &str = "live";

/// One recorded change event within a category's history. Append-only:
/// never edited or deleted in place, only rotated into archives or
/// replaced wholesale by a bulk import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amendment {
    /// Creation time, set at append time, immutable.
    pub timestamp: DateTime<Utc>,
    pub category: LoopKind,
    /// Present only for the closed category (`cFLup-NN`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub summary: String,
    /// Arbitrary structured payload describing event specifics.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    /// External artifact the event pertains to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// `"live"` or `"imported:<path>"` — set at append time, never mutated.
    #[serde(default = "default_archive_tag")]
    pub archive_tag: String,
}

fn default_archive_tag() -> String {
    LIVE_TAG.to_string()
}

/// Exported archive bundle: a self-describing snapshot of a category's
/// live log plus all its rotated archives, sorted by timestamp ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveBundle {
    pub category: LoopKind,
    pub export_timestamp: DateTime<Utc>,
    pub total_entries: usize,
    pub entries: Vec<Amendment>,
}

/// A change event staged by an external collaborator (UI, script) for the
/// service pass to pick up. Same shape as an amendment minus the fields the
/// tracker assigns at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedEvent {
    pub category: LoopKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

/// Outcome of a read-only bundle check.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub category: LoopKind,
    pub total_entries: usize,
    pub valid_entries: usize,
    pub invalid_entries: usize,
    /// One reason per invalid entry, indexed into `entries`.
    pub problems: Vec<String>,
    /// Distinct instance ids seen (closed category only).
    pub instance_ids: Vec<String>,
}

impl ValidationReport {
    /// Strict pass: a bundle is valid only when every entry is.
    pub fn passed(&self) -> bool {
        self.invalid_entries == 0
    }
}
