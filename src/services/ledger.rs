// src/services/ledger.rs
//! Amendment ledger: the only writer of live logs.
//!
//! - One append-only JSONL log per loop category under `<data_dir>/`.
//! - A log at or past the size threshold is rotated to a timestamped
//!   archive *before* the next entry is written, so a fresh entry always
//!   lands in a freshly-started live log.
//! - In-memory `CategoryState` is a cache rebuilt from disk at open; it is
//!   mutated only after the durable write succeeded (write-then-mirror).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::amendment::{Amendment, LIVE_TAG};
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::loops::LoopKind;
use crate::services::archive;
use crate::utils::jsonl;
use crate::utils::lockfile::CategoryLock;

/// Derived index entry for one closed-loop instance.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub created: DateTime<Utc>,
    /// Chronological amendments for this instance, archived ones included.
    pub amendments: Vec<Amendment>,
}

/// In-memory aggregate per category. Rebuilt from disk on every open; the
/// on-disk log is the only source of truth.
#[derive(Debug, Clone)]
pub struct CategoryState {
    /// Entries of the current live log, in file order.
    pub amendments: Vec<Amendment>,
    /// Closed category only: instance index over live + archived entries.
    pub instances: BTreeMap<String, InstanceRecord>,
    /// Closed category only: next numeric suffix to mint. Monotonic.
    pub next_instance_seq: u32,
}

impl Default for CategoryState {
    fn default() -> Self {
        Self {
            amendments: Vec::new(),
            instances: BTreeMap::new(),
            next_instance_seq: 1,
        }
    }
}

/// Per-category summary used by `status` / `loop-status`.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryStatus {
    pub category: LoopKind,
    pub live_entries: usize,
    pub instance_count: Option<usize>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub live_log_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub id: String,
    pub created: DateTime<Utc>,
    pub amendment_count: usize,
}

pub struct AmendmentLedger {
    data_dir: PathBuf,
    config: TrackerConfig,
    states: BTreeMap<LoopKind, CategoryState>,
}

impl AmendmentLedger {
    /// Open the ledger at `data_dir`, loading config and replaying every
    /// category's live log into memory.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|e| TrackerError::io(&data_dir, e))?;
        let config = TrackerConfig::load(&data_dir)
            .map_err(|e| TrackerError::validation(format!("{e:#}")))?;
        Self::open_with(data_dir, config)
    }

    /// Open with an explicit config (tests use tiny rotation thresholds).
    pub fn open_with(data_dir: impl Into<PathBuf>, config: TrackerConfig) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|e| TrackerError::io(&data_dir, e))?;
        let mut states = BTreeMap::new();
        for kind in LoopKind::ALL {
            states.insert(kind, load_category(&data_dir, kind)?);
        }
        Ok(Self {
            data_dir,
            config,
            states,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self, kind: LoopKind) -> &CategoryState {
        // states is seeded with every variant at open
        &self.states[&kind]
    }

    pub fn live_log_path(&self, kind: LoopKind) -> PathBuf {
        self.data_dir.join(kind.live_log_name())
    }

    /// Append one amendment. Rotation (if due) happens first; the JSONL
    /// line is written durably, and only then mirrored into memory.
    pub fn append(
        &mut self,
        kind: LoopKind,
        summary: &str,
        data: Map<String, Value>,
        instance_id: Option<String>,
        source_file: Option<String>,
    ) -> Result<Amendment> {
        if summary.trim().is_empty() {
            return Err(TrackerError::validation("amendment summary must not be empty"));
        }
        match (kind.instance_prefix(), &instance_id) {
            (Some(_), None) => {
                return Err(TrackerError::validation(
                    "closed-loop amendments need an instance id; create the instance first",
                ));
            }
            (None, Some(id)) => {
                return Err(TrackerError::validation(format!(
                    "category '{kind}' does not carry instance ids (got '{id}')"
                )));
            }
            _ => {}
        }

        let _lock = self.lock_category(kind)?;
        self.rotate_if_oversized(kind);

        let amendment = Amendment {
            timestamp: Utc::now(),
            category: kind,
            instance_id,
            summary: summary.to_string(),
            data,
            source_file,
            archive_tag: LIVE_TAG.to_string(),
        };
        jsonl::append_line(&self.live_log_path(kind), &amendment)?;
        self.mirror(kind, amendment.clone());
        Ok(amendment)
    }

    /// Mint the next numbered instance for a category that carries them and
    /// record its creation amendment. The counter only advances once the
    /// creation entry is durable, so consecutive successful calls yield
    /// gapless ids.
    pub fn create_instance(&mut self, kind: LoopKind) -> Result<String> {
        let Some(prefix) = kind.instance_prefix() else {
            return Err(TrackerError::validation(format!(
                "category '{kind}' does not mint instances"
            )));
        };
        let seq = self.state(kind).next_instance_seq;
        let id = format!("{prefix}-{seq:02}");
        self.append(kind, "instance created", Map::new(), Some(id.clone()), None)?;
        if let Some(state) = self.states.get_mut(&kind) {
            state.next_instance_seq = seq + 1;
        }
        Ok(id)
    }

    /// Explicitly rotate a category's live log. Returns the archive path,
    /// or `None` when there is nothing to rotate.
    pub fn rotate(&self, kind: LoopKind) -> Result<Option<PathBuf>> {
        let _lock = self.lock_category(kind)?;
        self.rotate_unlocked(kind)
    }

    /// Summaries for every category, in enum order.
    pub fn status(&self) -> Vec<CategoryStatus> {
        LoopKind::ALL
            .iter()
            .map(|&kind| self.loop_status(kind))
            .collect()
    }

    pub fn loop_status(&self, kind: LoopKind) -> CategoryStatus {
        let state = self.state(kind);
        let live_log_bytes = fs::metadata(self.live_log_path(kind))
            .map(|m| m.len())
            .unwrap_or(0);
        CategoryStatus {
            category: kind,
            live_entries: state.amendments.len(),
            instance_count: kind
                .instance_prefix()
                .map(|_| state.instances.len()),
            last_timestamp: state.amendments.last().map(|a| a.timestamp),
            live_log_bytes,
        }
    }

    /// Closed-loop instances with their amendment counts, id order.
    pub fn instances(&self, kind: LoopKind) -> Vec<InstanceSummary> {
        self.state(kind)
            .instances
            .iter()
            .map(|(id, rec)| InstanceSummary {
                id: id.clone(),
                created: rec.created,
                amendment_count: rec.amendments.len(),
            })
            .collect()
    }

    // ----------- crate-internal plumbing (import paths) -----------

    pub(crate) fn lock_category(&self, kind: LoopKind) -> Result<Option<CategoryLock>> {
        if !self.config.locking_enabled {
            return Ok(None);
        }
        let path = self.data_dir.join(kind.lock_file_name());
        CategoryLock::acquire(&path).map(Some)
    }

    pub(crate) fn mirror(&mut self, kind: LoopKind, amendment: Amendment) {
        if let Some(state) = self.states.get_mut(&kind) {
            register_instance(state, &amendment);
            state.amendments.push(amendment);
        }
    }

    /// Raise (never lower) the closed-category counter past `seq`.
    pub(crate) fn raise_instance_floor(&mut self, kind: LoopKind, seq: u32) {
        if let Some(state) = self.states.get_mut(&kind) {
            state.next_instance_seq = state.next_instance_seq.max(seq + 1);
        }
    }

    /// Rebuild one category's state from disk (after a replace import).
    pub(crate) fn reload_category(&mut self, kind: LoopKind) -> Result<()> {
        let state = load_category(&self.data_dir, kind)?;
        self.states.insert(kind, state);
        Ok(())
    }

    fn rotate_if_oversized(&self, kind: LoopKind) {
        let path = self.live_log_path(kind);
        let Ok(meta) = fs::metadata(&path) else {
            return;
        };
        if meta.len() < self.config.rotate_threshold_bytes {
            return;
        }
        match self.rotate_unlocked(kind) {
            Ok(Some(archive)) => {
                tracing::info!(
                    "rotated {} to {}",
                    path.display(),
                    archive.display()
                );
            }
            Ok(None) => {}
            Err(e) => {
                // Amendment writes must still succeed, appending to the
                // oversized log.
                tracing::warn!("rotation of {} failed, continuing: {e}", path.display());
            }
        }
    }

    fn rotate_unlocked(&self, kind: LoopKind) -> Result<Option<PathBuf>> {
        let live = self.live_log_path(kind);
        if !live.exists() {
            return Ok(None);
        }
        let archive = self.unique_archive_path(kind);
        fs::rename(&live, &archive).map_err(|e| TrackerError::io(&live, e))?;
        Ok(Some(archive))
    }

    fn unique_archive_path(&self, kind: LoopKind) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let base = format!("{}-{stamp}", kind.archive_prefix());
        let mut candidate = self.data_dir.join(format!("{base}.log"));
        let mut n = 1;
        while candidate.exists() {
            n += 1;
            candidate = self.data_dir.join(format!("{base}-{n}.log"));
        }
        candidate
    }
}

/// Replay a category's live log into a fresh `CategoryState`. For
/// instance-minting categories the rotated archives are also scanned, to
/// recover the id counter (ids are never reused across restarts) and to
/// keep archived instances visible in the index; archived amendments are
/// not loaded into `amendments`.
fn load_category(data_dir: &Path, kind: LoopKind) -> Result<CategoryState> {
    let mut state = CategoryState::default();

    if let Some(prefix) = kind.instance_prefix() {
        for archive_path in archive::archive_files_ascending(data_dir, kind)? {
            for entry in jsonl::read_lines::<Amendment>(&archive_path)? {
                bump_sequence(&mut state, &entry, prefix);
                register_instance(&mut state, &entry);
            }
        }
    }

    let live = data_dir.join(kind.live_log_name());
    for entry in jsonl::read_lines::<Amendment>(&live)? {
        if entry.category != kind {
            tracing::warn!(
                "entry in {} tagged '{}' (expected '{kind}'), keeping it",
                live.display(),
                entry.category
            );
        }
        if let Some(prefix) = kind.instance_prefix() {
            bump_sequence(&mut state, &entry, prefix);
        }
        register_instance(&mut state, &entry);
        state.amendments.push(entry);
    }

    Ok(state)
}

fn register_instance(state: &mut CategoryState, amendment: &Amendment) {
    let Some(id) = &amendment.instance_id else {
        return;
    };
    let record = state
        .instances
        .entry(id.clone())
        .or_insert_with(|| InstanceRecord {
            created: amendment.timestamp,
            amendments: Vec::new(),
        });
    if amendment.timestamp < record.created {
        record.created = amendment.timestamp;
    }
    record.amendments.push(amendment.clone());
}

fn bump_sequence(state: &mut CategoryState, amendment: &Amendment, prefix: &str) {
    if let Some(seq) = amendment
        .instance_id
        .as_deref()
        .and_then(|id| parse_instance_seq(id, prefix))
    {
        state.next_instance_seq = state.next_instance_seq.max(seq + 1);
    }
}

/// `cFLup-07` with prefix `cFLup` parses to `7`.
pub(crate) fn parse_instance_seq(id: &str, prefix: &str) -> Option<u32> {
    id.strip_prefix(prefix)?
        .strip_prefix('-')?
        .parse::<u32>()
        .ok()
}
