// src/services/archive.rs
//! Export, import, and validation of archive bundles, plus rotated-archive
//! listings. A bundle is the denormalized snapshot of a category's live
//! log and all of its rotated archives, sorted by timestamp ascending.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;

use crate::amendment::{Amendment, ArchiveBundle, ValidationReport};
use crate::error::{Result, TrackerError};
use crate::loops::LoopKind;
use crate::services::ledger::AmendmentLedger;
use crate::utils::jsonl;

#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub category: LoopKind,
    pub entries: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub total_entries: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Append to the existing history (with a backup) instead of replacing it.
    pub merge: bool,
    /// Check per-entry required fields, skipping entries that fail.
    pub validate: bool,
    /// Raise the instance counter past the highest imported id.
    pub update_counters: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            merge: true,
            validate: true,
            update_counters: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub category: LoopKind,
    pub imported: usize,
    /// Entries dropped by per-entry validation (warned, not fatal).
    pub skipped: usize,
    pub backup: Option<PathBuf>,
    pub replaced: bool,
}

#[derive(Debug, Clone)]
pub struct UsageInfo {
    pub category: LoopKind,
    pub live_bytes: u64,
    pub archive_files: usize,
    pub archive_bytes: u64,
}

impl UsageInfo {
    pub fn total_bytes(&self) -> u64 {
        self.live_bytes + self.archive_bytes
    }
}

/// Rotated-archive files for a category, oldest first. The embedded
/// timestamp makes the filenames sort chronologically.
pub(crate) fn archive_files_ascending(data_dir: &Path, kind: LoopKind) -> Result<Vec<PathBuf>> {
    if !data_dir.exists() {
        return Ok(Vec::new());
    }
    let marker = format!("{}-", kind.archive_prefix());
    let mut paths = Vec::new();
    let entries = fs::read_dir(data_dir).map_err(|e| TrackerError::io(data_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TrackerError::io(data_dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(&marker) && name.ends_with(".log") {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Rotated archives with entry counts and sizes, most recent first.
/// `kind = None` lists every category's archives.
pub fn list_archives(data_dir: &Path, kind: Option<LoopKind>) -> Result<Vec<ArchiveInfo>> {
    let kinds: Vec<LoopKind> = match kind {
        Some(k) => vec![k],
        None => LoopKind::ALL.to_vec(),
    };
    let mut infos = Vec::new();
    for k in kinds {
        let mut paths = archive_files_ascending(data_dir, k)?;
        paths.reverse();
        for path in paths {
            let bytes = fs::metadata(&path)
                .map(|m| m.len())
                .map_err(|e| TrackerError::io(&path, e))?;
            let entries = jsonl::count_lines(&path)?;
            infos.push(ArchiveInfo {
                path,
                category: k,
                entries,
                bytes,
            });
        }
    }
    Ok(infos)
}

/// Per-category byte/file totals across live logs and archives.
pub fn archive_usage(data_dir: &Path) -> Result<Vec<UsageInfo>> {
    let mut usage = Vec::new();
    for kind in LoopKind::ALL {
        let live = data_dir.join(kind.live_log_name());
        let live_bytes = fs::metadata(&live).map(|m| m.len()).unwrap_or(0);
        let mut archive_bytes = 0;
        let paths = archive_files_ascending(data_dir, kind)?;
        for path in &paths {
            archive_bytes += fs::metadata(path)
                .map(|m| m.len())
                .map_err(|e| TrackerError::io(path, e))?;
        }
        usage.push(UsageInfo {
            category: kind,
            live_bytes,
            archive_files: paths.len(),
            archive_bytes,
        });
    }
    Ok(usage)
}

/// Every amendment for a category: rotated archives (oldest first) then
/// the live log. Malformed lines are skipped with a warning.
pub fn collect_category(data_dir: &Path, kind: LoopKind) -> Result<Vec<Amendment>> {
    let mut entries = Vec::new();
    for path in archive_files_ascending(data_dir, kind)? {
        entries.extend(jsonl::read_lines::<Amendment>(&path)?);
    }
    entries.extend(jsonl::read_lines::<Amendment>(
        &data_dir.join(kind.live_log_name()),
    )?);
    Ok(entries)
}

/// Combine a category's full history into one self-describing bundle.
/// Fails with `NotFound` when there is nothing to export.
pub fn export_archive(
    data_dir: &Path,
    kind: LoopKind,
    output: Option<PathBuf>,
) -> Result<ExportOutcome> {
    let mut entries = collect_category(data_dir, kind)?;
    if entries.is_empty() {
        return Err(TrackerError::not_found(format!(
            "nothing to export for category '{kind}'"
        )));
    }
    entries.sort_by_key(|a| a.timestamp);

    let bundle = ArchiveBundle {
        category: kind,
        export_timestamp: Utc::now(),
        total_entries: entries.len(),
        entries,
    };
    let path = output.unwrap_or_else(|| {
        data_dir.join(format!(
            "{}-complete-archive-{}.json",
            kind.tag(),
            Utc::now().format("%Y-%m-%d")
        ))
    });
    let text = serde_json::to_string_pretty(&bundle)
        .map_err(|e| TrackerError::validation(e.to_string()))?;
    jsonl::write_atomic(&path, text.as_bytes())?;
    Ok(ExportOutcome {
        path,
        total_entries: bundle.total_entries,
    })
}

/// Import a previously exported bundle into the ledger.
///
/// Top-level shape problems fail the whole import with nothing applied.
/// Per-entry problems (when validating) are warned and skipped; the import
/// succeeds and reports the skipped count.
pub fn import_archive(
    ledger: &mut AmendmentLedger,
    path: &Path,
    options: ImportOptions,
) -> Result<ImportOutcome> {
    let (kind, raw_entries) = read_bundle(path)?;

    let mut accepted = Vec::new();
    let mut skipped = 0usize;
    for (idx, value) in raw_entries.into_iter().enumerate() {
        match entry_to_amendment(&value, options.validate) {
            Ok(amendment) => accepted.push(amendment),
            Err(reason) => {
                tracing::warn!(
                    "skipping entry {idx} of {}: {reason}",
                    path.display()
                );
                skipped += 1;
            }
        }
    }

    let live = ledger.live_log_path(kind);
    let _lock = ledger.lock_category(kind)?;
    let mut backup = None;

    if options.merge {
        if live.exists() {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
            let backup_path = ledger
                .data_dir()
                .join(format!("{}.backup-{stamp}", kind.live_log_name()));
            fs::copy(&live, &backup_path).map_err(|e| TrackerError::io(&live, e))?;
            backup = Some(backup_path);
        }
        let tag = format!("imported:{}", path.display());
        for amendment in &mut accepted {
            amendment.archive_tag = tag.clone();
        }
        jsonl::append_lines(&live, &accepted)?;
        for amendment in &accepted {
            ledger.mirror(kind, amendment.clone());
        }
    } else {
        // Replace mode keeps entries verbatim so an exported bundle
        // round-trips entry-set-equivalent.
        let mut text = String::new();
        for amendment in &accepted {
            let line = serde_json::to_string(amendment)
                .map_err(|e| TrackerError::validation(e.to_string()))?;
            text.push_str(&line);
            text.push('\n');
        }
        jsonl::write_atomic(&live, text.as_bytes())?;
        ledger.reload_category(kind)?;
    }

    if options.update_counters {
        if let Some(prefix) = kind.instance_prefix() {
            let max_seq = accepted
                .iter()
                .filter_map(|a| {
                    a.instance_id
                        .as_deref()
                        .and_then(|id| super::ledger::parse_instance_seq(id, prefix))
                })
                .max();
            if let Some(seq) = max_seq {
                ledger.raise_instance_floor(kind, seq);
            }
        }
    }

    Ok(ImportOutcome {
        category: kind,
        imported: accepted.len(),
        skipped,
        backup,
        replaced: !options.merge,
    })
}

/// Read-only integrity check of a bundle. Never mutates state or files.
/// A bundle passes only when every entry is valid.
pub fn validate_archive(path: &Path) -> Result<ValidationReport> {
    let (kind, raw_entries) = read_bundle(path)?;

    let mut valid = 0usize;
    let mut problems = Vec::new();
    let mut instance_ids = BTreeSet::new();
    let total = raw_entries.len();
    for (idx, value) in raw_entries.iter().enumerate() {
        match entry_to_amendment(value, true) {
            Ok(amendment) => {
                valid += 1;
                if kind.instance_prefix().is_some() {
                    if let Some(id) = amendment.instance_id {
                        instance_ids.insert(id);
                    }
                }
            }
            Err(reason) => problems.push(format!("entry {idx}: {reason}")),
        }
    }

    Ok(ValidationReport {
        category: kind,
        total_entries: total,
        valid_entries: valid,
        invalid_entries: total - valid,
        problems,
        instance_ids: instance_ids.into_iter().collect(),
    })
}

/// Parse a bundle file down to its category and raw entries, enforcing the
/// top-level shape: a JSON object with a recognized `category` and an
/// `entries` array.
fn read_bundle(path: &Path) -> Result<(LoopKind, Vec<Value>)> {
    let raw = fs::read_to_string(path).map_err(|e| TrackerError::io(path, e))?;
    let doc: Value = serde_json::from_str(&raw)
        .map_err(|e| TrackerError::validation(format!("{}: not valid JSON: {e}", path.display())))?;

    let Some(obj) = doc.as_object() else {
        return Err(TrackerError::validation(format!(
            "{}: top level is not a JSON object",
            path.display()
        )));
    };
    let Some(tag) = obj.get("category").and_then(Value::as_str) else {
        return Err(TrackerError::validation(format!(
            "{}: missing 'category' field",
            path.display()
        )));
    };
    let Some(kind) = LoopKind::from_tag(tag) else {
        return Err(TrackerError::UnknownCategory(tag.to_string()));
    };
    let Some(entries) = obj.get("entries").and_then(Value::as_array) else {
        return Err(TrackerError::validation(format!(
            "{}: missing 'entries' array",
            path.display()
        )));
    };
    Ok((kind, entries.clone()))
}

/// Convert one raw bundle entry. With `strict`, the minimum required
/// fields (timestamp, category, summary) must be present and usable;
/// without it only structural parse failures reject the entry.
fn entry_to_amendment(value: &Value, strict: bool) -> std::result::Result<Amendment, String> {
    if strict {
        let obj = value.as_object().ok_or("not a JSON object")?;
        for field in ["timestamp", "category", "summary"] {
            if !obj.contains_key(field) {
                return Err(format!("missing required field '{field}'"));
            }
        }
    }
    let amendment: Amendment =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    if strict && amendment.summary.trim().is_empty() {
        return Err("empty summary".to_string());
    }
    Ok(amendment)
}
