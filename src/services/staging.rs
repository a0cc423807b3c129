// src/services/staging.rs
//! Staged-event pickup. External collaborators (dashboards, scripts) drop
//! `{category, instanceId?, summary, data, sourceFile?}` records, one JSON
//! object per line, into `staged-amendments.jsonl`; the service pass drains
//! them into the ledger. Events that fail on I/O are kept for the next
//! pass; events that can never succeed are dropped with a warning.

use std::fs;
use std::path::{Path, PathBuf};

use crate::amendment::StagedEvent;
use crate::error::{Result, TrackerError};
use crate::services::ledger::AmendmentLedger;
use crate::utils::jsonl;

pub const STAGING_FILE_NAME: &str = "staged-amendments.jsonl";

#[derive(Debug, Clone, Copy, Default)]
pub struct DrainOutcome {
    /// Events appended to their category logs.
    pub appended: usize,
    /// Malformed or invalid events, dropped.
    pub dropped: usize,
    /// Events that hit an I/O failure, retained for the next pass.
    pub retained: usize,
}

pub fn staging_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STAGING_FILE_NAME)
}

/// Drain the staging file into the ledger. Failures on one event never
/// abort the pass.
pub fn drain_staged(ledger: &mut AmendmentLedger) -> Result<DrainOutcome> {
    let path = staging_path(ledger.data_dir());
    if !path.exists() {
        return Ok(DrainOutcome::default());
    }
    let raw = fs::read_to_string(&path).map_err(|e| TrackerError::io(&path, e))?;

    let mut outcome = DrainOutcome::default();
    let mut retained_lines = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event = match serde_json::from_str::<StagedEvent>(trimmed) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    "dropping malformed staged event at line {} of {}: {e}",
                    idx + 1,
                    path.display()
                );
                outcome.dropped += 1;
                continue;
            }
        };
        match ledger.append(
            event.category,
            &event.summary,
            event.data,
            event.instance_id,
            event.source_file,
        ) {
            Ok(_) => outcome.appended += 1,
            Err(TrackerError::Io { .. }) => {
                tracing::warn!(
                    "staged event at line {} hit an I/O failure, retrying next pass",
                    idx + 1
                );
                retained_lines.push(trimmed.to_string());
                outcome.retained += 1;
            }
            Err(e) => {
                // Validation problems will not fix themselves on retry.
                tracing::warn!("dropping staged event at line {}: {e}", idx + 1);
                outcome.dropped += 1;
            }
        }
    }

    if retained_lines.is_empty() {
        fs::remove_file(&path).map_err(|e| TrackerError::io(&path, e))?;
    } else {
        let mut text = retained_lines.join("\n");
        text.push('\n');
        jsonl::write_atomic(&path, text.as_bytes())?;
    }
    Ok(outcome)
}
