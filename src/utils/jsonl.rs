// src/utils/jsonl.rs
//! JSONL file helpers: durable appends, tolerant line-by-line reads, and
//! atomic whole-file writes (tmp + rename).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, TrackerError};

/// Append one value as a JSON line. The write is flushed before returning
/// so callers may mirror into memory afterwards (write-then-mirror).
pub fn append_line<S: Serialize>(path: &Path, value: &S) -> Result<()> {
    let json =
        serde_json::to_string(value).map_err(|e| TrackerError::validation(e.to_string()))?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| TrackerError::io(path, e))?;
    writeln!(f, "{json}").map_err(|e| TrackerError::io(path, e))?;
    f.flush().map_err(|e| TrackerError::io(path, e))?;
    Ok(())
}

/// Append many values in one file-open. Used by merge imports.
pub fn append_lines<S: Serialize>(path: &Path, values: &[S]) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| TrackerError::io(path, e))?;
    for value in values {
        let json =
            serde_json::to_string(value).map_err(|e| TrackerError::validation(e.to_string()))?;
        writeln!(f, "{json}").map_err(|e| TrackerError::io(path, e))?;
    }
    f.flush().map_err(|e| TrackerError::io(path, e))?;
    Ok(())
}

/// Read a JSONL file, skipping malformed lines with a warning. A missing
/// file reads as empty. Corruption in one entry must not prevent recovery
/// of the rest.
pub fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).map_err(|e| TrackerError::io(path, e))?;
    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(value) => out.push(value),
            Err(e) => {
                tracing::warn!(
                    "skipping malformed line {} in {}: {e}",
                    idx + 1,
                    path.display()
                );
            }
        }
    }
    Ok(out)
}

/// Count non-empty lines without parsing them. Used for archive listings.
pub fn count_lines(path: &Path) -> Result<usize> {
    let raw = fs::read_to_string(path).map_err(|e| TrackerError::io(path, e))?;
    Ok(raw.lines().filter(|l| !l.trim().is_empty()).count())
}

/// Write a whole file atomically via a temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| TrackerError::io(parent, e))?;
        }
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|e| TrackerError::io(&tmp, e))?;
        f.write_all(bytes).map_err(|e| TrackerError::io(&tmp, e))?;
        f.flush().map_err(|e| TrackerError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| TrackerError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Row {
        n: u32,
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rows.jsonl");
        append_line(&path, &Row { n: 1 }).expect("append");
        append_line(&path, &Row { n: 2 }).expect("append");
        let rows: Vec<Row> = read_lines(&path).expect("read");
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 2 }]);
        assert_eq!(count_lines(&path).expect("count"), 2);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rows.jsonl");
        fs::write(&path, "{\"n\":1}\nnot json at all\n{\"n\":3}\n").expect("write");
        let rows: Vec<Row> = read_lines(&path).expect("read");
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 3 }]);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rows: Vec<Row> = read_lines(&dir.path().join("absent.jsonl")).expect("read");
        assert!(rows.is_empty());
    }
}
