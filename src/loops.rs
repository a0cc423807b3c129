// src/loops.rs
//! Loop categories. Each category maps to exactly one live log file and one
//! archive-filename prefix; the closed category additionally mints numbered
//! instances. All per-category naming lives here so adding a category is a
//! one-place change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The loop type an amendment belongs to. Partitions the amendment stream
/// into independent logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopKind {
    /// Closed feedback loops (`cFLup-NN` instances).
    Closed,
    Outbound,
    Recursive,
    /// Merger/self loop: the tracker's own change history.
    Merger,
}

impl LoopKind {
    pub const ALL: [LoopKind; 4] = [
        LoopKind::Closed,
        LoopKind::Outbound,
        LoopKind::Recursive,
        LoopKind::Merger,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            LoopKind::Closed => "closed",
            LoopKind::Outbound => "outbound",
            LoopKind::Recursive => "recursive",
            LoopKind::Merger => "merger",
        }
    }

    /// Parse a category tag as given on the CLI or in a bundle.
    /// `self` is accepted as an alias for the merger loop.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "closed" | "cflup" => Some(LoopKind::Closed),
            "outbound" | "flup" => Some(LoopKind::Outbound),
            "recursive" | "rflup" => Some(LoopKind::Recursive),
            "merger" | "self" => Some(LoopKind::Merger),
            _ => None,
        }
    }

    /// File name of the live (currently appended-to) log.
    pub fn live_log_name(self) -> &'static str {
        match self {
            LoopKind::Closed => "cflup-instances.log",
            LoopKind::Outbound => "flup.log",
            LoopKind::Recursive => "rflup.log",
            LoopKind::Merger => "merger.log",
        }
    }

    /// Prefix for rotated-archive file names (`<prefix>-<stamp>.log`).
    pub fn archive_prefix(self) -> &'static str {
        match self {
            LoopKind::Closed => "cflup-archive",
            LoopKind::Outbound => "flup-archive",
            LoopKind::Recursive => "rflup-archive",
            LoopKind::Merger => "merger-archive",
        }
    }

    /// Instance-id prefix for categories that mint numbered instances.
    pub fn instance_prefix(self) -> Option<&'static str> {
        match self {
            LoopKind::Closed => Some("cFLup"),
            _ => None,
        }
    }

    /// Lock file guarding append-or-rotate for this category.
    pub fn lock_file_name(self) -> String {
        format!("{}.lock", self.tag())
    }
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
