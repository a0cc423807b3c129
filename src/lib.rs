// src/lib.rs
//! flup-tracker: amendment log and archive manager for fLup loop histories.
//!
//! Change events ("amendments") are partitioned by loop category into
//! append-only JSONL logs. A live log past its size threshold is rotated
//! into a timestamped archive before the next write; a category's full
//! history (live + archives) can be exported as a single self-describing
//! bundle, validated, and imported back.
//!
//! The on-disk logs are the only source of truth. In-memory state is a
//! cache rebuilt at open and mutated only after a durable write.

pub mod amendment;
pub mod config;
pub mod error;
pub mod loops;
pub mod services;
pub mod utils;

pub use amendment::{Amendment, ArchiveBundle, StagedEvent, ValidationReport};
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use loops::LoopKind;
pub use services::{AmendmentLedger, ImportOptions};
