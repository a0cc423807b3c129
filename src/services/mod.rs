// src/services/mod.rs

pub mod archive;   // export/import/validate over live log + rotated archives
pub mod ledger;    // the ONLY live-log writer; in-memory state is a cache over disk
pub mod staging;   // pickup of externally-staged events

// Public API
pub use archive::{ArchiveInfo, ExportOutcome, ImportOptions, ImportOutcome, UsageInfo};
pub use ledger::{AmendmentLedger, CategoryState, CategoryStatus, InstanceRecord};
pub use staging::DrainOutcome;
