// tests/staging_tests.rs
// Staged-event pickup used by the no-args service pass.

use serde_json::json;

use flup_tracker::services::AmendmentLedger;
use flup_tracker::services::staging::{self, STAGING_FILE_NAME};
use flup_tracker::LoopKind;

#[test]
fn drain_appends_staged_events_and_consumes_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let staged = dir.path().join(STAGING_FILE_NAME);
    let lines = [
        json!({"category": "outbound", "summary": "panel toggled", "data": {"panel": "relay"}}),
        json!({"category": "merger", "summary": "revision noted", "sourceFile": "rev-9.js"}),
    ];
    let text: String = lines.iter().map(|l| format!("{l}\n")).collect();
    std::fs::write(&staged, text).expect("write staged");

    let mut ledger = AmendmentLedger::open(dir.path()).expect("open");
    let outcome = staging::drain_staged(&mut ledger).expect("drain");
    assert_eq!(outcome.appended, 2);
    assert_eq!(outcome.dropped, 0);
    assert_eq!(outcome.retained, 0);
    assert!(!staged.exists(), "consumed staging file is removed");

    assert_eq!(ledger.state(LoopKind::Outbound).amendments.len(), 1);
    assert_eq!(ledger.state(LoopKind::Merger).amendments.len(), 1);
    assert_eq!(
        ledger.state(LoopKind::Merger).amendments[0].source_file.as_deref(),
        Some("rev-9.js")
    );

    // Durable, not just mirrored.
    let reopened = AmendmentLedger::open(dir.path()).expect("reopen");
    assert_eq!(reopened.state(LoopKind::Outbound).amendments.len(), 1);
}

#[test]
fn invalid_staged_events_are_dropped_not_retried() {
    let dir = tempfile::tempdir().expect("tempdir");
    let staged = dir.path().join(STAGING_FILE_NAME);
    let mut text = String::new();
    text.push_str("this is not json\n");
    // Closed-loop event without an instance id can never append.
    text.push_str(&format!(
        "{}\n",
        json!({"category": "closed", "summary": "orphan event"})
    ));
    text.push_str(&format!(
        "{}\n",
        json!({"category": "recursive", "summary": "still fine"})
    ));
    std::fs::write(&staged, text).expect("write staged");

    let mut ledger = AmendmentLedger::open(dir.path()).expect("open");
    let outcome = staging::drain_staged(&mut ledger).expect("drain");
    assert_eq!(outcome.appended, 1);
    assert_eq!(outcome.dropped, 2);
    assert_eq!(outcome.retained, 0);
    assert!(!staged.exists());
    assert_eq!(ledger.state(LoopKind::Recursive).amendments.len(), 1);
}

#[test]
fn missing_staging_file_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ledger = AmendmentLedger::open(dir.path()).expect("open");
    let outcome = staging::drain_staged(&mut ledger).expect("drain");
    assert_eq!(outcome.appended + outcome.dropped + outcome.retained, 0);
}
