// tests/ledger_tests.rs
// Ledger behavior: append durability, rotation, instance minting, reload.

use serde_json::{Map, json};

use flup_tracker::config::TrackerConfig;
use flup_tracker::services::AmendmentLedger;
use flup_tracker::services::archive;
use flup_tracker::{Amendment, LoopKind};

fn config_with_threshold(bytes: u64) -> TrackerConfig {
    TrackerConfig {
        rotate_threshold_bytes: bytes,
        ..TrackerConfig::default()
    }
}

fn payload(key: &str, value: &str) -> Map<String, serde_json::Value> {
    let mut data = Map::new();
    data.insert(key.to_string(), json!(value));
    data
}

#[test]
fn append_is_durable_and_mirrored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ledger = AmendmentLedger::open(dir.path()).expect("open");

    let appended = ledger
        .append(
            LoopKind::Outbound,
            "relay adjusted",
            payload("delta", "+2"),
            None,
            Some("relay.html".into()),
        )
        .expect("append");

    let live = dir.path().join("flup.log");
    let raw = std::fs::read_to_string(&live).expect("read live log");
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 1);

    let parsed: Amendment = serde_json::from_str(lines[0]).expect("parse line");
    assert_eq!(parsed, appended);
    assert_eq!(parsed.summary, "relay adjusted");
    assert_eq!(parsed.archive_tag, "live");
    assert_eq!(ledger.state(LoopKind::Outbound).amendments.len(), 1);
}

#[test]
fn empty_summary_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ledger = AmendmentLedger::open(dir.path()).expect("open");

    let err = ledger
        .append(LoopKind::Outbound, "   ", Map::new(), None, None)
        .expect_err("empty summary must fail");
    assert!(err.to_string().contains("summary"));
    assert!(!dir.path().join("flup.log").exists());
    assert!(ledger.state(LoopKind::Outbound).amendments.is_empty());
}

#[test]
fn closed_append_requires_instance_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ledger = AmendmentLedger::open(dir.path()).expect("open");

    assert!(
        ledger
            .append(LoopKind::Closed, "orphan", Map::new(), None, None)
            .is_err()
    );
    assert!(
        ledger
            .append(
                LoopKind::Recursive,
                "stray id",
                Map::new(),
                Some("cFLup-01".into()),
                None,
            )
            .is_err()
    );
}

#[test]
fn oversized_live_log_rotates_before_next_append() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ledger =
        AmendmentLedger::open_with(dir.path(), config_with_threshold(1)).expect("open");

    ledger
        .append(LoopKind::Outbound, "first", Map::new(), None, None)
        .expect("append 1");
    // Live log now exceeds the 1-byte threshold; the next append rotates it.
    ledger
        .append(LoopKind::Outbound, "second", Map::new(), None, None)
        .expect("append 2");

    let archives = archive::list_archives(dir.path(), Some(LoopKind::Outbound)).expect("list");
    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0].entries, 1);

    let raw = std::fs::read_to_string(dir.path().join("flup.log")).expect("read live");
    let live_entries: Vec<Amendment> = raw
        .lines()
        .map(|l| serde_json::from_str(l).expect("parse"))
        .collect();
    assert_eq!(live_entries.len(), 1);
    assert_eq!(live_entries[0].summary, "second");
}

#[test]
fn explicit_rotate_empties_live_log_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ledger = AmendmentLedger::open(dir.path()).expect("open");
    ledger
        .append(LoopKind::Merger, "tracker updated", Map::new(), None, None)
        .expect("append");

    let archived = ledger.rotate(LoopKind::Merger).expect("rotate");
    let archived = archived.expect("archive path");
    assert!(archived.exists());
    assert!(!dir.path().join("merger.log").exists());

    // Nothing left to rotate.
    assert!(ledger.rotate(LoopKind::Merger).expect("rotate again").is_none());
}

#[test]
fn instance_ids_are_gapless_and_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let mut ledger = AmendmentLedger::open(dir.path()).expect("open");
        assert_eq!(ledger.create_instance(LoopKind::Closed).expect("create"), "cFLup-01");
        assert_eq!(ledger.create_instance(LoopKind::Closed).expect("create"), "cFLup-02");
        assert_eq!(ledger.create_instance(LoopKind::Closed).expect("create"), "cFLup-03");
    }

    // Reload from disk; the counter picks up past the highest existing id.
    let mut ledger = AmendmentLedger::open(dir.path()).expect("reopen");
    assert_eq!(ledger.create_instance(LoopKind::Closed).expect("create"), "cFLup-04");
}

#[test]
fn instance_counter_recovers_from_rotated_archives() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let mut ledger =
            AmendmentLedger::open_with(dir.path(), config_with_threshold(1)).expect("open");
        ledger.create_instance(LoopKind::Closed).expect("create 1");
        ledger.create_instance(LoopKind::Closed).expect("create 2");
    }
    // The first creation entry now lives only in a rotated archive.
    assert!(
        !archive::list_archives(dir.path(), Some(LoopKind::Closed))
            .expect("list")
            .is_empty()
    );

    let mut ledger = AmendmentLedger::open(dir.path()).expect("reopen");
    assert_eq!(ledger.create_instance(LoopKind::Closed).expect("create"), "cFLup-03");
}

#[test]
fn rotation_scenario_keeps_all_instances_visible() {
    // Threshold tuned so rotation triggers on the third append only: one
    // creation entry (~140 bytes) stays under it, two go over.
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ledger =
        AmendmentLedger::open_with(dir.path(), config_with_threshold(200)).expect("open");

    ledger.create_instance(LoopKind::Closed).expect("create 1");
    ledger.create_instance(LoopKind::Closed).expect("create 2");
    ledger.create_instance(LoopKind::Closed).expect("create 3");

    let archives = archive::list_archives(dir.path(), Some(LoopKind::Closed)).expect("list");
    assert_eq!(archives.len(), 1, "exactly one rotation expected");
    assert_eq!(archives[0].entries, 2);

    let raw = std::fs::read_to_string(dir.path().join("cflup-instances.log")).expect("read");
    assert_eq!(raw.lines().count(), 1);

    // All three instances are reported regardless of which file holds them.
    let instances = ledger.instances(LoopKind::Closed);
    let ids: Vec<&str> = instances.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["cFLup-01", "cFLup-02", "cFLup-03"]);

    // And still after a restart.
    let reopened = AmendmentLedger::open(dir.path()).expect("reopen");
    let ids: Vec<String> = reopened
        .instances(LoopKind::Closed)
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(ids, vec!["cFLup-01", "cFLup-02", "cFLup-03"]);
}

#[test]
fn load_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let mut ledger = AmendmentLedger::open(dir.path()).expect("open");
        ledger.create_instance(LoopKind::Closed).expect("create");
        ledger
            .append(LoopKind::Outbound, "tick", Map::new(), None, None)
            .expect("append");
    }

    let first = AmendmentLedger::open(dir.path()).expect("open 1");
    let second = AmendmentLedger::open(dir.path()).expect("open 2");
    for kind in LoopKind::ALL {
        assert_eq!(
            first.state(kind).amendments,
            second.state(kind).amendments,
            "category {kind}"
        );
        assert_eq!(
            first.state(kind).next_instance_seq,
            second.state(kind).next_instance_seq
        );
        let first_ids: Vec<&String> = first.state(kind).instances.keys().collect();
        let second_ids: Vec<&String> = second.state(kind).instances.keys().collect();
        assert_eq!(first_ids, second_ids);
    }
}

#[test]
fn malformed_log_lines_are_skipped_on_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let mut ledger = AmendmentLedger::open(dir.path()).expect("open");
        ledger
            .append(LoopKind::Recursive, "good one", Map::new(), None, None)
            .expect("append");
    }
    // Corrupt the log with a half-written line.
    let live = dir.path().join("rflup.log");
    let mut raw = std::fs::read_to_string(&live).expect("read");
    raw.push_str("{\"timestamp\": \"2026-08-\n");
    std::fs::write(&live, raw).expect("write");

    let ledger = AmendmentLedger::open(dir.path()).expect("reopen");
    let state = ledger.state(LoopKind::Recursive);
    assert_eq!(state.amendments.len(), 1);
    assert_eq!(state.amendments[0].summary, "good one");
}
