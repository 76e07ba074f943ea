use portunus::ledger::{DEFAULT_LEDGER_CAPACITY, UsageLedger, UsageLogEntry};
use portunus::{BackendKind, GenerationMethod, TokenCounts};

fn entry(user_id: u64, backend: BackendKind, cached: bool) -> UsageLogEntry {
    UsageLogEntry::now(
        user_id,
        GenerationMethod::Text,
        TokenCounts::new(10, 5),
        cached,
        backend,
    )
}

#[test]
fn ledger_never_exceeds_its_cap() {
    let ledger = UsageLedger::default();
    assert_eq!(ledger.capacity(), DEFAULT_LEDGER_CAPACITY);

    for i in 0..(DEFAULT_LEDGER_CAPACITY as u64 + 250) {
        ledger.record(entry(i, BackendKind::Local, false));
        assert!(ledger.len() <= DEFAULT_LEDGER_CAPACITY);
    }

    assert_eq!(ledger.len(), DEFAULT_LEDGER_CAPACITY);
    // the oldest 250 entries were dropped
    let all = ledger.recent(DEFAULT_LEDGER_CAPACITY);
    assert_eq!(all.last().map(|e| e.user_id), Some(250));
    assert_eq!(all.first().map(|e| e.user_id), Some(10_249));
}

#[test]
fn summary_splits_by_backend() {
    let ledger = UsageLedger::new(100);
    ledger.record(entry(1, BackendKind::Local, false));
    ledger.record(entry(1, BackendKind::Local, true));
    ledger.record(entry(2, BackendKind::Cloud, false));

    let summary = ledger.summary();
    assert_eq!(summary.entries, 3);
    assert_eq!(summary.local.requests, 2);
    assert_eq!(summary.local.cached, 1);
    assert_eq!(summary.local.input_tokens, 20);
    assert_eq!(summary.cloud.output_tokens, 5);
}

#[test]
fn entries_serialize_camel_case() {
    let value = serde_json::to_value(entry(3, BackendKind::Cloud, true)).unwrap();
    assert_eq!(value["userId"], 3);
    assert_eq!(value["inputTokens"], 10);
    assert_eq!(value["method"], "text");
    assert_eq!(value["backend"], "cloud");
    assert_eq!(value["cached"], true);
    assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
}
