//! Crash-atomicity property for the record-log engine: for every record
//! written with `append`, `read_all` after a simulated crash either yields
//! that record exactly or omits it — it never yields a truncated/garbled
//! decode.

use agentwatch::recordlog::{append, read_all};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
struct Event {
    id: u32,
    payload: String,
}

#[test]
fn full_writes_all_round_trip_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");

    let events: Vec<Event> = (0..20)
        .map(|id| Event { id, payload: format!("event-{id}") })
        .collect();
    for event in &events {
        append(&path, event).unwrap();
    }

    let read_back: Vec<Event> = read_all(&path).unwrap();
    assert_eq!(read_back, events);
}

#[test]
fn torn_final_line_is_omitted_not_garbled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");

    append(&path, &Event { id: 1, payload: "first".into() }).unwrap();
    append(&path, &Event { id: 2, payload: "second".into() }).unwrap();

    // Simulate a crash mid-write: append a partial, unterminated line as a
    // process death would leave behind (no trailing '\n', truncated JSON).
    let full = serde_json::to_string(&Event { id: 3, payload: "third".into() }).unwrap();
    let torn = &full[..full.len() / 2];
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(torn.as_bytes()).unwrap();

    let records: Vec<Event> = read_all(&path).unwrap();
    // The two complete records survive exactly; the torn one is omitted
    // entirely rather than producing a partial/incorrect `Event`.
    assert_eq!(records, vec![
        Event { id: 1, payload: "first".into() },
        Event { id: 2, payload: "second".into() },
    ]);
}

#[test]
fn garbage_between_valid_lines_does_not_corrupt_neighbors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");

    append(&path, &Event { id: 1, payload: "a".into() }).unwrap();
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not valid json").unwrap();
    }
    append(&path, &Event { id: 2, payload: "b".into() }).unwrap();

    let records: Vec<Event> = read_all(&path).unwrap();
    assert_eq!(records, vec![
        Event { id: 1, payload: "a".into() },
        Event { id: 2, payload: "b".into() },
    ]);
}

#[test]
fn missing_file_reads_as_empty_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.jsonl");
    let records: Vec<Event> = read_all(&path).unwrap();
    assert!(records.is_empty());
    fs::remove_dir_all(dir.path()).unwrap();
}
