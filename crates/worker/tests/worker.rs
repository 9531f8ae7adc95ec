use std::thread;

use pretty_assertions::assert_eq;
use serde_json::json;

use goatdb_jsonlog::{Options, Record};
use goatdb_runtime::Platform;
use goatdb_vfs::{Native, Opfs};
use goatdb_worker::{
    channel_pair, proto::ErrorKind, spawn, spawn_for, Client, Host, PipeTransport, Transport,
};

fn enable_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

fn record(id: &str, v: i64) -> Record {
    Record::from_value(&json!({ "id": id, "v": v })).unwrap()
}

#[test]
fn open_append_flush_reopen_scan() {
    enable_logging();

    let (mut client, join) = spawn(Opfs::new(), Options::default());
    let records = vec![record("a", 1), record("b", 2)];

    let file = client.open("/db/items.jsonlog", true).unwrap();
    client.append(file, records.clone()).unwrap();
    client.flush(file).unwrap();
    client.close(file).unwrap();

    let file = client.open("/db/items.jsonlog", false).unwrap();
    let cursor = client.cursor(file).unwrap();
    assert_eq!(client.scan_all(cursor).unwrap(), records);
    client.close(file).unwrap();

    drop(client);
    join.join().unwrap();
}

#[test]
fn append_deduplicates_across_requests() {
    enable_logging();

    let (mut client, _join) = spawn(Opfs::new(), Options::default());

    let file = client.open("/items.jsonlog", true).unwrap();
    client.append(file, vec![record("a", 1)]).unwrap();
    client.flush(file).unwrap();
    client
        .append(file, vec![record("a", 2), record("b", 3)])
        .unwrap();
    client.flush(file).unwrap();

    let cursor = client.cursor(file).unwrap();
    assert_eq!(
        client.scan_all(cursor).unwrap(),
        vec![record("a", 1), record("b", 3)]
    );
}

#[test]
fn pipelined_cursors_scan_the_same_log() {
    enable_logging();

    let (mut client, _join) = spawn(
        Opfs::new(),
        Options {
            scan_batch_size: 3,
            ..Options::default()
        },
    );
    let records = (0..10).map(|i| record(&format!("r{i}"), i)).collect::<Vec<_>>();

    let file = client.open("/items.jsonlog", true).unwrap();
    client.append(file, records.clone()).unwrap();

    // Two cursors over the same handle, scanned alternately; the eager
    // next-batch reads must not bleed between them.
    let c1 = client.cursor(file).unwrap();
    let c2 = client.cursor(file).unwrap();
    let mut r1 = Vec::new();
    let mut r2 = Vec::new();
    let (mut done1, mut done2) = (false, false);
    while !(done1 && done2) {
        if !done1 {
            let (batch, done) = client.scan(c1).unwrap();
            r1.extend(batch);
            done1 = done;
        }
        if !done2 {
            let (batch, done) = client.scan(c2).unwrap();
            r2.extend(batch);
            done2 = done;
        }
    }

    assert_eq!(r1, records);
    assert_eq!(r2, records);
}

#[test]
fn closed_file_reports_file_closed_and_isolates_others() {
    enable_logging();

    let (mut client, _join) = spawn(Opfs::new(), Options::default());

    let doomed = client.open("/doomed.jsonlog", true).unwrap();
    let survivor = client.open("/survivor.jsonlog", true).unwrap();
    client.append(survivor, vec![record("s", 1)]).unwrap();

    let cursor = client.cursor(doomed).unwrap();
    client.close(doomed).unwrap();

    // Everything referencing the closed handle answers FileClosed...
    for err in [
        client.append(doomed, vec![record("x", 1)]).unwrap_err(),
        client.flush(doomed).unwrap_err(),
        client.scan(cursor).unwrap_err(),
        client.cursor(doomed).unwrap_err(),
        client.close(doomed).unwrap_err(),
    ] {
        assert_eq!(err.kind(), Some(ErrorKind::FileClosed));
    }

    // ...and the other handle is untouched.
    let cursor = client.cursor(survivor).unwrap();
    assert_eq!(client.scan_all(cursor).unwrap(), vec![record("s", 1)]);
}

#[test]
fn append_to_read_only_handle() {
    enable_logging();

    let (mut client, _join) = spawn(Opfs::new(), Options::default());

    let file = client.open("/items.jsonlog", true).unwrap();
    client.append(file, vec![record("a", 1)]).unwrap();
    client.close(file).unwrap();

    let file = client.open("/items.jsonlog", false).unwrap();
    let err = client.append(file, vec![record("b", 2)]).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::WriteNotPermitted));
}

#[test]
fn open_missing_file_read_only_is_an_io_error() {
    enable_logging();

    let (mut client, _join) = spawn(Opfs::new(), Options::default());
    let err = client.open("/absent.jsonlog", false).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::IOError));
}

#[test]
fn text_file_helpers() {
    enable_logging();

    let (mut client, _join) = spawn(Opfs::new(), Options::default());

    assert_eq!(client.read_text_file("/settings.json").unwrap(), None);
    assert!(client.write_text_file("/settings.json", "{}").unwrap());
    assert_eq!(
        client.read_text_file("/settings.json").unwrap(),
        Some("{}".into())
    );

    assert!(client.remove("/settings.json").unwrap());
    assert!(!client.remove("/settings.json").unwrap());
    assert_eq!(client.read_text_file("/settings.json").unwrap(), None);
}

#[test]
fn paths_are_normalized_on_the_way_in() {
    enable_logging();

    let (mut client, _join) = spawn(Opfs::new(), Options::default());

    assert!(client.write_text_file("/cfg/./nested/../settings.json", "{}").unwrap());
    assert_eq!(
        client.read_text_file("\\cfg\\settings.json").unwrap(),
        Some("{}".into())
    );

    let file = client.open("/db//items.jsonlog", true).unwrap();
    client.append(file, vec![record("a", 1)]).unwrap();
    client.close(file).unwrap();
    let file = client.open("/db/items.jsonlog", false).unwrap();
    let cursor = client.cursor(file).unwrap();
    assert_eq!(client.scan_all(cursor).unwrap(), vec![record("a", 1)]);
}

#[test]
fn malformed_messages_get_error_responses() {
    enable_logging();

    let (mut client_end, mut host_end) = channel_pair();
    let worker = thread::spawn(move || Host::new(Opfs::new(), Options::default()).run(&mut host_end));

    // Not JSON at all.
    client_end.send("not json").unwrap();
    let resp: serde_json::Value = serde_json::from_str(&client_end.recv().unwrap()).unwrap();
    assert_eq!(resp["type"], "error");
    assert_eq!(resp["error"], "UnknownCommand");

    // Unknown kind, but with a salvageable correlation id.
    client_end.send(r#"{"type":"defragment","id":42}"#).unwrap();
    let resp: serde_json::Value = serde_json::from_str(&client_end.recv().unwrap()).unwrap();
    assert_eq!(resp["id"], 42);
    assert_eq!(resp["error"], "UnknownCommand");

    // The worker survived both; a real request still works.
    client_end
        .send(r#"{"type":"open","id":43,"path":"/x.jsonlog","write":true}"#)
        .unwrap();
    let resp: serde_json::Value = serde_json::from_str(&client_end.recv().unwrap()).unwrap();
    assert_eq!(resp["type"], "open");
    assert_eq!(resp["id"], 43);

    drop(client_end);
    worker.join().unwrap();
}

#[test]
fn worker_over_pipes() {
    enable_logging();

    // The same worker body, framed over OS pipes instead of a channel.
    let (host_rx, client_tx) = std::io::pipe().unwrap();
    let (client_rx, host_tx) = std::io::pipe().unwrap();

    let worker = thread::spawn(move || {
        let mut transport = PipeTransport::new(host_rx, host_tx);
        Host::new(Opfs::new(), Options::default()).run(&mut transport);
    });

    let mut client = Client::new(PipeTransport::new(client_rx, client_tx));
    let file = client.open("/items.jsonlog", true).unwrap();
    client.append(file, vec![record("a", 1)]).unwrap();
    let cursor = client.cursor(file).unwrap();
    assert_eq!(client.scan_all(cursor).unwrap(), vec![record("a", 1)]);
    client.close(file).unwrap();

    drop(client);
    worker.join().unwrap();
}

#[test]
fn spawn_for_browser_platform_uses_the_sandbox() {
    enable_logging();

    let (mut client, _join) = spawn_for(Platform::Browser, Options::default());
    let file = client.open("/items.jsonlog", true).unwrap();
    client.append(file, vec![record("a", 1)]).unwrap();
    let cursor = client.cursor(file).unwrap();
    assert_eq!(client.scan_all(cursor).unwrap(), vec![record("a", 1)]);

    // Sandboxed: nothing landed on the host filesystem.
    assert!(!std::path::Path::new("/items.jsonlog").exists());
}

#[test]
fn worker_on_native_filesystem() {
    enable_logging();

    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("db/items.jsonlog");
    let path = path.to_str().unwrap();

    let (mut client, _join) = spawn(Native, Options::default());
    let file = client.open(path, true).unwrap();
    client
        .append(file, vec![record("a", 1), record("b", 2)])
        .unwrap();
    client.flush(file).unwrap();
    client.close(file).unwrap();

    let file = client.open(path, false).unwrap();
    let cursor = client.cursor(file).unwrap();
    assert_eq!(
        client.scan_all(cursor).unwrap(),
        vec![record("a", 1), record("b", 2)]
    );
}
