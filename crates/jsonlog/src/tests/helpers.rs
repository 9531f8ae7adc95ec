use std::io::{Read as _, Seek as _, SeekFrom, Write as _};
use std::path::Path;

use goatdb_vfs::{Opfs, Vfs};
use serde_json::json;

use crate::{open, Handle, Options, Record};

pub fn enable_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

pub fn record(id: &str, v: i64) -> Record {
    Record::from_value(&json!({ "id": id, "v": v })).unwrap()
}

pub fn mem_log(fs: &Opfs, path: &str) -> Handle<Opfs> {
    open(fs, Path::new(path), true, Options::default()).unwrap()
}

/// Collect all records of the log by driving a fresh cursor to the end.
pub fn scan_all<V: Vfs>(handle: &mut Handle<V>) -> Vec<Record> {
    let mut cursor = handle.begin_scan().unwrap();
    let mut records = Vec::new();
    loop {
        let (batch, done) = handle.scan(&mut cursor).unwrap();
        records.extend(batch);
        if done {
            return records;
        }
    }
}

pub fn raw_bytes(fs: &Opfs, path: &str) -> Vec<u8> {
    let mut file = fs.open(Path::new(path), false).unwrap();
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).unwrap();
    buf
}

pub fn write_raw(fs: &Opfs, path: &str, bytes: &[u8]) {
    let mut file = fs.open(Path::new(path), true).unwrap();
    file.seek(SeekFrom::End(0)).unwrap();
    file.write_all(bytes).unwrap();
}
