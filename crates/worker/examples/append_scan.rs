//! Append a handful of records on a worker thread and stream them back.
//!
//! Runs against the sandbox backend, so it leaves no files behind:
//!
//! ```sh
//! cargo run -p goatdb-worker --example append_scan
//! ```

use serde_json::json;

use goatdb_jsonlog::{Options, Record};
use goatdb_vfs::Opfs;
use goatdb_worker::spawn;

fn main() {
    env_logger::init();

    let (mut client, _worker) = spawn(Opfs::new(), Options::default());

    let file = client.open("/demo/items.jsonlog", true).expect("open");
    let records = (0..5)
        .map(|i| Record::from_value(&json!({ "id": format!("item-{i}"), "count": i })).unwrap())
        .collect();
    client.append(file, records).expect("append");
    client.flush(file).expect("flush");

    let cursor = client.cursor(file).expect("cursor");
    for record in client.scan_all(cursor).expect("scan") {
        println!("{record}");
    }
    client.close(file).expect("close");
}
