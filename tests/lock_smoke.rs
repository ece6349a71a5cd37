// Concurrent append smoke test: lines from separate writers never interleave.
use std::thread;

use serde_json::json;
use tradinghours::api::{Cluster, Store};

#[test]
fn concurrent_appends_are_serialized() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("store");
    Store::new(&root).touch().expect("touch");

    let workers = 8;
    let per_worker = 50;
    let mut handles = Vec::new();
    for worker in 0..workers {
        let root = root.clone();
        handles.push(thread::spawn(move || {
            let mut store = Store::new(&root);
            let padding = "x".repeat(512);
            for i in 0..per_worker {
                let key = format!("{worker:02}-{i:03}");
                let record = json!({"worker": worker, "i": i, "padding": padding});
                store
                    .store_record(&record, "lock", Some("shared"), Some(&key))
                    .expect("append");
            }
        }));
    }
    for handle in handles {
        handle.join().expect("join");
    }

    let cluster = Cluster::new(root.join("lock").join("shared.dat"));
    let data = cluster.load_all().expect("load");
    assert_eq!(data.len(), workers * per_worker);
    assert!(data.get("07-049").is_some());
}
