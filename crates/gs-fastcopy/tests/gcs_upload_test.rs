//! Writes through the real GCS backend, with uploads going to an in-memory store

use gs_fastcopy::{Fastcopy, GcsTransfer, WriteOptions};
use gs_fastcopy_testing::assertions::assert_no_scratch_left;
use gs_fastcopy_testing::fixtures::{large_payload, JSON_BYTES};
use gs_fastcopy_testing::{init_tracing, TestDir};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::io::Write;
use std::sync::Arc;

fn fetch(store: &InMemory, key: &str) -> Vec<u8> {
    let runtime = tokio_runtime();
    runtime
        .block_on(async { store.get(&ObjectPath::from(key)).await?.bytes().await })
        .unwrap()
        .to_vec()
}

fn tokio_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn client_with_store(test_dir: &TestDir, store: Arc<InMemory>) -> Fastcopy {
    let remote = GcsTransfer::from_config(&test_dir.config().transfer).with_store(store);
    Fastcopy::new(test_dir.config()).with_remote(Arc::new(remote))
}

#[test]
fn test_write_uploads_exact_bytes() {
    init_tracing();
    let test_dir = TestDir::new().unwrap();
    let store = Arc::new(InMemory::new());
    let client = client_with_store(&test_dir, store.clone());

    let mut stream = client
        .write("gs://bucket/file.json", WriteOptions::default())
        .unwrap();
    stream.write_all(JSON_BYTES).unwrap();
    stream.finish().unwrap();

    assert_eq!(fetch(&store, "file.json"), JSON_BYTES);
    assert_no_scratch_left(&test_dir.scratch_root()).unwrap();
}

#[test]
fn test_write_many_chunks_with_few_workers() {
    let test_dir = TestDir::new().unwrap();
    let store = Arc::new(InMemory::new());
    let client = client_with_store(&test_dir, store.clone());

    let payload = large_payload(256 * 1024 + 5);
    let options = WriteOptions::default().max_workers(2).chunk_size(16 * 1024);
    let mut stream = client.write("gs://bucket/nested/blob.bin", options).unwrap();
    stream.write_all(&payload).unwrap();
    stream.finish().unwrap();

    assert_eq!(fetch(&store, "nested/blob.bin"), payload);
}

#[cfg(unix)]
#[test]
fn test_write_compressed_object() {
    let test_dir = TestDir::new().unwrap();
    let store = Arc::new(InMemory::new());
    let client = client_with_store(&test_dir, store.clone());

    let mut stream = client
        .write("gs://bucket/file.json.gz", WriteOptions::default())
        .unwrap();
    stream.write_all(JSON_BYTES).unwrap();
    stream.finish().unwrap();

    let stored = fetch(&store, "file.json.gz");
    assert_eq!(
        gs_fastcopy_testing::fixtures::gunzip(&stored).unwrap(),
        JSON_BYTES
    );
}
