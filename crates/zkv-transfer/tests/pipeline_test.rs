//! End-to-end upload → commit → download through in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use zkv_core::ZkvError;
use zkv_storage::{memory_operator, Backend, BackendPool, MemoryMetadataStore, MetadataStore};
use zkv_transfer::{download, prepare_upload, Ingestor, ShareLink};

fn memory_pool(n: usize) -> Arc<BackendPool> {
    let backends = (0..n)
        .map(|i| {
            Backend::new(
                format!("mem-{i}"),
                format!("memory://mem-{i}"),
                memory_operator().expect("memory operator"),
                Duration::from_secs(5),
            )
        })
        .collect();
    Arc::new(BackendPool::new(backends).expect("pool"))
}

fn sample(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 2)) as u8)
        .collect()
}

#[tokio::test]
async fn upload_download_roundtrip() {
    let pool = memory_pool(3);
    let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
    let ingestor = Ingestor::new(pool.clone(), metadata.clone()).with_verify_after_write(true);

    let original = sample(10_000);
    let prepared = prepare_upload("report.pdf", "application/pdf", &original, 3).unwrap();
    let record = ingestor.commit(prepared.bundle).await.unwrap();

    assert_eq!(record.filename, "report.pdf");
    assert_eq!(record.mime, "application/pdf");
    assert_eq!(record.size, 10_000);
    assert_eq!(record.chunks.len(), 3);

    let fetched = metadata.get(&record.id).unwrap().unwrap();
    let plain = download(pool.as_ref(), &fetched, &prepared.key).await.unwrap();
    assert_eq!(plain, original);
}

#[tokio::test]
async fn share_link_carries_everything_needed() {
    let pool = memory_pool(2);
    let ingestor = Ingestor::new(pool.clone(), Arc::new(MemoryMetadataStore::new()));

    let original = b"shared via link".to_vec();
    let prepared = prepare_upload("note.txt", "text/plain", &original, 2).unwrap();
    let record = ingestor.commit(prepared.bundle).await.unwrap();
    let link = ShareLink::new("http://127.0.0.1:8700", record.id, prepared.key).to_string();

    let parsed = ShareLink::parse(&link).unwrap();
    let record = ingestor.get(&parsed.id).unwrap().unwrap();
    let plain = download(pool.as_ref(), &record, &parsed.key).await.unwrap();
    assert_eq!(plain, original);
}

#[tokio::test]
async fn tampered_stored_chunk_fails_download() {
    let pool = memory_pool(3);
    let ingestor = Ingestor::new(pool.clone(), Arc::new(MemoryMetadataStore::new()));

    let prepared = prepare_upload("three.bin", "application/octet-stream", &sample(3_000), 3)
        .unwrap();
    let record = ingestor.commit(prepared.bundle).await.unwrap();
    assert_eq!(record.chunks.len(), 3);

    // Flip one byte of stored chunk 1 directly on its backend
    let chunk = &record.chunks[1];
    let backend = pool.by_name(&chunk.backend).unwrap();
    let mut stored = backend.operator().read(&chunk.key).await.unwrap().to_vec();
    stored[20] ^= 0x01;
    backend.operator().write(&chunk.key, stored).await.unwrap();

    let err = download(pool.as_ref(), &record, &prepared.key)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ZkvError::Integrity(_)),
        "expected integrity error, got {err:?}"
    );
}

#[tokio::test]
async fn delete_cascades_to_backends() {
    let pool = memory_pool(3);
    let ingestor = Ingestor::new(pool.clone(), Arc::new(MemoryMetadataStore::new()));

    let prepared = prepare_upload("gone.txt", "text/plain", &sample(900), 3).unwrap();
    let record = ingestor.commit(prepared.bundle).await.unwrap();

    assert!(ingestor.delete(&record.id).await.unwrap());
    assert!(ingestor.get(&record.id).unwrap().is_none());
    for chunk in &record.chunks {
        assert!(pool.fetch(&chunk.url).await.is_err());
    }
}

#[tokio::test]
async fn uploads_are_independent() {
    let pool = memory_pool(3);
    let ingestor = Ingestor::new(pool.clone(), Arc::new(MemoryMetadataStore::new()));

    let a = prepare_upload("a.txt", "text/plain", b"first file", 3).unwrap();
    let b = prepare_upload("b.txt", "text/plain", b"second file", 3).unwrap();
    let ra = ingestor.commit(a.bundle).await.unwrap();
    let rb = ingestor.commit(b.bundle).await.unwrap();
    assert_eq!(ingestor.list().unwrap().len(), 2);

    // Each key opens only its own upload
    assert!(download(pool.as_ref(), &ra, &b.key).await.is_err());
    assert_eq!(download(pool.as_ref(), &rb, &b.key).await.unwrap(), b"second file");
}
