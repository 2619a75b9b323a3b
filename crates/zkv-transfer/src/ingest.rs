//! Server half of an upload, plus the record operations built on it
//!
//! `commit` never leaves a partial upload visible: a failure at any point
//! after transmission starts deletes whatever blobs were already written,
//! and the record is inserted only after every chunk is stored and checked.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zkv_core::types::{unix_now, ChunkDescriptor, UploadRecord};
use zkv_core::{ZkvError, ZkvResult};
use zkv_crypto::{verify_chunk, verify_file_hash};
use zkv_storage::{BackendPool, MetadataStore, StoredBlob};

use crate::stage::UploadStage;
use crate::upload::{verify_bundle, ChunkPayload, UploadBundle};

pub struct Ingestor {
    pool: Arc<BackendPool>,
    metadata: Arc<dyn MetadataStore>,
    verify_after_write: bool,
    max_chunks: usize,
}

impl Ingestor {
    pub fn new(pool: Arc<BackendPool>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            pool,
            metadata,
            verify_after_write: false,
            max_chunks: usize::MAX,
        }
    }

    /// Read every chunk back after writing and re-check its hash.
    pub fn with_verify_after_write(mut self, enabled: bool) -> Self {
        self.verify_after_write = enabled;
        self
    }

    /// Refuse bundles with more than `max` chunks.
    pub fn with_max_chunks(mut self, max: usize) -> Self {
        self.max_chunks = max;
        self
    }

    /// Verify, store, and commit a submitted bundle.
    pub async fn commit(&self, bundle: UploadBundle) -> ZkvResult<UploadRecord> {
        if bundle.chunks.len() > self.max_chunks {
            return Err(ZkvError::protocol(format!(
                "{} chunks exceeds the limit of {}",
                bundle.chunks.len(),
                self.max_chunks
            )));
        }
        verify_bundle(&bundle)?;

        let UploadBundle {
            metadata,
            file_hash,
            chunk_hashes,
            mut chunks,
        } = bundle;
        chunks.sort_by_key(|c| c.index);
        let id = Uuid::new_v4();

        debug!(%id, stage = %UploadStage::Transmitting, chunks = chunks.len());
        let stored = self.transmit(&metadata.filename, chunks, &chunk_hashes).await?;

        debug!(%id, stage = %UploadStage::Verifying);
        if let Err(e) = self.verify_stored(&stored, &file_hash).await {
            error!(
                %id,
                stage = %UploadStage::Failed,
                error = %e,
                "stored chunks failed verification"
            );
            self.rollback(&stored).await;
            return Err(e);
        }

        let record = UploadRecord {
            id,
            filename: metadata.filename,
            mime: metadata.mime,
            size: metadata.size,
            file_hash,
            chunks: stored,
            created_at: unix_now(),
        };

        if let Err(e) = self.metadata.insert(record.clone()) {
            error!(%id, stage = %UploadStage::Failed, error = %e, "metadata insert failed");
            self.rollback(&record.chunks).await;
            return Err(e);
        }

        info!(
            %id,
            stage = %UploadStage::Committed,
            filename = %record.filename,
            size = record.size,
            chunks = record.chunks.len(),
            "upload committed"
        );
        Ok(record)
    }

    /// Send every chunk to its backend concurrently. On any failure the
    /// chunks that did land are removed again.
    async fn transmit(
        &self,
        filename: &str,
        chunks: Vec<ChunkPayload>,
        hashes: &[String],
    ) -> ZkvResult<Vec<ChunkDescriptor>> {
        let puts = chunks.into_iter().map(|chunk| async move {
            let size = chunk.bytes.len() as u64;
            let result = self.pool.put(chunk.index, chunk.bytes).await;
            (chunk.index, size, result)
        });
        let results = join_all(puts).await;

        let mut descriptors = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (index, size, result) in results {
            match result {
                Ok(StoredBlob { backend, key, url }) => descriptors.push(ChunkDescriptor {
                    index,
                    key,
                    url,
                    backend,
                    name: zkv_chunks::chunk_name(filename, index),
                    size,
                    hash: hashes[index as usize].clone(),
                }),
                Err(e) => {
                    warn!(index, error = %e, "chunk transmission failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            self.rollback(&descriptors).await;
            return Err(e);
        }
        descriptors.sort_by_key(|d| d.index);
        Ok(descriptors)
    }

    async fn verify_stored(&self, stored: &[ChunkDescriptor], file_hash: &str) -> ZkvResult<()> {
        let ordered = stored.iter().enumerate().all(|(i, d)| d.index as usize == i);
        if !ordered {
            return Err(ZkvError::integrity("stored chunk set has gaps"));
        }
        let hashes: Vec<&str> = stored.iter().map(|d| d.hash.as_str()).collect();
        verify_file_hash(&hashes, file_hash)?;

        if self.verify_after_write {
            let reads = stored.iter().map(|d| async move {
                let bytes = self.pool.fetch(&d.url).await?;
                verify_chunk(&bytes, &d.hash)
            });
            for result in join_all(reads).await {
                result?;
            }
        }
        Ok(())
    }

    /// Best-effort removal of blobs that belong to no committed record.
    async fn rollback(&self, written: &[ChunkDescriptor]) {
        let deletes = written
            .iter()
            .map(|d| async move { (d, self.pool.delete(&d.backend, &d.key).await) });
        for (d, result) in join_all(deletes).await {
            if let Err(e) = result {
                warn!(backend = %d.backend, key = %d.key, error = %e, "rollback delete failed");
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> ZkvResult<Option<UploadRecord>> {
        self.metadata.get(id)
    }

    pub fn list(&self) -> ZkvResult<Vec<UploadRecord>> {
        self.metadata.list()
    }

    /// Stored bytes of chunk `index` of upload `id`, exactly as written.
    pub async fn fetch_chunk(&self, id: &Uuid, index: u32) -> ZkvResult<Vec<u8>> {
        let record = self
            .metadata
            .get(id)?
            .ok_or_else(|| ZkvError::not_found(format!("no upload {id}")))?;
        let descriptor = record
            .chunks
            .iter()
            .find(|c| c.index == index)
            .ok_or_else(|| ZkvError::not_found(format!("upload {id} has no chunk {index}")))?;
        self.pool.fetch(&descriptor.url).await
    }

    /// Remove every remote chunk, then the record.
    ///
    /// Returns `Ok(false)` for an unknown id. If any chunk delete fails the
    /// record is kept so the delete can be retried.
    pub async fn delete(&self, id: &Uuid) -> ZkvResult<bool> {
        let Some(record) = self.metadata.get(id)? else {
            return Ok(false);
        };

        let deletes = record
            .chunks
            .iter()
            .map(|d| self.pool.delete(&d.backend, &d.key));
        for result in join_all(deletes).await {
            result?;
        }

        self.metadata.delete(id)?;
        info!(%id, chunks = record.chunks.len(), "upload deleted");
        Ok(true)
    }
}
