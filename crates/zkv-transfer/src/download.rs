//! Download: fetch every chunk, check it against the record, decrypt, reassemble
//!
//! Fails closed: one bad chunk fails the whole download and no plaintext is
//! returned.

use std::future::Future;

use futures::future::try_join_all;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use zkv_core::types::{ChunkDescriptor, UploadRecord};
use zkv_core::{ZkvError, ZkvResult};
use zkv_crypto::{decrypt_chunk, verify_chunk, verify_file_hash, FileKey};
use zkv_storage::BackendPool;

use crate::stage::DownloadStage;

/// Source of stored chunk bytes.
pub trait ChunkFetcher: Send + Sync {
    fn fetch_chunk(
        &self,
        record: &UploadRecord,
        chunk: &ChunkDescriptor,
    ) -> impl Future<Output = ZkvResult<Vec<u8>>> + Send;
}

/// Direct access to the backends, by the URL in each descriptor.
impl ChunkFetcher for BackendPool {
    async fn fetch_chunk(
        &self,
        _record: &UploadRecord,
        chunk: &ChunkDescriptor,
    ) -> ZkvResult<Vec<u8>> {
        self.fetch(&chunk.url).await
    }
}

/// Fetch, verify, decrypt and reassemble `record` with `key`.
pub async fn download<F: ChunkFetcher>(
    fetcher: &F,
    record: &UploadRecord,
    key: &FileKey,
) -> ZkvResult<Vec<u8>> {
    let id = record.id;
    let result = run(fetcher, record, key).await;
    match &result {
        Ok(data) => info!(%id, stage = %DownloadStage::Done, bytes = data.len(), "downloaded"),
        Err(e) => warn!(%id, stage = %DownloadStage::Failed, error = %e, "download failed"),
    }
    result
}

async fn run<F: ChunkFetcher>(
    fetcher: &F,
    record: &UploadRecord,
    key: &FileKey,
) -> ZkvResult<Vec<u8>> {
    let id = record.id;

    debug!(%id, stage = %DownloadStage::FetchMetadata, chunks = record.chunks.len());
    let mut ordered = record.clone();
    ordered.chunks.sort_by_key(|d| d.index);
    if !ordered.is_well_ordered() {
        return Err(ZkvError::integrity(format!(
            "upload {id} chunk indices are not 0..{}",
            ordered.chunks.len()
        )));
    }
    verify_file_hash(&ordered.chunk_hashes(), &record.file_hash)?;
    let descriptors = &ordered.chunks;

    debug!(%id, stage = %DownloadStage::FetchChunks);
    let fetched = try_join_all(
        descriptors
            .iter()
            .map(|d| fetcher.fetch_chunk(record, d)),
    )
    .await?;

    debug!(%id, stage = %DownloadStage::VerifyPerChunk);
    for (d, bytes) in descriptors.iter().zip(&fetched) {
        verify_chunk(bytes, &d.hash)
            .map_err(|_| ZkvError::integrity(format!("chunk {} failed its hash check", d.index)))?;
    }

    debug!(%id, stage = %DownloadStage::Decrypt);
    let plain: Vec<Vec<u8>> = descriptors
        .par_iter()
        .zip(fetched.par_iter())
        .map(|(d, bytes)| decrypt_chunk(key, d.index, bytes))
        .collect::<ZkvResult<Vec<_>>>()?;

    debug!(%id, stage = %DownloadStage::Reassemble);
    let data = zkv_chunks::combine(&plain);
    if data.len() as u64 != record.size {
        return Err(ZkvError::integrity(format!(
            "reassembled {} bytes, record says {}",
            data.len(),
            record.size
        )));
    }
    Ok(data)
}
