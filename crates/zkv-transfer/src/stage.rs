//! Named stages of the upload and download state machines, used in logs

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Splitting,
    Encrypting,
    Hashing,
    Transmitting,
    Verifying,
    Committed,
    Failed,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Splitting => "splitting",
            UploadStage::Encrypting => "encrypting",
            UploadStage::Hashing => "hashing",
            UploadStage::Transmitting => "transmitting",
            UploadStage::Verifying => "verifying",
            UploadStage::Committed => "committed",
            UploadStage::Failed => "failed",
        }
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    FetchMetadata,
    FetchChunks,
    VerifyPerChunk,
    Decrypt,
    Reassemble,
    Done,
    Failed,
}

impl DownloadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStage::FetchMetadata => "fetch_metadata",
            DownloadStage::FetchChunks => "fetch_chunks",
            DownloadStage::VerifyPerChunk => "verify_per_chunk",
            DownloadStage::Decrypt => "decrypt",
            DownloadStage::Reassemble => "reassemble",
            DownloadStage::Done => "done",
            DownloadStage::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
