//! zkv-transfer: moving encrypted files in and out of the vault
//!
//! ```text
//! client  prepare_upload : split → encrypt → hash            → UploadBundle + FileKey
//! server  Ingestor::commit: verify → transmit → verify → commit → UploadRecord
//! either  download        : fetch → verify → decrypt → reassemble
//! ```
//!
//! Chunk order travels as an explicit index from `split` to the stored
//! descriptor and back; completion order of concurrent chunk work never
//! matters.

pub mod download;
pub mod ingest;
pub mod share;
pub mod stage;
pub mod upload;

pub use download::{download, ChunkFetcher};
pub use ingest::Ingestor;
pub use share::ShareLink;
pub use stage::{DownloadStage, UploadStage};
pub use upload::{prepare_upload, verify_bundle, ChunkPayload, PreparedUpload, UploadBundle};
