//! HTTP client for the zkvd API

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;
use zkv_core::api::{
    chunk_part_name, Ack, ChangePassphraseRequest, CommitRequest, CommitResponse,
    RegisterRequest, RegistrationStatus, RespondRequest, RespondResponse, SessionStatus,
    UploadResponse, PART_CHUNK_HASHES, PART_FILE_HASH, PART_METADATA,
};
use zkv_core::types::{ChunkDescriptor, UploadRecord};
use zkv_core::{AuthFailure, ZkvError, ZkvResult};
use zkv_transfer::{ChunkFetcher, UploadBundle};

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("building HTTP client: {e}"))?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, path: &str, builder: RequestBuilder) -> ZkvResult<reqwest::Response> {
        let resp = builder
            .send()
            .await
            .map_err(|e| ZkvError::transport(format!("{path}: {e}")))?;
        let status = resp.status();
        debug!(path, %status, "response");
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .json::<Ack>()
            .await
            .ok()
            .and_then(|ack| ack.error)
            .unwrap_or_else(|| status.to_string());
        Err(error_for_status(status, path, message))
    }

    async fn json<T: DeserializeOwned>(&self, path: &str, builder: RequestBuilder) -> ZkvResult<T> {
        self.send(path, builder)
            .await?
            .json()
            .await
            .map_err(|e| ZkvError::protocol(format!("{path}: malformed response: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ZkvResult<T> {
        self.json(path, self.request(Method::GET, path)).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ZkvResult<T> {
        self.json(path, self.request(Method::POST, path).json(body)).await
    }

    pub async fn is_registered(&self) -> ZkvResult<bool> {
        let status: RegistrationStatus = self.get_json("/auth/status").await?;
        Ok(status.registered)
    }

    pub async fn register(&self, public_key: &str) -> ZkvResult<()> {
        let req = RegisterRequest {
            public_key: public_key.to_string(),
        };
        let _: Ack = self.post_json("/auth/register", &req).await?;
        Ok(())
    }

    /// Send `V`; returns `(session_id, challenge)`.
    pub async fn login_commit(&self, commitment: &str) -> ZkvResult<(String, String)> {
        let req = CommitRequest {
            commitment: commitment.to_string(),
        };
        let resp: CommitResponse = self.post_json("/auth/login/commit", &req).await?;
        match (resp.session_id, resp.challenge) {
            (Some(sid), Some(c)) => Ok((sid, c)),
            _ => Err(ZkvError::protocol("commit response without challenge")),
        }
    }

    /// Send `b`; returns the session token.
    pub async fn login_respond(&self, session_id: &str, response: &str) -> ZkvResult<String> {
        let req = RespondRequest {
            session_id: session_id.to_string(),
            response: response.to_string(),
        };
        let resp: RespondResponse = self.post_json("/auth/login/respond", &req).await?;
        resp.session_token
            .ok_or_else(|| ZkvError::protocol("respond response without token"))
    }

    pub async fn verify_session(&self) -> ZkvResult<bool> {
        let status: SessionStatus = self.get_json("/auth/session").await?;
        Ok(status.valid)
    }

    pub async fn logout(&self) -> ZkvResult<bool> {
        let ack: Ack = self.post_json("/auth/logout", &serde_json::json!({})).await?;
        Ok(ack.success)
    }

    pub async fn change_passphrase(&self, public_key: &str) -> ZkvResult<()> {
        let req = ChangePassphraseRequest {
            public_key: public_key.to_string(),
        };
        let _: Ack = self.post_json("/auth/passphrase", &req).await?;
        Ok(())
    }

    pub async fn upload(&self, bundle: &UploadBundle) -> ZkvResult<Uuid> {
        let metadata = serde_json::to_string(&bundle.metadata)
            .map_err(|e| ZkvError::protocol(format!("encoding metadata: {e}")))?;
        let hashes = serde_json::to_string(&bundle.chunk_hashes)
            .map_err(|e| ZkvError::protocol(format!("encoding chunk hashes: {e}")))?;

        let mut form = Form::new()
            .text(PART_METADATA, metadata)
            .text(PART_FILE_HASH, bundle.file_hash.clone())
            .text(PART_CHUNK_HASHES, hashes);
        for chunk in &bundle.chunks {
            form = form.part(
                chunk_part_name(chunk.index as usize),
                Part::bytes(chunk.bytes.clone()),
            );
        }

        let path = "/files";
        let resp: UploadResponse = self
            .json(path, self.request(Method::POST, path).multipart(form))
            .await?;
        resp.id
            .ok_or_else(|| ZkvError::protocol("upload response without id"))
    }

    pub async fn list(&self) -> ZkvResult<Vec<UploadRecord>> {
        self.get_json("/files").await
    }

    pub async fn get(&self, id: &Uuid) -> ZkvResult<UploadRecord> {
        self.get_json(&format!("/files/{id}")).await
    }

    /// Stored bytes of one chunk, exactly as the server holds them.
    pub async fn get_chunk(&self, id: &Uuid, index: u32) -> ZkvResult<Vec<u8>> {
        let path = format!("/files/{id}/chunks/{index}");
        let resp = self.send(&path, self.request(Method::GET, &path)).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ZkvError::transport(format!("{path}: {e}")))?;
        Ok(bytes.to_vec())
    }

    pub async fn delete(&self, id: &Uuid) -> ZkvResult<()> {
        let path = format!("/files/{id}");
        let _: Ack = self.json(&path, self.request(Method::DELETE, &path)).await?;
        Ok(())
    }
}

impl ChunkFetcher for ApiClient {
    async fn fetch_chunk(
        &self,
        record: &UploadRecord,
        chunk: &ChunkDescriptor,
    ) -> ZkvResult<Vec<u8>> {
        self.get_chunk(&record.id, chunk.index).await
    }
}

/// Rebuild the server's error kind from an HTTP status.
pub fn error_for_status(status: StatusCode, path: &str, message: String) -> ZkvError {
    match status {
        StatusCode::BAD_REQUEST => ZkvError::Protocol(message),
        StatusCode::CONFLICT => AuthFailure::AlreadyRegistered.into(),
        StatusCode::UNAUTHORIZED if path.starts_with("/auth/login") => {
            AuthFailure::ProofRejected.into()
        }
        StatusCode::UNAUTHORIZED => AuthFailure::InvalidSession.into(),
        StatusCode::NOT_FOUND => ZkvError::NotFound(message),
        StatusCode::UNPROCESSABLE_ENTITY => ZkvError::Integrity(message),
        _ => ZkvError::transport(format!("{path}: server returned {status}: {message}")),
    }
}
