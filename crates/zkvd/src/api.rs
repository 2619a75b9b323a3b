//! HTTP API: authentication and file routes
//!
//! Every `/files` route and the passphrase change require
//! `Authorization: Bearer <session token>`. Protocol integers travel as
//! decimal strings; upload bodies are multipart with one `chunk-{index}`
//! part per sealed chunk.

use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;
use zkv_core::api::{
    parse_chunk_part_name, Ack, ChangePassphraseRequest, CommitRequest, CommitResponse,
    RegisterRequest, RegistrationStatus, RespondRequest, RespondResponse, SessionStatus,
    UploadResponse, PART_CHUNK_HASHES, PART_FILE_HASH, PART_METADATA,
};
use zkv_core::types::{FileMetadata, UploadRecord};
use zkv_core::{AuthFailure, ZkvError, ZkvResult};
use zkv_transfer::{ChunkPayload, UploadBundle};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let upload_limit = state.max_upload_bytes;
    Router::new()
        .route("/auth/status", get(auth_status))
        .route("/auth/register", post(register))
        .route("/auth/login/commit", post(login_commit))
        .route("/auth/login/respond", post(login_respond))
        .route("/auth/session", get(session_status))
        .route("/auth/logout", post(logout))
        .route("/auth/passphrase", post(change_passphrase))
        .route(
            "/files",
            get(list_files)
                .post(upload)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files/{id}", get(get_file).delete(delete_file))
        .route("/files/{id}/chunks/{index}", get(fetch_chunk))
        .with_state(state)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// A request carrying a live session token.
pub struct Authenticated(pub String);

impl FromRequestParts<SharedState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(&parts.headers)
            .ok_or(ZkvError::Auth(AuthFailure::InvalidSession))?
            .to_string();
        state.auth.require_session(&token)?;
        Ok(Authenticated(token))
    }
}

/// Run a modpow-heavy auth step off the async workers.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ZkvResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(ZkvError::Other(anyhow::anyhow!("auth task: {e}"))))?
        .map_err(ApiError)
}

// ── Auth ─────────────────────────────────────────────────────────────────

async fn auth_status(State(state): State<SharedState>) -> ApiResult<Json<RegistrationStatus>> {
    Ok(Json(RegistrationStatus {
        registered: state.auth.is_registered()?,
    }))
}

async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<Ack>> {
    let auth = state.auth.clone();
    blocking(move || auth.register(&req.public_key)).await?;
    Ok(Json(Ack::ok()))
}

async fn login_commit(
    State(state): State<SharedState>,
    Json(req): Json<CommitRequest>,
) -> ApiResult<Json<CommitResponse>> {
    let issued = state.auth.login_step1(&req.commitment)?;
    Ok(Json(CommitResponse {
        success: true,
        challenge: Some(issued.challenge),
        session_id: Some(issued.session_id),
        error: None,
    }))
}

async fn login_respond(
    State(state): State<SharedState>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Json<RespondResponse>> {
    let auth = state.auth.clone();
    let result = blocking(move || auth.login_step2(&req.session_id, &req.response)).await;
    let outcome = match &result {
        Ok(_) => "success",
        Err(ApiError(ZkvError::Auth(_))) => "rejected",
        Err(ApiError(e)) => e.kind(),
    };
    state.metrics.login(outcome);

    Ok(Json(RespondResponse {
        success: true,
        session_token: Some(result?),
        error: None,
    }))
}

async fn session_status(State(state): State<SharedState>, headers: HeaderMap) -> Json<SessionStatus> {
    let valid = bearer(&headers).is_some_and(|t| state.auth.verify_session(t));
    Json(SessionStatus { valid })
}

async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> Json<Ack> {
    let ended = bearer(&headers).is_some_and(|t| state.auth.logout(t));
    Json(Ack {
        success: ended,
        error: None,
    })
}

async fn change_passphrase(
    State(state): State<SharedState>,
    Authenticated(token): Authenticated,
    Json(req): Json<ChangePassphraseRequest>,
) -> ApiResult<Json<Ack>> {
    let auth = state.auth.clone();
    blocking(move || auth.change_passphrase(&token, &req.public_key)).await?;
    Ok(Json(Ack::ok()))
}

// ── Files ────────────────────────────────────────────────────────────────

async fn upload(
    State(state): State<SharedState>,
    _auth: Authenticated,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let result = match read_bundle(multipart).await {
        Ok(bundle) => state.ingestor.commit(bundle).await.map_err(ApiError),
        Err(e) => Err(e),
    };
    match &result {
        Ok(_) => state.metrics.upload("committed"),
        Err(ApiError(e)) => {
            if matches!(e, ZkvError::Integrity(_)) {
                state.metrics.integrity_failure();
            }
            state.metrics.upload(e.kind());
        }
    }

    let record = result?;
    Ok(Json(UploadResponse {
        success: true,
        id: Some(record.id),
        error: None,
    }))
}

/// Parse the multipart upload into a bundle. Part names are decoded here and
/// nowhere else; chunk indices are integers from this point on.
async fn read_bundle(mut multipart: Multipart) -> ApiResult<UploadBundle> {
    let mut metadata: Option<FileMetadata> = None;
    let mut file_hash: Option<String> = None;
    let mut chunk_hashes: Option<Vec<String>> = None;
    let mut chunks = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            PART_METADATA => {
                let bytes = field.bytes().await?;
                metadata = Some(
                    serde_json::from_slice(&bytes)
                        .map_err(|e| ZkvError::protocol(format!("metadata part: {e}")))?,
                );
            }
            PART_FILE_HASH => file_hash = Some(field.text().await?.trim().to_string()),
            PART_CHUNK_HASHES => {
                let bytes = field.bytes().await?;
                chunk_hashes = Some(
                    serde_json::from_slice(&bytes)
                        .map_err(|e| ZkvError::protocol(format!("chunkHashes part: {e}")))?,
                );
            }
            other => {
                let index = parse_chunk_part_name(other)
                    .and_then(|i| u32::try_from(i).ok())
                    .ok_or_else(|| ZkvError::protocol(format!("unexpected part {other:?}")))?;
                let bytes = field.bytes().await?.to_vec();
                chunks.push(ChunkPayload { index, bytes });
            }
        }
    }

    let missing = |part: &str| ZkvError::protocol(format!("missing {part} part"));
    Ok(UploadBundle {
        metadata: metadata.ok_or_else(|| missing(PART_METADATA))?,
        file_hash: file_hash.ok_or_else(|| missing(PART_FILE_HASH))?,
        chunk_hashes: chunk_hashes.ok_or_else(|| missing(PART_CHUNK_HASHES))?,
        chunks,
    })
}

async fn list_files(
    State(state): State<SharedState>,
    _auth: Authenticated,
) -> ApiResult<Json<Vec<UploadRecord>>> {
    Ok(Json(state.ingestor.list()?))
}

async fn get_file(
    State(state): State<SharedState>,
    _auth: Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UploadRecord>> {
    let record = state
        .ingestor
        .get(&id)?
        .ok_or_else(|| ZkvError::not_found(format!("no upload {id}")))?;
    Ok(Json(record))
}

async fn fetch_chunk(
    State(state): State<SharedState>,
    _auth: Authenticated,
    Path((id, index)): Path<(Uuid, u32)>,
) -> ApiResult<Response> {
    let result = state.ingestor.fetch_chunk(&id, index).await;
    state.metrics.chunk_fetch(match &result {
        Ok(_) => "served",
        Err(e) => e.kind(),
    });
    let bytes = result?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

async fn delete_file(
    State(state): State<SharedState>,
    _auth: Authenticated,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Ack>> {
    if !state.ingestor.delete(&id).await? {
        return Err(ZkvError::not_found(format!("no upload {id}")).into());
    }
    info!(%id, "upload removed via API");
    Ok(Json(Ack::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use prometheus_client::registry::Registry;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use zkv_auth::AuthService;
    use zkv_core::api::chunk_part_name;
    use zkv_crypto::{decrypt_chunk, parse_decimal, to_decimal, Prover};
    use zkv_storage::{memory_operator, Backend, BackendPool, MemoryMetadataStore, MetadataStore};
    use zkv_transfer::{prepare_upload, Ingestor};

    use crate::metrics::DaemonMetrics;
    use crate::state::AppState;

    const BOUNDARY: &str = "zkv-test-boundary-5f1c9e";

    fn app_with_limit(max_upload_bytes: usize) -> Router {
        let backends = (0..3)
            .map(|i| {
                Backend::new(
                    format!("mem-{i}"),
                    format!("memory://mem-{i}"),
                    memory_operator().unwrap(),
                    Duration::from_secs(5),
                )
            })
            .collect();
        let pool = Arc::new(BackendPool::new(backends).unwrap());
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let auth = Arc::new(AuthService::in_memory(
            metadata.clone(),
            Duration::from_secs(60),
            Duration::from_secs(600),
        ));
        let mut registry = Registry::default();
        let state = Arc::new(AppState {
            auth,
            ingestor: Ingestor::new(pool, metadata).with_max_chunks(16),
            metrics: DaemonMetrics::new(&mut registry),
            max_upload_bytes,
        });
        router(state)
    }

    fn app() -> Router {
        app_with_limit(1024 * 1024)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, req).await;
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    fn json_req(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn public_key(passphrase: &str) -> String {
        let prover = Prover::new(&SecretString::from(passphrase.to_string()));
        to_decimal(&prover.public_key().unwrap())
    }

    async fn register(app: &Router, passphrase: &str) -> StatusCode {
        let body = json!({ "publicKey": public_key(passphrase) });
        send_json(app, json_req(Method::POST, "/auth/register", None, body))
            .await
            .0
    }

    /// Run both login moves; returns the status of the second and the token.
    async fn login(app: &Router, passphrase: &str) -> (StatusCode, Option<String>) {
        let prover = Prover::new(&SecretString::from(passphrase.to_string()));
        let commitment = prover.commit().unwrap();
        let body = json!({ "commitment": to_decimal(commitment.value()) });
        let (status, resp) =
            send_json(app, json_req(Method::POST, "/auth/login/commit", None, body)).await;
        assert_eq!(status, StatusCode::OK, "{resp}");
        let challenge = parse_decimal(resp["challenge"].as_str().unwrap()).unwrap();
        let session_id = resp["sessionId"].as_str().unwrap().to_string();

        let b = prover.respond(commitment, &challenge).unwrap();
        let body = json!({ "sessionId": session_id, "response": to_decimal(&b) });
        let (status, resp) =
            send_json(app, json_req(Method::POST, "/auth/login/respond", None, body)).await;
        let token = resp["sessionToken"].as_str().map(str::to_string);
        (status, token)
    }

    fn multipart_request(bundle: &UploadBundle, token: &str) -> Request<Body> {
        let mut body = Vec::new();
        let mut part = |name: &str, bytes: &[u8]| {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        };
        part(
            PART_METADATA,
            serde_json::to_string(&bundle.metadata).unwrap().as_bytes(),
        );
        part(PART_FILE_HASH, bundle.file_hash.as_bytes());
        part(
            PART_CHUNK_HASHES,
            serde_json::to_string(&bundle.chunk_hashes).unwrap().as_bytes(),
        );
        for chunk in &bundle.chunks {
            part(&chunk_part_name(chunk.index as usize), &chunk.bytes);
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::post("/files")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn register_then_login_lifecycle() {
        let app = app();

        let (_, reg) = send_json(&app, get_req("/auth/status", None)).await;
        assert_eq!(reg["registered"], false);

        assert_eq!(register(&app, "correct-horse").await, StatusCode::OK);
        assert_eq!(register(&app, "other").await, StatusCode::CONFLICT);
        let (_, reg) = send_json(&app, get_req("/auth/status", None)).await;
        assert_eq!(reg["registered"], true);

        let (status, token) = login(&app, "correct-horse").await;
        assert_eq!(status, StatusCode::OK);
        let token = token.unwrap();

        let (_, session) = send_json(&app, get_req("/auth/session", Some(&token))).await;
        assert_eq!(session["valid"], true);
        let (status, _) = send(&app, get_req("/files", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, ack) = send_json(
            &app,
            json_req(Method::POST, "/auth/logout", Some(&token), json!({})),
        )
        .await;
        assert_eq!(ack["success"], true);
        let (_, session) = send_json(&app, get_req("/auth/session", Some(&token))).await;
        assert_eq!(session["valid"], false);
        let (status, _) = send(&app, get_req("/files", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_passphrase_gets_generic_refusal() {
        let app = app();
        register(&app, "alpha12345").await;

        let (status, token) = login(&app, "beta67890").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn login_before_registration_is_refused() {
        let app = app();
        let body = json!({ "commitment": "12345" });
        let (status, resp) =
            send_json(&app, json_req(Method::POST, "/auth/login/commit", None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(resp["success"], false);
        assert_eq!(resp["error"], "authentication failed");
    }

    #[tokio::test]
    async fn malformed_integers_are_bad_requests() {
        let app = app();
        let body = json!({ "publicKey": "0x1234" });
        let (status, _) =
            send_json(&app, json_req(Method::POST, "/auth/register", None, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn passphrase_change_ends_sessions() {
        let app = app();
        register(&app, "first-pass").await;
        let (_, token) = login(&app, "first-pass").await;
        let token = token.unwrap();

        let body = json!({ "publicKey": public_key("second-pass") });
        let (status, _) = send_json(
            &app,
            json_req(Method::POST, "/auth/passphrase", Some(&token), body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, session) = send_json(&app, get_req("/auth/session", Some(&token))).await;
        assert_eq!(session["valid"], false);
        assert_eq!(login(&app, "first-pass").await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(login(&app, "second-pass").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_fetch_delete_over_http() {
        let app = app();
        register(&app, "correct-horse").await;
        let token = login(&app, "correct-horse").await.1.unwrap();

        let data = b"chunked and sealed before it ever leaves the client".to_vec();
        let prepared = prepare_upload("note.txt", "text/plain", &data, 3).unwrap();
        let (status, resp) = send_json(&app, multipart_request(&prepared.bundle, &token)).await;
        assert_eq!(status, StatusCode::OK, "{resp}");
        let id = resp["id"].as_str().unwrap().to_string();

        let (status, record) = send_json(&app, get_req(&format!("/files/{id}"), Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["filename"], "note.txt");
        assert_eq!(record["chunks"].as_array().unwrap().len(), 3);

        let mut plain = Vec::new();
        for i in 0..3u32 {
            let (status, stored) =
                send(&app, get_req(&format!("/files/{id}/chunks/{i}"), Some(&token))).await;
            assert_eq!(status, StatusCode::OK);
            plain.extend(decrypt_chunk(&prepared.key, i, &stored).unwrap());
        }
        assert_eq!(plain, data);

        let (status, _) =
            send(&app, get_req(&format!("/files/{id}/chunks/7"), Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let delete = Request::delete(format!("/files/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, delete).await.0, StatusCode::OK);
        let (status, _) = send(&app, get_req(&format!("/files/{id}"), Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_requires_session() {
        let app = app();
        let prepared = prepare_upload("a", "text/plain", b"abc", 1).unwrap();
        let (status, _) = send(&app, multipart_request(&prepared.bundle, "not-a-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tampered_upload_is_unprocessable() {
        let app = app();
        register(&app, "correct-horse").await;
        let token = login(&app, "correct-horse").await.1.unwrap();

        let mut bundle = prepare_upload("a.bin", "application/octet-stream", &[7u8; 300], 3)
            .unwrap()
            .bundle;
        bundle.chunks[1].bytes[20] ^= 0x01;
        let (status, resp) = send_json(&app, multipart_request(&bundle, &token)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(resp["success"], false);

        let (_, list) = send_json(&app, get_req("/files", Some(&token))).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let app = app_with_limit(512);
        register(&app, "correct-horse").await;
        let token = login(&app, "correct-horse").await.1.unwrap();

        let bundle = prepare_upload("big.bin", "application/octet-stream", &[1u8; 4096], 2)
            .unwrap()
            .bundle;
        let (status, _) = send(&app, multipart_request(&bundle, &token)).await;
        assert!(status.is_client_error(), "got {status}");
    }
}
