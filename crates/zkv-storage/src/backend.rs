//! Named blob backends and the pool that spreads chunks across them
//!
//! Chunk `i` of an upload goes to backend `i mod N`. Every backend call is
//! bounded by the configured request timeout; a call that overruns is a
//! transport error.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use opendal::{ErrorKind, Operator};
use tracing::{debug, warn};
use uuid::Uuid;
use zkv_core::config::{BackendConfig, StorageConfig};
use zkv_core::{ZkvError, ZkvResult};

use crate::health::is_healthy;
use crate::operator::build_operator;

/// Where a blob landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub backend: String,
    pub key: String,
    pub url: String,
}

/// One independent blob store.
#[derive(Clone)]
pub struct Backend {
    name: String,
    url_base: String,
    op: Operator,
    timeout: Duration,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("url_base", &self.url_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Backend {
    pub fn new(
        name: impl Into<String>,
        url_base: impl Into<String>,
        op: Operator,
        timeout: Duration,
    ) -> Self {
        let url_base: String = url_base.into();
        Self {
            name: name.into(),
            url_base: url_base.trim_end_matches('/').to_string(),
            op,
            timeout,
        }
    }

    pub fn from_config(cfg: &BackendConfig, timeout: Duration) -> anyhow::Result<Self> {
        let op = build_operator(cfg)?;
        Ok(Self::new(&cfg.name, cfg.resolved_url_base(), op, timeout))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url_base(&self) -> &str {
        &self.url_base
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.url_base, key)
    }

    /// The key this backend stores under `url`, if the URL belongs here.
    pub fn key_for_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let rest = url.strip_prefix(self.url_base.as_str())?;
        let key = rest.strip_prefix('/')?;
        (!key.is_empty()).then_some(key)
    }

    /// Store `bytes` under a fresh random key.
    pub async fn put(&self, bytes: Vec<u8>) -> ZkvResult<StoredBlob> {
        let key = Uuid::new_v4().simple().to_string();
        let size = bytes.len();
        self.bounded("put", &key, self.op.write(&key, bytes)).await?;
        debug!(backend = %self.name, key = %key, size, "blob stored");
        Ok(StoredBlob {
            backend: self.name.clone(),
            url: self.url_for(&key),
            key,
        })
    }

    pub async fn read(&self, key: &str) -> ZkvResult<Vec<u8>> {
        let buf = self.bounded("read", key, self.op.read(key)).await?;
        Ok(buf.to_vec())
    }

    pub async fn delete(&self, key: &str) -> ZkvResult<()> {
        self.bounded("delete", key, self.op.delete(key)).await?;
        debug!(backend = %self.name, key = %key, "blob deleted");
        Ok(())
    }

    pub async fn is_healthy(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, is_healthy(&self.op)).await,
            Ok(true)
        )
    }

    async fn bounded<T, F>(&self, action: &str, key: &str, fut: F) -> ZkvResult<T>
    where
        F: Future<Output = opendal::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => Err(ZkvError::storage(format!(
                "{action} {}/{key}: not found",
                self.name
            ))),
            Ok(Err(e)) => Err(ZkvError::transport(format!(
                "{action} {}/{key}: {e}",
                self.name
            ))),
            Err(_) => {
                warn!(
                    backend = %self.name,
                    key = %key,
                    action,
                    timeout = ?self.timeout,
                    "backend call timed out"
                );
                Err(ZkvError::transport(format!(
                    "{action} {}/{key}: timed out after {:?}",
                    self.name, self.timeout
                )))
            }
        }
    }
}

/// A fixed, ordered set of independent backends.
#[derive(Debug, Clone)]
pub struct BackendPool {
    backends: Vec<Backend>,
}

impl BackendPool {
    pub fn new(backends: Vec<Backend>) -> ZkvResult<Self> {
        if backends.is_empty() {
            return Err(ZkvError::Config("backend pool needs at least one backend".into()));
        }
        Ok(Self { backends })
    }

    /// Build every configured backend.
    pub fn from_config(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(cfg.request_timeout_secs);
        let backends = cfg
            .backends
            .iter()
            .map(|b| Backend::from_config(b, timeout))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::new(backends).context("building backend pool")
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Backend responsible for chunk `index`.
    pub fn for_index(&self, index: u32) -> &Backend {
        &self.backends[index as usize % self.backends.len()]
    }

    pub fn by_name(&self, name: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Store chunk `index` on its backend.
    pub async fn put(&self, index: u32, bytes: Vec<u8>) -> ZkvResult<StoredBlob> {
        self.for_index(index).put(bytes).await
    }

    /// Fetch a blob by the URL recorded in its chunk descriptor.
    pub async fn fetch(&self, url: &str) -> ZkvResult<Vec<u8>> {
        for backend in &self.backends {
            if let Some(key) = backend.key_for_url(url) {
                return backend.read(key).await;
            }
        }
        Err(ZkvError::storage(format!("no backend serves {url}")))
    }

    pub async fn delete(&self, backend: &str, key: &str) -> ZkvResult<()> {
        let b = self
            .by_name(backend)
            .ok_or_else(|| ZkvError::storage(format!("unknown backend: {backend}")))?;
        b.delete(key).await
    }

    /// Health of every backend, in pool order.
    pub async fn health(&self) -> Vec<(String, bool)> {
        let checks = self.backends.iter().map(|b| async move {
            let ok = b.is_healthy().await;
            (b.name.clone(), ok)
        });
        futures::future::join_all(checks).await
    }
}
