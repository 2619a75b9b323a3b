//! OpenDAL Operator factory for zkvault blob backends

use anyhow::{Context, Result};
use opendal::Operator;
use std::path::Path;
use zkv_core::config::{expand_tilde, BackendConfig, BackendKind};

/// Build an OpenDAL Operator for one configured backend.
///
/// For S3, a plaintext `http://` endpoint is an error when `enforce_tls` is
/// set and a warning otherwise. S3 uses path-style addressing (the opendal
/// 0.55 default), which SeaweedFS and MinIO require.
pub fn build_operator(cfg: &BackendConfig) -> Result<Operator> {
    let op = match cfg.kind {
        BackendKind::S3 => {
            check_tls(cfg)?;
            // opendal 0.55: builders use the consuming pattern
            let mut builder = opendal::services::S3::default()
                .endpoint(&cfg.endpoint)
                .region(&cfg.region)
                .bucket(&cfg.bucket)
                .root(&cfg.root);
            if let Some(id) = &cfg.access_key_id {
                builder = builder.access_key_id(id);
            }
            if let Some(secret) = &cfg.secret_access_key {
                builder = builder.secret_access_key(secret);
            }
            Operator::new(builder)
                .with_context(|| format!("creating S3 operator for backend {}", cfg.name))?
                .layer(opendal::layers::LoggingLayer::default())
                .layer(
                    opendal::layers::RetryLayer::new()
                        .with_max_times(5)
                        .with_jitter(),
                )
                .finish()
        }
        BackendKind::Fs => {
            let root = expand_tilde(Path::new(&cfg.root));
            let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
            Operator::new(builder)
                .with_context(|| format!("creating fs operator for backend {}", cfg.name))?
                .layer(opendal::layers::LoggingLayer::default())
                .finish()
        }
        BackendKind::Memory => memory_operator()?,
    };

    tracing::debug!(backend = %cfg.name, kind = ?cfg.kind, "built storage operator");
    Ok(op)
}

/// A process-local in-memory operator. Contents vanish with the process.
pub fn memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating memory operator")?
        .finish())
}

fn check_tls(cfg: &BackendConfig) -> Result<()> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            anyhow::bail!(
                "backend {} uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set enforce_tls = false for local development.",
                cfg.name,
                cfg.endpoint
            );
        }
        tracing::warn!(
            backend = %cfg.name,
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }
    Ok(())
}
