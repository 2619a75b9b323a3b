//! Daemon lifecycle: storage wiring, background sweep, HTTP servers, shutdown

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use zkv_auth::AuthService;
use zkv_core::config::{expand_tilde, ZkvConfig};
use zkv_storage::{BackendPool, JsonMetadataStore, MetadataStore};
use zkv_transfer::Ingestor;

use crate::metrics::{DaemonMetrics, HealthState};
use crate::state::AppState;

pub async fn run(config: ZkvConfig) -> Result<()> {
    info!("daemon starting");

    // ── Blob backends ────────────────────────────────────────────────────
    let pool = Arc::new(
        BackendPool::from_config(&config.storage).context("building backend pool")?,
    );
    for (name, ok) in pool.health().await {
        if ok {
            info!(backend = %name, "backend: connected");
        } else {
            warn!(backend = %name, "backend: unreachable (uploads touching it will fail)");
        }
    }

    // ── Metadata + identity ──────────────────────────────────────────────
    let metadata_path = expand_tilde(&config.storage.metadata_path);
    let metadata: Arc<dyn MetadataStore> = Arc::new(
        JsonMetadataStore::open(&metadata_path)
            .with_context(|| format!("opening metadata store: {}", metadata_path.display()))?,
    );
    info!(path = %metadata_path.display(), uploads = metadata.list()?.len(), "metadata loaded");

    let auth = Arc::new(AuthService::in_memory(
        metadata.clone(),
        Duration::from_secs(config.auth.challenge_ttl_secs),
        Duration::from_secs(config.auth.session_ttl_secs),
    ));
    info!(registered = auth.is_registered()?, "auth ready");

    let ingestor = Ingestor::new(pool.clone(), metadata)
        .with_verify_after_write(config.storage.verify_after_write)
        .with_max_chunks(config.transfer.max_chunk_count);

    // ── Metrics ──────────────────────────────────────────────────────────
    let mut registry = Registry::default();
    let metrics = DaemonMetrics::new(&mut registry);
    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let health = HealthState {
            registry: Arc::new(registry),
            pool: pool.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, health).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    let sweeper = tokio::spawn(sweep_loop(
        auth.clone(),
        metrics.clone(),
        Duration::from_secs(config.auth.sweep_interval_secs.max(1)),
    ));

    // ── API server ───────────────────────────────────────────────────────
    let state = Arc::new(AppState {
        auth,
        ingestor,
        metrics,
        max_upload_bytes: usize::try_from(config.daemon.max_upload_bytes).unwrap_or(usize::MAX),
    });

    let listener = tokio::net::TcpListener::bind(&config.daemon.listen)
        .await
        .with_context(|| format!("binding {}", config.daemon.listen))?;
    info!(addr = %config.daemon.listen, "API: listening");

    notify_ready();

    let served = axum::serve(listener, crate::api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();
    served.context("API server")?;

    info!("zkvd stopped");
    Ok(())
}

/// Periodically drop expired challenges and sessions.
async fn sweep_loop(auth: Arc<AuthService>, metrics: DaemonMetrics, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let stats = auth.sweep();
        if stats.challenges_removed + stats.sessions_removed > 0 {
            debug!(
                challenges = stats.challenges_removed,
                sessions = stats.sessions_removed,
                "expired entries swept"
            );
        }
        metrics.set_live(auth.live_challenges(), auth.live_sessions());
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("registering Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("registering SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, draining"),
        _ = terminate => info!("SIGTERM received, draining"),
    }
}

fn notify_ready() {
    // sd_notify(READY=1) when started by systemd; no-op without $NOTIFY_SOCKET
    #[cfg(unix)]
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}
