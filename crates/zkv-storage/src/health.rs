//! Backend health check

use anyhow::Result;
use opendal::Operator;

/// Verify a backend is reachable by listing its root.
pub async fn check_health(op: &Operator) -> Result<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("storage health check failed: {e}"))
}

/// Returns true if the backend is reachable (non-panicking)
pub async fn is_healthy(op: &Operator) -> bool {
    check_health(op).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::memory_operator;

    #[tokio::test]
    async fn memory_backend_is_healthy() {
        let op = memory_operator().unwrap();
        check_health(&op).await.unwrap();
        assert!(is_healthy(&op).await);
    }
}
