use std::{future::Future, time::Duration};

/// Runs `fut` under a deadline; an elapsed deadline becomes an error naming `what`.
pub async fn within<T, F>(limit: Duration, what: &'static str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(anyhow::anyhow!("{} timed out after {:?}", what, limit)),
    }
}
