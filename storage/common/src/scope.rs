use std::future::Future;
use std::time::Duration;

use tessera_core::StorageError;
use tokio_util::sync::CancellationToken;

/// Bounds a single storage operation by the command timeout and an optional cancellation token.
#[derive(Debug, Clone)]
pub struct OperationScope {
    timeout: Duration,
    token: Option<CancellationToken>,
}

impl OperationScope {
    pub fn new(timeout: Duration) -> Self { Self { timeout, token: None } }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn timeout(&self) -> Duration { self.timeout }

    pub fn token(&self) -> Option<&CancellationToken> { self.token.as_ref() }

    /// Run `operation`. Dropping the future on timeout or cancellation is what aborts the
    /// in-flight statement; drivers interrupt the database when their work is dropped.
    pub async fn run<F, T>(&self, operation: F) -> Result<T, StorageError>
    where F: Future<Output = Result<T, StorageError>> {
        let timed = tokio::time::timeout(self.timeout, operation);
        let outcome = match &self.token {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(StorageError::Cancelled),
                outcome = timed => outcome,
            },
            None => timed.await,
        };
        outcome.map_err(|_| StorageError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_result_through() -> anyhow::Result<()> {
        let scope = OperationScope::new(Duration::from_secs(1));
        assert_eq!(scope.run(async { Ok::<_, StorageError>(5) }).await?, 5);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let scope = OperationScope::new(Duration::from_millis(50));
        let err = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, StorageError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_cancelled_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let scope = OperationScope::new(Duration::from_secs(1)).with_token(token);
        let err = scope.run(async { Ok::<_, StorageError>(1) }).await.unwrap_err();
        assert!(matches!(err, StorageError::Cancelled));
        assert!(err.is_cancellation());
    }
}
