use futures::stream::{BoxStream, TryStreamExt};

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub distinct: bool,
    /// Also fetch the total number of matches, ignoring skip/take. Costs a second statement.
    pub with_total: bool,
}

impl QueryOptions {
    pub fn with_total() -> Self { Self { with_total: true, ..Self::default() } }
}

/// A lazy, single-pass sequence of query matches.
///
/// Rows are pulled from the database as the stream is polled; dropping the stream early releases
/// the underlying cursor and connection.
pub struct QueryResult<T> {
    pub items: BoxStream<'static, Result<T, StorageError>>,
    pub total: Option<u64>,
}

impl<T: Send + 'static> QueryResult<T> {
    pub fn new(items: BoxStream<'static, Result<T, StorageError>>, total: Option<u64>) -> Self { Self { items, total } }

    /// Drain the remaining items.
    pub async fn collect(self) -> Result<Vec<T>, StorageError> { self.items.try_collect().await }

    pub fn map<U, F>(self, f: F) -> QueryResult<U>
    where
        F: FnMut(T) -> Result<U, StorageError> + Send + 'static,
        U: Send + 'static,
    {
        let mut f = f;
        QueryResult { items: Box::pin(self.items.and_then(move |item| futures::future::ready(f(item)))), total: self.total }
    }
}

impl<T> std::fmt::Debug for QueryResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("QueryResult").field("total", &self.total).finish_non_exhaustive() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_map_and_collect() -> anyhow::Result<()> {
        let items = Box::pin(stream::iter(vec![Ok(1), Ok(2), Ok(3)]));
        let result = QueryResult::new(items, Some(3)).map(|i| Ok(i * 10));
        assert_eq!(result.total, Some(3));
        assert_eq!(result.collect().await?, vec![10, 20, 30]);
        Ok(())
    }

    #[tokio::test]
    async fn test_collect_stops_at_error() {
        let items = Box::pin(stream::iter(vec![Ok(1), Err(StorageError::failed("boom")), Ok(3)]));
        let err = QueryResult::new(items, None).collect().await.unwrap_err();
        assert!(matches!(err, StorageError::OperationFailed(_)));
    }
}
