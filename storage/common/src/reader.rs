//! Lazy, single-pass reads.
//!
//! Nothing touches the database until the returned stream is first polled. The first poll opens a
//! connection and runs the statement within the operation scope; rows then flow one at a time.

use std::future::Future;
use std::sync::Arc;

use futures::{future, stream, StreamExt, TryStreamExt};
use tessera_core::StorageError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::Command;
use crate::driver::{RowStream, SqlConnection};
use crate::scope::OperationScope;
use crate::types::TypeMap;

pub fn read_lazily<C, F, Fut>(connect: F, command: Command, scope: OperationScope, types: Arc<TypeMap>) -> RowStream
where
    C: SqlConnection,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<C, StorageError>> + Send + 'static,
{
    let projection = command.projection.clone();
    let token = scope.token().cloned();
    let opened = stream::once(async move {
        debug!("read_lazily: opening cursor for {}", command.sql);
        scope.run(async move { connect().await?.into_rows(command).await }).await
    })
    .try_flatten();
    let rows = opened.and_then(move |row| future::ready(types.coerce_row(row, &projection).map_err(StorageError::from)));
    cancellable(Box::pin(rows), token)
}

/// End `rows` with a [`StorageError::Cancelled`] item once `token` fires.
pub fn cancellable(rows: RowStream, token: Option<CancellationToken>) -> RowStream {
    let Some(token) = token else { return rows };
    Box::pin(stream::unfold(Some((rows, token)), |state| async move {
        let (mut rows, token) = state?;
        tokio::select! {
            biased;
            _ = token.cancelled() => Some((Err(StorageError::Cancelled), None)),
            next = rows.next() => next.map(|item| (item, Some((rows, token)))),
        }
    }))
}
