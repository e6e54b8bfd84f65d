//! Callback-to-async adapter.
//!
//! [`CallbackTableService`] is the shape of a client that reports completion
//! through a callback. [`Promisified`] wraps such a client and exposes each
//! operation as a single awaitable call with exactly one outcome.

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::batch::TableBatch;
use crate::entity::Entity;
use crate::errors::{Error, Result};
use crate::query::{ContinuationToken, QueryPage, TableQuery};
use crate::service::TableService;

/// Completion callback handed to a callback-style client.
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// A table client that completes each operation by invoking a callback once.
///
/// Errors are reported as the client sees them. In particular retrieving a
/// missing entity reports a 404 [`crate::ServiceError`].
pub trait CallbackTableService: Send + Sync {
    fn query_entities(
        &self,
        table: &str,
        query: Option<&TableQuery>,
        continuation_token: Option<&ContinuationToken>,
        callback: Callback<QueryPage>,
    );

    fn retrieve_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        callback: Callback<Entity>,
    );

    fn insert_entity(&self, table: &str, entity: &Entity, callback: Callback<Entity>);

    fn insert_or_replace_entity(&self, table: &str, entity: &Entity, callback: Callback<Entity>);

    fn replace_entity(&self, table: &str, entity: &Entity, callback: Callback<Entity>);

    fn delete_entity(&self, table: &str, entity: &Entity, callback: Callback<()>);

    fn create_table_if_not_exists(&self, table: &str, callback: Callback<bool>);

    fn does_table_exist(&self, table: &str, callback: Callback<bool>);

    fn execute_batch(&self, table: &str, batch: &TableBatch, callback: Callback<()>);
}

/// Start a callback-style operation and wait for its single completion.
///
/// Fails with [`Error::CallbackDropped`] if the client discards the callback
/// without calling it.
pub async fn promisify<T, F>(operation: &'static str, start: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Callback<T>),
{
    let (tx, rx) = oneshot::channel();
    start(Box::new(move |result| {
        // Receiver gone means the caller stopped waiting.
        let _ = tx.send(result);
    }));

    match rx.await {
        Ok(result) => result,
        Err(_) => Err(Error::CallbackDropped { operation }),
    }
}

/// Exposes a [`CallbackTableService`] as a [`TableService`].
#[derive(Debug, Clone, Default)]
pub struct Promisified<S> {
    inner: S,
}

impl<S: CallbackTableService> Promisified<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: CallbackTableService> TableService for Promisified<S> {
    async fn query_entities(
        &self,
        table: &str,
        query: Option<&TableQuery>,
        continuation_token: Option<&ContinuationToken>,
    ) -> Result<QueryPage> {
        promisify("query_entities", |cb| {
            self.inner
                .query_entities(table, query, continuation_token, cb)
        })
        .await
    }

    async fn retrieve_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>> {
        let result = promisify("retrieve_entity", |cb| {
            self.inner.retrieve_entity(table, partition_key, row_key, cb)
        })
        .await;

        match result {
            Ok(entity) => Ok(Some(entity)),
            Err(Error::Service(err)) if err.is_not_found() => {
                debug!(table, partition_key, row_key, "Entity not found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn insert_entity(&self, table: &str, entity: &Entity) -> Result<Entity> {
        promisify("insert_entity", |cb| {
            self.inner.insert_entity(table, entity, cb)
        })
        .await
    }

    async fn insert_or_replace_entity(&self, table: &str, entity: &Entity) -> Result<Entity> {
        promisify("insert_or_replace_entity", |cb| {
            self.inner.insert_or_replace_entity(table, entity, cb)
        })
        .await
    }

    async fn replace_entity(&self, table: &str, entity: &Entity) -> Result<Entity> {
        promisify("replace_entity", |cb| {
            self.inner.replace_entity(table, entity, cb)
        })
        .await
    }

    async fn delete_entity(&self, table: &str, entity: &Entity) -> Result<()> {
        promisify("delete_entity", |cb| {
            self.inner.delete_entity(table, entity, cb)
        })
        .await
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool> {
        promisify("create_table_if_not_exists", |cb| {
            self.inner.create_table_if_not_exists(table, cb)
        })
        .await
    }

    async fn does_table_exist(&self, table: &str) -> Result<bool> {
        promisify("does_table_exist", |cb| {
            self.inner.does_table_exist(table, cb)
        })
        .await
    }

    async fn execute_batch(&self, table: &str, batch: &TableBatch) -> Result<()> {
        promisify("execute_batch", |cb| {
            self.inner.execute_batch(table, batch, cb)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;

    #[tokio::test]
    async fn test_promisify_resolves_from_other_thread() {
        let value = promisify("spawned", |cb: Callback<u32>| {
            std::thread::spawn(move || cb(Ok(7)));
        })
        .await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn test_promisify_passes_error_through() {
        let reported = ServiceError::new("throttled").with_status(503);
        let expected = reported.clone();
        let result: Result<()> =
            promisify("failing", move |cb: Callback<()>| cb(Err(reported.into()))).await;
        assert_eq!(result, Err(Error::Service(expected)));
    }

    #[tokio::test]
    async fn test_promisify_dropped_callback() {
        let result: Result<()> = promisify("forgetful", drop).await;
        assert_eq!(
            result,
            Err(Error::CallbackDropped {
                operation: "forgetful"
            })
        );
    }
}
