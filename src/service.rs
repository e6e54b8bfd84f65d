//! The awaitable table-service contract.
//!
//! Pagination and batch helpers are written against [`TableService`]. A
//! client that is already async implements it directly; a callback-style
//! client goes through [`crate::adapter::Promisified`].

use async_trait::async_trait;

use crate::batch::TableBatch;
use crate::entity::Entity;
use crate::errors::Result;
use crate::query::{ContinuationToken, QueryPage, TableQuery};

/// Entity CRUD, single-page query and batch execution against a table store.
///
/// Every method resolves exactly once: with the payload, or with the error
/// the underlying client reported.
#[async_trait]
pub trait TableService: Send + Sync {
    /// Fetch one page. `query` of `None` matches every entity.
    async fn query_entities(
        &self,
        table: &str,
        query: Option<&TableQuery>,
        continuation_token: Option<&ContinuationToken>,
    ) -> Result<QueryPage>;

    /// Fetch one entity. A missing entity resolves to `Ok(None)`.
    async fn retrieve_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>>;

    /// Insert a new entity. Fails if one with the same keys exists.
    async fn insert_entity(&self, table: &str, entity: &Entity) -> Result<Entity>;

    async fn insert_or_replace_entity(&self, table: &str, entity: &Entity) -> Result<Entity>;

    /// Replace an existing entity. Fails if none exists.
    async fn replace_entity(&self, table: &str, entity: &Entity) -> Result<Entity>;

    async fn delete_entity(&self, table: &str, entity: &Entity) -> Result<()>;

    /// Resolves `true` if the table was created, `false` if it already existed.
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool>;

    async fn does_table_exist(&self, table: &str) -> Result<bool>;

    /// Apply every operation of the batch atomically.
    async fn execute_batch(&self, table: &str, batch: &TableBatch) -> Result<()>;
}
