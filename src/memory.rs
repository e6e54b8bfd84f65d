//! In-process, callback-style table store.
//!
//! Behaves like the remote service as far as this crate can observe: tables
//! must exist, missing entities report 404, duplicate inserts report 409,
//! results come back in key order across pages, and batches are applied
//! atomically. Callbacks are invoked before the call returns and never while
//! the store lock is held, so a callback may start the next call.
//!
//! Wrap it in [`crate::Promisified`] to use it with the pagination and batch
//! helpers.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::adapter::{Callback, CallbackTableService};
use crate::batch::{BatchOperation, TableBatch};
use crate::entity::{Entity, EntityValue, TIMESTAMP};
use crate::errors::{Result, STATUS_CONFLICT, ServiceError};
use crate::query::{ContinuationToken, QueryPage, TableQuery};

/// Largest page the store returns, matching the remote service.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

type Key = (String, String);
type Table = BTreeMap<Key, Entity>;

/// In-memory table store.
#[derive(Debug)]
pub struct MemoryTableService {
    tables: Mutex<BTreeMap<String, Table>>,
    page_size: usize,
}

impl Default for MemoryTableService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTableService {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Limit pages to `page_size` entities. Values below 1 are treated as 1.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of entities stored in `table`, or `None` if it does not exist.
    pub fn entity_count(&self, table: &str) -> Option<usize> {
        self.lock().get(table).map(BTreeMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Table>> {
        // Mutations are single inserts/removes or prevalidated batches, so a
        // poisoned map is still consistent.
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_table<T>(&self, table: &str, f: impl FnOnce(&mut Table) -> Result<T>) -> Result<T> {
        let mut tables = self.lock();
        let rows = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        f(rows)
    }

    fn query_page(
        &self,
        table: &str,
        query: Option<&TableQuery>,
        token: Option<&ContinuationToken>,
    ) -> Result<QueryPage> {
        if let Some(query) = query {
            query.validate()?;
        }
        let limit = query
            .and_then(|q| q.top)
            .map_or(self.page_size, |top| top.min(self.page_size));
        let select = query.and_then(|q| q.select.as_deref());

        self.with_table(table, |rows| {
            let start = token.map(|t| {
                (
                    t.next_partition_key.clone(),
                    t.next_row_key.clone().unwrap_or_default(),
                )
            });
            let mut matching = rows
                .range(start.unwrap_or_default()..)
                .filter(|(_, entity)| query.is_none_or(|q| q.matches(entity)));

            let entries: Vec<Entity> = matching
                .by_ref()
                .take(limit)
                .map(|(_, entity)| match select {
                    Some(names) => entity.project(names),
                    None => entity.clone(),
                })
                .collect();
            let continuation_token = matching
                .next()
                .map(|((pk, rk), _)| ContinuationToken::new(pk.clone(), Some(rk.clone())));

            Ok(QueryPage::new(entries, continuation_token))
        })
    }

    fn retrieve(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Entity> {
        self.with_table(table, |rows| {
            rows.get(&(partition_key.to_string(), row_key.to_string()))
                .cloned()
                .ok_or_else(|| entity_not_found().into())
        })
    }

    fn write(&self, table: &str, entity: &Entity, mode: WriteMode) -> Result<Entity> {
        let key = entity_key(entity)?;
        self.with_table(table, |rows| {
            let exists = rows.contains_key(&key);
            match mode {
                WriteMode::Insert if exists => {
                    return Err(ServiceError::new("The specified entity already exists.")
                        .with_status(STATUS_CONFLICT)
                        .with_code("EntityAlreadyExists")
                        .into());
                }
                WriteMode::Replace if !exists => return Err(entity_not_found().into()),
                _ => {}
            }
            let stored = stamped(entity);
            rows.insert(key, stored.clone());
            Ok(stored)
        })
    }

    fn delete(&self, table: &str, entity: &Entity) -> Result<()> {
        let key = entity_key(entity)?;
        self.with_table(table, |rows| {
            rows.remove(&key)
                .map(|_| ())
                .ok_or_else(|| entity_not_found().into())
        })
    }

    fn create_table(&self, table: &str) -> Result<bool> {
        let mut tables = self.lock();
        if tables.contains_key(table) {
            return Ok(false);
        }
        tables.insert(table.to_string(), Table::new());
        Ok(true)
    }

    fn apply_batch(&self, table: &str, batch: &TableBatch) -> Result<()> {
        self.with_table(table, |rows| {
            let mut keys = Vec::with_capacity(batch.len());
            for operation in batch.operations() {
                let key = entity_key(operation.entity())?;
                if keys.contains(&key) {
                    return Err(ServiceError::new(format!(
                        "The batch contains more than one operation on ({}, {}).",
                        key.0, key.1
                    ))
                    .with_status(400)
                    .with_code("InvalidDuplicateRow")
                    .into());
                }
                if matches!(operation, BatchOperation::Delete(_)) && !rows.contains_key(&key) {
                    return Err(entity_not_found().into());
                }
                keys.push(key);
            }

            for (operation, key) in batch.operations().iter().zip(keys) {
                match operation {
                    BatchOperation::InsertOrMerge(entity) => {
                        let merged = match rows.get(&key) {
                            Some(existing) => {
                                let mut merged = existing.clone();
                                merged.merge_from(entity);
                                merged
                            }
                            None => entity.clone(),
                        };
                        rows.insert(key, stamped(&merged));
                    }
                    BatchOperation::Delete(_) => {
                        rows.remove(&key);
                    }
                }
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteMode {
    Insert,
    Upsert,
    Replace,
}

fn entity_key(entity: &Entity) -> Result<Key> {
    match (entity.partition_key(), entity.row_key()) {
        (Some(pk), Some(rk)) => Ok((pk.to_string(), rk.to_string())),
        _ => Err(ServiceError::new("The entity is missing PartitionKey or RowKey.")
            .with_status(400)
            .with_code("PropertiesNeedValue")
            .into()),
    }
}

fn stamped(entity: &Entity) -> Entity {
    entity.clone().with(TIMESTAMP, EntityValue::DateTime(Utc::now()))
}

fn entity_not_found() -> ServiceError {
    ServiceError::not_found("ResourceNotFound", "The specified resource does not exist.")
}

fn table_not_found(table: &str) -> ServiceError {
    ServiceError::not_found("TableNotFound", format!("Table '{}' not found", table))
}

impl CallbackTableService for MemoryTableService {
    fn query_entities(
        &self,
        table: &str,
        query: Option<&TableQuery>,
        continuation_token: Option<&ContinuationToken>,
        callback: Callback<QueryPage>,
    ) {
        callback(self.query_page(table, query, continuation_token));
    }

    fn retrieve_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        callback: Callback<Entity>,
    ) {
        callback(self.retrieve(table, partition_key, row_key));
    }

    fn insert_entity(&self, table: &str, entity: &Entity, callback: Callback<Entity>) {
        callback(self.write(table, entity, WriteMode::Insert));
    }

    fn insert_or_replace_entity(&self, table: &str, entity: &Entity, callback: Callback<Entity>) {
        callback(self.write(table, entity, WriteMode::Upsert));
    }

    fn replace_entity(&self, table: &str, entity: &Entity, callback: Callback<Entity>) {
        callback(self.write(table, entity, WriteMode::Replace));
    }

    fn delete_entity(&self, table: &str, entity: &Entity, callback: Callback<()>) {
        callback(self.delete(table, entity));
    }

    fn create_table_if_not_exists(&self, table: &str, callback: Callback<bool>) {
        callback(self.create_table(table));
    }

    fn does_table_exist(&self, table: &str, callback: Callback<bool>) {
        let exists = self.lock().contains_key(table);
        callback(Ok(exists));
    }

    fn execute_batch(&self, table: &str, batch: &TableBatch, callback: Callback<()>) {
        callback(self.apply_batch(table, batch));
    }
}
