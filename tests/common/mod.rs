//! Scripted table service shared by the integration tests.
//!
//! Pages are served from a script; every call is recorded so tests can
//! assert how many fetches and submissions happened and in which order.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_tables::{
    BatchOperation, ContinuationToken, Entity, Error, QueryPage, Result, ServiceError,
    TableBatch, TableQuery, TableService,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub table: String,
    pub query: Option<TableQuery>,
    pub token: Option<ContinuationToken>,
}

#[derive(Default)]
pub struct ScriptedService {
    pages: Mutex<VecDeque<Result<QueryPage>>>,
    page_requests: Mutex<Vec<PageRequest>>,
    batches: Mutex<Vec<Vec<BatchOperation>>>,
    /// 1-based submission number that fails, and the error it reports.
    failing_batch: Mutex<Option<(usize, Error)>>,
    batch_attempts: Mutex<usize>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `pages` in order, linking them with continuation tokens.
    pub fn with_pages(pages: Vec<Vec<Entity>>) -> Self {
        let count = pages.len();
        let service = Self::new();
        for (i, entries) in pages.into_iter().enumerate() {
            let token =
                (i + 1 < count).then(|| ContinuationToken::new(format!("page-{}", i + 1), None));
            service.push_page(Ok(QueryPage::new(entries, token)));
        }
        service
    }

    pub fn push_page(&self, page: Result<QueryPage>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn fail_batch(&self, submission: usize, error: Error) {
        *self.failing_batch.lock().unwrap() = Some((submission, error));
    }

    pub fn page_requests(&self) -> Vec<PageRequest> {
        self.page_requests.lock().unwrap().clone()
    }

    /// Successfully applied batches.
    pub fn batches(&self) -> Vec<Vec<BatchOperation>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_attempts(&self) -> usize {
        *self.batch_attempts.lock().unwrap()
    }
}

#[async_trait]
impl TableService for ScriptedService {
    async fn query_entities(
        &self,
        table: &str,
        query: Option<&TableQuery>,
        continuation_token: Option<&ContinuationToken>,
    ) -> Result<QueryPage> {
        self.page_requests.lock().unwrap().push(PageRequest {
            table: table.to_string(),
            query: query.cloned(),
            token: continuation_token.cloned(),
        });
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(QueryPage::default()))
    }

    async fn retrieve_entity(&self, _: &str, _: &str, _: &str) -> Result<Option<Entity>> {
        unimplemented!("not scripted")
    }

    async fn insert_entity(&self, _: &str, _: &Entity) -> Result<Entity> {
        unimplemented!("not scripted")
    }

    async fn insert_or_replace_entity(&self, _: &str, _: &Entity) -> Result<Entity> {
        unimplemented!("not scripted")
    }

    async fn replace_entity(&self, _: &str, _: &Entity) -> Result<Entity> {
        unimplemented!("not scripted")
    }

    async fn delete_entity(&self, _: &str, _: &Entity) -> Result<()> {
        unimplemented!("not scripted")
    }

    async fn create_table_if_not_exists(&self, _: &str) -> Result<bool> {
        Ok(false)
    }

    async fn does_table_exist(&self, _: &str) -> Result<bool> {
        Ok(true)
    }

    async fn execute_batch(&self, _table: &str, batch: &TableBatch) -> Result<()> {
        let attempt = {
            let mut attempts = self.batch_attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };
        let failing = self.failing_batch.lock().unwrap().clone();
        if let Some((submission, error)) = failing
            && submission == attempt
        {
            return Err(error);
        }
        self.batches
            .lock()
            .unwrap()
            .push(batch.operations().to_vec());
        Ok(())
    }
}

/// `count` entities in one partition with zero-padded row keys.
pub fn entities(partition: &str, count: usize) -> Vec<Entity> {
    (0..count)
        .map(|i| Entity::new(partition, format!("{:05}", i)))
        .collect()
}

pub fn throttled() -> Error {
    ServiceError::new("Rate exceeded")
        .with_status(503)
        .with_code("ServerBusy")
        .into()
}
