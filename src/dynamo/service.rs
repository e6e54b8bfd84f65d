//! [`TableService`] backed by DynamoDB.
//!
//! Tables use `PartitionKey` (HASH) and `RowKey` (RANGE), both strings.
//! Batches run as `TransactWriteItems`, which is atomic and accepts up to 100
//! operations, the same limit as [`crate::TableBatch`].

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::BuildError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, Delete, KeySchemaElement, KeyType, ScalarAttributeType,
    TableStatus, TransactWriteItem, Update,
};
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::batch::{BatchOperation, TableBatch};
use crate::config::ClientConfig;
use crate::dynamo::client::build_client;
use crate::dynamo::conversions::{
    entity_key, entity_to_item, item_to_entity, key, start_key_to_token, token_to_start_key,
};
use crate::dynamo::expressions::{
    Expression, Placeholders, filter_expression, key_exists_expression, merge_expression,
    projection_expression,
};
use crate::entity::{Entity, EntityValue, PARTITION_KEY, ROW_KEY, TIMESTAMP};
use crate::errors::{
    Error, Result, STATUS_CONFLICT, ServiceError, map_sdk_error, sdk_error_code,
};
use crate::query::{CompareOp, ContinuationToken, Filter, QueryPage, TableQuery};
use crate::service::TableService;

/// Polls of `DescribeTable` while a new table is being created.
const TABLE_ACTIVE_MAX_POLLS: u32 = 60;

/// Delay between `DescribeTable` polls.
const TABLE_ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(500);

const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";

/// DynamoDB table service.
#[derive(Debug, Clone)]
pub struct DynamoTableService {
    client: Client,
}

impl DynamoTableService {
    /// Wrap an existing SDK client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build an SDK client from `config` and wrap it.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let client = build_client(config).await?;
        info!(region = config.effective_region(), "DynamoDB table service ready");
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn put(
        &self,
        table: &str,
        entity: &Entity,
        condition: Option<(Expression, ServiceError)>,
    ) -> Result<Entity> {
        let stored = stamped(entity);
        entity_key(&stored)?;

        let mut request = self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(entity_to_item(&stored)));

        let on_condition_failure = match condition {
            Some((expr, err)) => {
                request = request
                    .condition_expression(expr.expression)
                    .set_expression_attribute_names(non_empty(expr.names));
                Some(err)
            }
            None => None,
        };

        let start = Instant::now();
        match request.send().await {
            Ok(_) => {
                debug!(
                    table,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "put_item"
                );
                Ok(stored)
            }
            Err(e) => match on_condition_failure {
                Some(err) if sdk_error_code(&e) == Some(CONDITIONAL_CHECK_FAILED) => {
                    Err(err.into())
                }
                _ => Err(map_sdk_error(e, table).into()),
            },
        }
    }

    async fn wait_for_table_active(&self, table: &str) -> Result<()> {
        for _ in 0..TABLE_ACTIVE_MAX_POLLS {
            let output = self
                .client
                .describe_table()
                .table_name(table)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, table))?;

            let status = output.table().and_then(|t| t.table_status());
            if status == Some(&TableStatus::Active) {
                return Ok(());
            }
            tokio::time::sleep(TABLE_ACTIVE_POLL_INTERVAL).await;
        }

        Err(ServiceError::new(format!(
            "Table '{}' did not become active after {} polls",
            table, TABLE_ACTIVE_MAX_POLLS
        ))
        .with_code("TableNotActive")
        .into())
    }
}

#[async_trait]
impl TableService for DynamoTableService {
    async fn query_entities(
        &self,
        table: &str,
        query: Option<&TableQuery>,
        continuation_token: Option<&ContinuationToken>,
    ) -> Result<QueryPage> {
        let filter = query.and_then(|q| q.filter.as_ref());
        let select = query.and_then(|q| q.select.as_deref());
        let limit = query
            .and_then(|q| q.top)
            .map(|top| i32::try_from(top).unwrap_or(i32::MAX));
        let start_key = continuation_token.map(token_to_start_key);

        let mut placeholders = Placeholders::new();
        let projection = select.map(|s| projection_expression(s, &mut placeholders));

        let start = Instant::now();
        let (items, last_evaluated_key) = match filter.and_then(single_partition) {
            // A bare partition filter becomes a key condition, avoiding a full scan.
            Some(partition_key) => {
                let name = placeholders.name(PARTITION_KEY);
                let value = placeholders.value(&EntityValue::from(partition_key));
                let built = placeholders.finish(format!("{} = {}", name, value));
                let output = self
                    .client
                    .query()
                    .table_name(table)
                    .key_condition_expression(built.expression)
                    .set_projection_expression(projection)
                    .set_expression_attribute_names(non_empty(built.names))
                    .set_expression_attribute_values(non_empty(built.values))
                    .set_limit(limit)
                    .set_exclusive_start_key(start_key)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(e, table))?;
                (output.items, output.last_evaluated_key)
            }
            None => {
                let filter_expr = filter.map(|f| filter_expression(f, &mut placeholders));
                let built = placeholders.finish(String::new());
                let output = self
                    .client
                    .scan()
                    .table_name(table)
                    .set_filter_expression(filter_expr)
                    .set_projection_expression(projection)
                    .set_expression_attribute_names(non_empty(built.names))
                    .set_expression_attribute_values(non_empty(built.values))
                    .set_limit(limit)
                    .set_exclusive_start_key(start_key)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(e, table))?;
                (output.items, output.last_evaluated_key)
            }
        };

        let entries = items
            .unwrap_or_default()
            .into_iter()
            .map(item_to_entity)
            .collect::<Result<Vec<_>>>()?;
        let continuation_token = last_evaluated_key.as_ref().and_then(start_key_to_token);

        debug!(
            table,
            entries = entries.len(),
            has_more = continuation_token.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "query page"
        );
        Ok(QueryPage::new(entries, continuation_token))
    }

    async fn retrieve_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<Entity>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key(partition_key, row_key)))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, table))?;

        match output.item {
            Some(item) => Ok(Some(item_to_entity(item)?)),
            None => {
                debug!(table, partition_key, row_key, "Entity not found");
                Ok(None)
            }
        }
    }

    async fn insert_entity(&self, table: &str, entity: &Entity) -> Result<Entity> {
        let conflict = ServiceError::new("The specified entity already exists.")
            .with_status(STATUS_CONFLICT)
            .with_code("EntityAlreadyExists");
        self.put(table, entity, Some((key_exists_expression(false), conflict)))
            .await
    }

    async fn insert_or_replace_entity(&self, table: &str, entity: &Entity) -> Result<Entity> {
        self.put(table, entity, None).await
    }

    async fn replace_entity(&self, table: &str, entity: &Entity) -> Result<Entity> {
        self.put(table, entity, Some((key_exists_expression(true), entity_not_found())))
            .await
    }

    async fn delete_entity(&self, table: &str, entity: &Entity) -> Result<()> {
        let condition = key_exists_expression(true);
        let result = self
            .client
            .delete_item()
            .table_name(table)
            .set_key(Some(entity_key(entity)?))
            .condition_expression(condition.expression)
            .set_expression_attribute_names(non_empty(condition.names))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if sdk_error_code(&e) == Some(CONDITIONAL_CHECK_FAILED) => {
                Err(entity_not_found().into())
            }
            Err(e) => Err(map_sdk_error(e, table).into()),
        }
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool> {
        if self.does_table_exist(table).await? {
            return Ok(false);
        }

        let result = self
            .client
            .create_table()
            .table_name(table)
            .attribute_definitions(string_attribute(PARTITION_KEY)?)
            .attribute_definitions(string_attribute(ROW_KEY)?)
            .key_schema(key_element(PARTITION_KEY, KeyType::Hash)?)
            .key_schema(key_element(ROW_KEY, KeyType::Range)?)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(table, "Table created");
                self.wait_for_table_active(table).await?;
                Ok(true)
            }
            // Created concurrently by someone else.
            Err(e) if sdk_error_code(&e) == Some("ResourceInUseException") => Ok(false),
            Err(e) => Err(map_sdk_error(e, table).into()),
        }
    }

    async fn does_table_exist(&self, table: &str) -> Result<bool> {
        match self.client.describe_table().table_name(table).send().await {
            Ok(_) => Ok(true),
            Err(e) if sdk_error_code(&e) == Some("ResourceNotFoundException") => Ok(false),
            Err(e) => Err(map_sdk_error(e, table).into()),
        }
    }

    async fn execute_batch(&self, table: &str, batch: &TableBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let transact_items = batch
            .operations()
            .iter()
            .map(|operation| build_transact_write_item(table, operation))
            .collect::<Result<Vec<_>>>()?;

        let start = Instant::now();
        self.client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, table))?;

        debug!(
            table,
            operations = batch.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "transact_write_items"
        );
        Ok(())
    }
}

/// Build a TransactWriteItem from a batch operation.
fn build_transact_write_item(table: &str, operation: &BatchOperation) -> Result<TransactWriteItem> {
    match operation {
        BatchOperation::InsertOrMerge(entity) => {
            let stored = stamped(entity);
            let expr = merge_expression(&stored).ok_or_else(|| {
                Error::Serialization("insert-or-merge entity has no properties".to_string())
            })?;
            let update = Update::builder()
                .table_name(table)
                .set_key(Some(entity_key(&stored)?))
                .update_expression(expr.expression)
                .set_expression_attribute_names(non_empty(expr.names))
                .set_expression_attribute_values(non_empty(expr.values))
                .build()
                .map_err(build_error)?;
            Ok(TransactWriteItem::builder().update(update).build())
        }
        BatchOperation::Delete(entity) => {
            let condition = key_exists_expression(true);
            let delete = Delete::builder()
                .table_name(table)
                .set_key(Some(entity_key(entity)?))
                .condition_expression(condition.expression)
                .set_expression_attribute_names(non_empty(condition.names))
                .build()
                .map_err(build_error)?;
            Ok(TransactWriteItem::builder().delete(delete).build())
        }
    }
}

/// Partition key of a filter that is exactly `PartitionKey eq <string>`.
fn single_partition(filter: &Filter) -> Option<&str> {
    match filter {
        Filter::Compare {
            property,
            op: CompareOp::Eq,
            value: EntityValue::String(pk),
        } if property == PARTITION_KEY => Some(pk),
        _ => None,
    }
}

fn stamped(entity: &Entity) -> Entity {
    entity
        .clone()
        .with(TIMESTAMP, EntityValue::DateTime(Utc::now()))
}

fn entity_not_found() -> ServiceError {
    ServiceError::not_found("ResourceNotFound", "The specified resource does not exist.")
}

/// DynamoDB rejects empty expression maps.
fn non_empty<V>(map: HashMap<String, V>) -> Option<HashMap<String, V>> {
    if map.is_empty() { None } else { Some(map) }
}

fn string_attribute(name: &str) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(build_error)
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(build_error)
}

fn build_error(e: BuildError) -> Error {
    ServiceError::new(format!("Failed to build request: {}", e))
        .with_code("ConstructionFailure")
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_partition_detection() {
        assert_eq!(
            single_partition(&Filter::partition_key_eq("orders")),
            Some("orders")
        );
        assert_eq!(single_partition(&Filter::eq(ROW_KEY, "1")), None);
        assert_eq!(
            single_partition(&Filter::partition_key_eq("a").and(Filter::eq("x", 1))),
            None
        );
    }

    #[test]
    fn test_batch_items_are_built() {
        let merge = BatchOperation::InsertOrMerge(Entity::new("p", "r").with("n", 1));
        let item = build_transact_write_item("t", &merge).unwrap();
        let update = item.update().unwrap();
        assert_eq!(update.table_name(), "t");
        assert!(update.update_expression().starts_with("SET "));

        let delete = BatchOperation::Delete(Entity::new("p", "r"));
        let item = build_transact_write_item("t", &delete).unwrap();
        assert!(item.delete().is_some());
    }

    #[test]
    fn test_key_only_merge_still_writes_timestamp() {
        let merge = BatchOperation::InsertOrMerge(Entity::new("p", "r"));
        let item = build_transact_write_item("t", &merge).unwrap();
        let names = item.update().unwrap().expression_attribute_names().unwrap();
        assert!(names.values().any(|n| n == TIMESTAMP));
    }

    #[test]
    fn test_missing_keys_rejected() {
        let mut entity = Entity::new("p", "r");
        entity.remove(ROW_KEY);
        let err = build_transact_write_item("t", &BatchOperation::Delete(entity)).unwrap_err();
        assert_eq!(err.service().and_then(|e| e.status_code), Some(400));
    }
}
