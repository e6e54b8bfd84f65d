//! Paginated queries.
//!
//! Each helper follows continuation tokens until the service reports the last
//! page and returns every entity in page order. A failed page fetch aborts
//! the whole query; entities gathered so far are dropped.

use tracing::{debug, info, warn};

use crate::entity::Entity;
use crate::errors::Result;
use crate::query::TableQuery;
use crate::service::TableService;

/// Every entity in the table.
pub async fn query_all<C>(client: &C, table: &str) -> Result<Vec<Entity>>
where
    C: TableService + ?Sized,
{
    accumulate(client, table, None).await
}

/// Every entity whose partition key equals `partition_key`.
pub async fn query_partition<C>(
    client: &C,
    table: &str,
    partition_key: &str,
) -> Result<Vec<Entity>>
where
    C: TableService + ?Sized,
{
    let query = TableQuery::partition(partition_key);
    accumulate(client, table, Some(&query)).await
}

/// Every entity matching a caller-built query.
///
/// The query is validated before the first page is requested, so an invalid
/// filter fails without contacting the service.
pub async fn query_custom<C>(client: &C, table: &str, query: &TableQuery) -> Result<Vec<Entity>>
where
    C: TableService + ?Sized,
{
    query.validate()?;
    accumulate(client, table, Some(query)).await
}

async fn accumulate<C>(client: &C, table: &str, query: Option<&TableQuery>) -> Result<Vec<Entity>>
where
    C: TableService + ?Sized,
{
    let mut entities = Vec::new();
    let mut pages = 0usize;
    let mut token = None;

    loop {
        let page = match client.query_entities(table, query, token.as_ref()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    table,
                    pages,
                    discarded = entities.len(),
                    error = %e,
                    "Query aborted"
                );
                return Err(e);
            }
        };
        pages += 1;
        debug!(
            table,
            page = pages,
            entries = page.entries.len(),
            has_more = page.continuation_token.is_some(),
            "Fetched page"
        );

        entities.extend(page.entries);
        match page.continuation_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    info!(table, pages, entities = entities.len(), "Query complete");
    Ok(entities)
}
