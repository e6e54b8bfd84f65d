//! Chunked batch writes and deletes.
//!
//! Entities are grouped in input order into batches of
//! [`BATCH_MAX_OPERATIONS`]. Batches are submitted one at a time; the next
//! group is not built until the previous submission completes.
//!
//! Each batch is atomic, the sequence is not. On the first failed submission
//! the helper returns the error; batches already applied stay applied.

use tracing::{debug, info, warn};

use crate::batch::{BATCH_MAX_OPERATIONS, BatchOperation, TableBatch};
use crate::entity::Entity;
use crate::errors::Result;
use crate::service::TableService;

/// Insert-or-merge every entity, 100 per batch.
pub async fn batch_merge<C>(client: &C, table: &str, entities: &[Entity]) -> Result<()>
where
    C: TableService + ?Sized,
{
    submit_in_batches(client, table, entities, BatchOperation::InsertOrMerge).await
}

/// Delete every entity, 100 per batch.
pub async fn batch_delete<C>(client: &C, table: &str, entities: &[Entity]) -> Result<()>
where
    C: TableService + ?Sized,
{
    submit_in_batches(client, table, entities, BatchOperation::Delete).await
}

async fn submit_in_batches<C, F>(
    client: &C,
    table: &str,
    entities: &[Entity],
    operation: F,
) -> Result<()>
where
    C: TableService + ?Sized,
    F: Fn(Entity) -> BatchOperation,
{
    let total = entities.len().div_ceil(BATCH_MAX_OPERATIONS);

    for (index, chunk) in entities.chunks(BATCH_MAX_OPERATIONS).enumerate() {
        let mut batch = TableBatch::new();
        for entity in chunk {
            batch.push(operation(entity.clone()))?;
        }

        debug!(
            table,
            batch = index + 1,
            of = total,
            operations = batch.len(),
            "Submitting batch"
        );
        if let Err(e) = client.execute_batch(table, &batch).await {
            warn!(
                table,
                failed_batch = index + 1,
                applied_batches = index,
                skipped_batches = total - index - 1,
                error = %e,
                "Batch submission failed"
            );
            return Err(e);
        }
    }

    info!(table, batches = total, entities = entities.len(), "Batches applied");
    Ok(())
}
