//! Atomic batches of entity operations.

use crate::entity::Entity;
use crate::errors::{Error, Result};

/// Maximum operations per batch, enforced by the storage service.
pub const BATCH_MAX_OPERATIONS: usize = 100;

/// A single operation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Insert the entity, or merge its properties into the existing one.
    InsertOrMerge(Entity),
    /// Delete the entity with the same partition and row key.
    Delete(Entity),
}

impl BatchOperation {
    pub fn entity(&self) -> &Entity {
        match self {
            BatchOperation::InsertOrMerge(e) | BatchOperation::Delete(e) => e,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BatchOperation::InsertOrMerge(_) => "insert_or_merge",
            BatchOperation::Delete(_) => "delete",
        }
    }
}

/// Up to [`BATCH_MAX_OPERATIONS`] operations submitted as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableBatch {
    operations: Vec<BatchOperation>,
}

impl TableBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_or_merge_entity(&mut self, entity: Entity) -> Result<()> {
        self.push(BatchOperation::InsertOrMerge(entity))
    }

    pub fn delete_entity(&mut self, entity: Entity) -> Result<()> {
        self.push(BatchOperation::Delete(entity))
    }

    pub fn push(&mut self, operation: BatchOperation) -> Result<()> {
        if self.is_full() {
            return Err(Error::BatchFull {
                max: BATCH_MAX_OPERATIONS,
            });
        }
        self.operations.push(operation);
        Ok(())
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.operations.len() >= BATCH_MAX_OPERATIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_rejects_operation_past_limit() {
        let mut batch = TableBatch::new();
        for i in 0..BATCH_MAX_OPERATIONS {
            batch
                .insert_or_merge_entity(Entity::new("p", i.to_string()))
                .unwrap();
        }
        assert!(batch.is_full());

        let err = batch.delete_entity(Entity::new("p", "extra")).unwrap_err();
        assert_eq!(err, Error::BatchFull { max: 100 });
        assert_eq!(batch.len(), BATCH_MAX_OPERATIONS);
    }

    #[test]
    fn test_batch_keeps_order() {
        let mut batch = TableBatch::new();
        batch.insert_or_merge_entity(Entity::new("p", "1")).unwrap();
        batch.delete_entity(Entity::new("p", "2")).unwrap();

        let names: Vec<_> = batch.operations().iter().map(|op| op.name()).collect();
        assert_eq!(names, vec!["insert_or_merge", "delete"]);
        assert_eq!(batch.operations()[1].entity().row_key(), Some("2"));
    }
}
