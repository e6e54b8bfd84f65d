//! Awaitable table-storage operations.
//!
//! - [`TableService`] - the async contract every helper runs against
//! - [`Promisified`] - turns a [`CallbackTableService`] into a [`TableService`]
//! - [`pagination`] - `query_all`, `query_partition`, `query_custom`
//! - [`chunking`] - `batch_merge`, `batch_delete` in groups of 100
//! - [`MemoryTableService`] and [`DynamoTableService`] backends
//!
//! # Example
//!
//! ```
//! use async_tables::{Entity, MemoryTableService, Promisified, TableService};
//! use async_tables::{batch_merge, query_partition};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let client = Promisified::new(MemoryTableService::new());
//! client.create_table_if_not_exists("orders").await?;
//!
//! let orders: Vec<Entity> = (0..250)
//!     .map(|i| Entity::new("2024", format!("{:04}", i)).with("total", i))
//!     .collect();
//! batch_merge(&client, "orders", &orders).await?;
//!
//! let stored = query_partition(&client, "orders", "2024").await?;
//! assert_eq!(stored.len(), 250);
//! # Ok::<(), async_tables::Error>(())
//! # }).unwrap();
//! ```

pub mod adapter;
pub mod batch;
pub mod chunking;
pub mod config;
pub mod dynamo;
pub mod entity;
pub mod errors;
pub mod logging;
pub mod memory;
pub mod pagination;
pub mod query;
pub mod service;

pub use adapter::{Callback, CallbackTableService, Promisified, promisify};
pub use batch::{BATCH_MAX_OPERATIONS, BatchOperation, TableBatch};
pub use chunking::{batch_delete, batch_merge};
pub use config::ClientConfig;
pub use dynamo::DynamoTableService;
pub use entity::{Entity, EntityValue, PARTITION_KEY, ROW_KEY, TIMESTAMP};
pub use errors::{Error, Result, ServiceError};
pub use logging::init_logging;
pub use memory::MemoryTableService;
pub use pagination::{query_all, query_custom, query_partition};
pub use query::{CompareOp, ContinuationToken, Filter, QueryPage, TableQuery};
pub use service::TableService;
