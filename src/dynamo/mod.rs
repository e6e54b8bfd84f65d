//! DynamoDB backend.
//!
//! - `client` - SDK client construction from [`crate::ClientConfig`]
//! - `conversions` - entity <-> AttributeValue mapping
//! - `expressions` - filter, projection and update expressions
//! - `service` - the [`crate::TableService`] implementation

mod client;
pub mod conversions;
pub mod expressions;
mod service;

pub use client::build_client;
pub use service::DynamoTableService;
