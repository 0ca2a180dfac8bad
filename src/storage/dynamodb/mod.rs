//! DynamoDB drivers.
//!
//! Both drivers share one table layout: hash key `email` (S), attributes
//! `fullname`, `password`, `created_at`, `updated_at`. They differ in which
//! primitives they use to honour the `UserStore` contract:
//!
//! - [`DynamoItemStore`]: whole-item `PutItem`/`GetItem`/`DeleteItem`, with
//!   condition expressions for existence checks.
//! - [`DynamoExpressionStore`]: `UpdateItem` expressions and `ReturnValues`
//!   to learn whether an item existed.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};

use super::StoreError;

mod expression_store;
mod item;
mod item_store;
mod table;

pub use expression_store::DynamoExpressionStore;
pub use item_store::DynamoItemStore;
pub use table::TableBootstrap;

/// Flattens an SDK failure into a backend error with the service's own message.
fn sdk_error<E, R>(op: &'static str, err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    tracing::error!(op, error = %detail, "dynamodb call failed");
    StoreError::Backend(format!("{op} failed: {detail}"))
}
