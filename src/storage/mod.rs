//! Backend drivers behind the `UserStore` contract.
//!
//! Drivers speak in `UserRecord`s and `UserKey`s and report `StoreError`;
//! no SDK or database error type leaves this module.

use async_trait::async_trait;

use crate::users::{
    keys::{KeyScheme, UserKey},
    repo_types::{NewUserRecord, UserChanges, UserRecord},
};

pub mod dynamodb;
pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod test_helpers;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("email {0} already registered")]
    AlreadyExists(String),
    #[error("{0}")]
    Backend(String),
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Addressing scheme every key passed to this driver follows.
    fn scheme(&self) -> KeyScheme;

    /// Persists a new user. Fails with `AlreadyExists` when the email is taken.
    async fn insert(&self, user: NewUserRecord) -> StoreResult<UserRecord>;

    async fn fetch(&self, key: &UserKey) -> StoreResult<Option<UserRecord>>;

    /// Fresh snapshot of every live record, in backend-native order.
    async fn fetch_all(&self) -> StoreResult<Vec<UserRecord>>;

    /// Applies `changes` to an existing record. Fails with `NotFound` rather
    /// than creating one.
    async fn update(&self, key: &UserKey, changes: UserChanges) -> StoreResult<UserRecord>;

    /// Fails with `NotFound` when nothing was stored under `key`.
    async fn remove(&self, key: &UserKey) -> StoreResult<()>;

    /// Releases the underlying connection handle.
    async fn close(&self) {}
}

pub(crate) fn surrogate_id(key: &UserKey) -> StoreResult<i64> {
    match key {
        UserKey::Id(id) => Ok(*id),
        UserKey::Email(_) => Err(StoreError::InvalidData(
            "this backend addresses users by numeric id".into(),
        )),
    }
}

pub(crate) fn email_key(key: &UserKey) -> StoreResult<&str> {
    match key {
        UserKey::Email(email) => Ok(email),
        UserKey::Id(_) => Err(StoreError::InvalidData(
            "this backend addresses users by email".into(),
        )),
    }
}
