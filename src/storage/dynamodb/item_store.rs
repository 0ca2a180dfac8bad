use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use tracing::debug;

use super::{
    item::{item_to_record, key_for, record_to_item, Item},
    sdk_error,
};
use crate::storage::{email_key, StoreError, StoreResult, UserStore};
use crate::users::{
    keys::{KeyScheme, UserKey},
    repo_types::{NewUserRecord, UserChanges, UserRecord},
};

/// Key-value driver, first generation: every write replaces the whole item.
#[derive(Clone)]
pub struct DynamoItemStore {
    client: Client,
    table: String,
}

impl DynamoItemStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    async fn put(&self, item: Item, condition: &str) -> Result<(), PutOutcome> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .condition_expression(condition)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception())
                {
                    PutOutcome::ConditionFailed
                } else {
                    PutOutcome::Failed(sdk_error("PutItem", err))
                }
            })
    }
}

enum PutOutcome {
    ConditionFailed,
    Failed(StoreError),
}

#[async_trait]
impl UserStore for DynamoItemStore {
    fn scheme(&self) -> KeyScheme {
        KeyScheme::Email
    }

    async fn insert(&self, user: NewUserRecord) -> StoreResult<UserRecord> {
        let record = user.into_record(None);
        let item = record_to_item(&record)?;
        match self.put(item, "attribute_not_exists(email)").await {
            Ok(()) => Ok(record),
            Err(PutOutcome::ConditionFailed) => Err(StoreError::AlreadyExists(record.email)),
            Err(PutOutcome::Failed(e)) => Err(e),
        }
    }

    async fn fetch(&self, key: &UserKey) -> StoreResult<Option<UserRecord>> {
        let email = email_key(key)?;
        let out = self
            .client
            .get_item()
            .table_name(&self.table)
            .set_key(Some(key_for(email)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| sdk_error("GetItem", e))?;
        out.item.as_ref().map(item_to_record).transpose()
    }

    async fn fetch_all(&self) -> StoreResult<Vec<UserRecord>> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let out = self
                .client
                .scan()
                .table_name(&self.table)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| sdk_error("Scan", e))?;
            for item in out.items.as_deref().unwrap_or_default() {
                records.push(item_to_record(item)?);
            }
            match out.last_evaluated_key {
                Some(next) if !next.is_empty() => {
                    debug!(table = %self.table, scanned = records.len(), "scan continues");
                    start_key = Some(next);
                }
                _ => break,
            }
        }
        Ok(records)
    }

    async fn update(&self, key: &UserKey, changes: UserChanges) -> StoreResult<UserRecord> {
        let email = email_key(key)?;
        if changes.email.as_deref().is_some_and(|e| e != email) {
            return Err(StoreError::InvalidData("email is the item key".into()));
        }
        let mut record = self.fetch(key).await?.ok_or(StoreError::NotFound)?;
        changes.apply_to(&mut record);
        let item = record_to_item(&record)?;
        // The item may have been deleted between the read and this write.
        match self.put(item, "attribute_exists(email)").await {
            Ok(()) => Ok(record),
            Err(PutOutcome::ConditionFailed) => Err(StoreError::NotFound),
            Err(PutOutcome::Failed(e)) => Err(e),
        }
    }

    async fn remove(&self, key: &UserKey) -> StoreResult<()> {
        let email = email_key(key)?;
        self.client
            .delete_item()
            .table_name(&self.table)
            .set_key(Some(key_for(email)))
            .condition_expression("attribute_exists(email)")
            .send()
            .await
            .map(|_| ())
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception())
                {
                    StoreError::NotFound
                } else {
                    sdk_error("DeleteItem", err)
                }
            })
    }
}
