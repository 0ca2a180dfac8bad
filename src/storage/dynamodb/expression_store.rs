use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    types::{AttributeValue, ReturnValue},
    Client,
};

use super::{
    item::{format_ts, item_to_record, key_for, CREATED_AT, EMAIL, NAME, PASSWORD, UPDATED_AT},
    sdk_error,
};
use crate::storage::{email_key, StoreError, StoreResult, UserStore};
use crate::users::{
    keys::{KeyScheme, UserKey},
    repo_types::{NewUserRecord, UserChanges, UserRecord},
};

/// Key-value driver, second generation: writes are `UpdateItem` expressions
/// and existence is read back from `ReturnValues` instead of a prior `GetItem`.
#[derive(Clone)]
pub struct DynamoExpressionStore {
    client: Client,
    table: String,
}

/// A `SET` expression with its placeholder maps.
#[derive(Debug, Default, PartialEq)]
struct SetExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl SetExpression {
    fn set(&mut self, attr: &str, value: AttributeValue) {
        let clause = format!("#{attr} = :{attr}");
        if self.expression.is_empty() {
            self.expression = format!("SET {clause}");
        } else {
            self.expression.push_str(", ");
            self.expression.push_str(&clause);
        }
        self.names.insert(format!("#{attr}"), attr.to_string());
        self.values.insert(format!(":{attr}"), value);
    }
}

fn insert_expression(user: &NewUserRecord) -> StoreResult<SetExpression> {
    let created = format_ts(user.created_at)?;
    let mut set = SetExpression::default();
    if let Some(name) = &user.name {
        set.set(NAME, AttributeValue::S(name.clone()));
    }
    set.set(PASSWORD, AttributeValue::S(user.password_hash.clone()));
    set.set(CREATED_AT, AttributeValue::S(created.clone()));
    set.set(UPDATED_AT, AttributeValue::S(created));
    Ok(set)
}

fn update_expression(changes: &UserChanges) -> StoreResult<SetExpression> {
    let mut set = SetExpression::default();
    if let Some(name) = &changes.name {
        set.set(NAME, AttributeValue::S(name.clone()));
    }
    if let Some(hash) = &changes.password_hash {
        set.set(PASSWORD, AttributeValue::S(hash.clone()));
    }
    set.set(UPDATED_AT, AttributeValue::S(format_ts(changes.updated_at)?));
    Ok(set)
}

impl DynamoExpressionStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Runs a conditional `UpdateItem` returning the new image. `None` means
    /// the condition did not hold.
    async fn conditional_update(
        &self,
        email: &str,
        set: SetExpression,
        condition: &str,
    ) -> StoreResult<Option<UserRecord>> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .set_key(Some(key_for(email)))
            .update_expression(set.expression)
            .set_expression_attribute_names(Some(set.names))
            .set_expression_attribute_values(Some(set.values))
            .condition_expression(condition)
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(out) => {
                let attrs = out.attributes.ok_or_else(|| {
                    StoreError::InvalidData("UpdateItem returned no attributes".into())
                })?;
                item_to_record(&attrs).map(Some)
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(None)
            }
            Err(err) => Err(sdk_error("UpdateItem", err)),
        }
    }
}

#[async_trait]
impl UserStore for DynamoExpressionStore {
    fn scheme(&self) -> KeyScheme {
        KeyScheme::Email
    }

    async fn insert(&self, user: NewUserRecord) -> StoreResult<UserRecord> {
        let set = insert_expression(&user)?;
        let created = self
            .conditional_update(&user.email, set, "attribute_not_exists(email)")
            .await?;
        created.ok_or(StoreError::AlreadyExists(user.email))
    }

    async fn fetch(&self, key: &UserKey) -> StoreResult<Option<UserRecord>> {
        let email = email_key(key)?;
        let out = self
            .client
            .get_item()
            .table_name(&self.table)
            .set_key(Some(key_for(email)))
            .projection_expression("#e, #n, #p, #c, #u")
            .expression_attribute_names("#e", EMAIL)
            .expression_attribute_names("#n", NAME)
            .expression_attribute_names("#p", PASSWORD)
            .expression_attribute_names("#c", CREATED_AT)
            .expression_attribute_names("#u", UPDATED_AT)
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| sdk_error("GetItem", e))?;
        out.item.as_ref().map(item_to_record).transpose()
    }

    async fn fetch_all(&self) -> StoreResult<Vec<UserRecord>> {
        let mut items = self
            .client
            .scan()
            .table_name(&self.table)
            .into_paginator()
            .items()
            .send();
        let mut records = Vec::new();
        while let Some(item) = items.next().await {
            let item = item.map_err(|e| sdk_error("Scan", e))?;
            records.push(item_to_record(&item)?);
        }
        Ok(records)
    }

    async fn update(&self, key: &UserKey, changes: UserChanges) -> StoreResult<UserRecord> {
        let email = email_key(key)?;
        if changes.email.as_deref().is_some_and(|e| e != email) {
            return Err(StoreError::InvalidData("email is the item key".into()));
        }
        let set = update_expression(&changes)?;
        self.conditional_update(email, set, "attribute_exists(email)")
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn remove(&self, key: &UserKey) -> StoreResult<()> {
        let email = email_key(key)?;
        let out = self
            .client
            .delete_item()
            .table_name(&self.table)
            .set_key(Some(key_for(email)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteItem", e))?;
        // DeleteItem succeeds on missing keys; the old image tells us if
        // anything was actually there.
        match out.attributes {
            Some(old) if !old.is_empty() => Ok(()),
            _ => Err(StoreError::NotFound),
        }
    }
}
