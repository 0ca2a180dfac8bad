use std::time::Duration;

use aws_sdk_dynamodb::{
    types::{
        AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
        TableStatus,
    },
    Client,
};
use tracing::{info, warn};

use super::{item::EMAIL, sdk_error};
use crate::storage::{StoreError, StoreResult};

const ACTIVE_POLL_ATTEMPTS: u32 = 30;
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Startup check for the users table, shared by both DynamoDB drivers.
pub struct TableBootstrap<'a> {
    client: &'a Client,
    table: &'a str,
}

impl<'a> TableBootstrap<'a> {
    pub fn new(client: &'a Client, table: &'a str) -> Self {
        Self { client, table }
    }

    pub async fn exists(&self) -> StoreResult<bool> {
        match self.client.describe_table().table_name(self.table).send().await {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                info!(table = self.table, "table does not exist");
                Ok(false)
            }
            Err(err) => Err(sdk_error("DescribeTable", err)),
        }
    }

    /// Makes sure the table is there. Creates it (on-demand billing, `email`
    /// hash key) when `create` is set, otherwise a missing table is an error.
    pub async fn ensure(&self, create: bool) -> StoreResult<()> {
        if self.exists().await? {
            return Ok(());
        }
        if !create {
            return Err(StoreError::Backend(format!(
                "table {} does not exist and DYNAMODB_CREATE_TABLE is off",
                self.table
            )));
        }

        let attribute = AttributeDefinition::builder()
            .attribute_name(EMAIL)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let key = KeySchemaElement::builder()
            .attribute_name(EMAIL)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        self.client
            .create_table()
            .table_name(self.table)
            .attribute_definitions(attribute)
            .key_schema(key)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| sdk_error("CreateTable", e))?;
        info!(table = self.table, "table created, waiting for it to become active");

        self.wait_active().await
    }

    async fn wait_active(&self) -> StoreResult<()> {
        for _ in 0..ACTIVE_POLL_ATTEMPTS {
            let out = self
                .client
                .describe_table()
                .table_name(self.table)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeTable", e))?;
            if out.table().and_then(|t| t.table_status()) == Some(&TableStatus::Active) {
                return Ok(());
            }
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
        }
        warn!(table = self.table, "table still not active");
        Err(StoreError::Backend(format!(
            "table {} did not become active in time",
            self.table
        )))
    }
}
