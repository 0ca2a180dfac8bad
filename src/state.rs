use std::sync::Arc;

use anyhow::Context;
use aws_sdk_dynamodb::Client as DynamoClient;

use crate::config::{AppConfig, BackendKind};
use crate::secrets::{resolve_credentials, AwsSecretsManager};
use crate::storage::{
    dynamodb::{DynamoExpressionStore, DynamoItemStore, TableBootstrap},
    memory::MemoryUserStore,
    postgres::PgUserStore,
    UserStore,
};
use crate::users::{keys::KeyScheme, service::UserService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = build_store(&config).await?;
        Ok(Self::from_parts(config, store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> Self {
        let users = UserService::new(store, config.storage_timeout);
        Self { config, users }
    }

    /// In-memory state for tests.
    #[cfg(test)]
    pub fn fake(scheme: KeyScheme) -> Self {
        let mut config = AppConfig::from_lookup(|_| None).expect("default config");
        config.backend = BackendKind::Memory;
        config.storage_timeout = std::time::Duration::from_secs(5);
        Self::from_parts(Arc::new(config), Arc::new(MemoryUserStore::new(scheme)))
    }
}

/// Connects the configured backend. Credentials, when the backend needs
/// them, are resolved before any driver is constructed.
async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn UserStore>> {
    let store: Arc<dyn UserStore> = match config.backend {
        BackendKind::Postgres => {
            let secrets = AwsSecretsManager::new(&config.aws).await;
            let creds = resolve_credentials(&secrets, &config.secret_id)
                .await
                .context("resolve database credentials")?;
            let store = PgUserStore::connect(&config.postgres, &creds).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        BackendKind::Dynamodb => {
            let client = dynamo_client(config).await;
            TableBootstrap::new(&client, &config.dynamo.table)
                .ensure(config.dynamo.create_table)
                .await
                .context("check dynamodb table")?;
            Arc::new(DynamoItemStore::new(client, &config.dynamo.table))
        }
        BackendKind::DynamodbExpr => {
            let client = dynamo_client(config).await;
            TableBootstrap::new(&client, &config.dynamo.table)
                .ensure(config.dynamo.create_table)
                .await
                .context("check dynamodb table")?;
            Arc::new(DynamoExpressionStore::new(client, &config.dynamo.table))
        }
        BackendKind::Memory => {
            tracing::warn!("using in-memory storage; data is lost on shutdown");
            Arc::new(MemoryUserStore::new(KeyScheme::Email))
        }
    };
    tracing::info!(backend = ?config.backend, scheme = ?store.scheme(), "storage ready");
    Ok(store)
}

async fn dynamo_client(config: &AppConfig) -> DynamoClient {
    DynamoClient::new(&crate::aws::load_sdk_config(&config.aws).await)
}
