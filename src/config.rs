use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Which storage driver the process is wired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Postgres,
    Dynamodb,
    DynamodbExpr,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "dynamodb" | "dynamodb-item" => Ok(Self::Dynamodb),
            "dynamodb-expr" | "dynamodb-expression" => Ok(Self::DynamodbExpr),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!(
                "unknown STORE_BACKEND {other:?}; expected postgres, dynamodb, dynamodb-expr or memory"
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamoConfig {
    pub table: String,
    pub create_table: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub backend: BackendKind,
    pub secret_id: String,
    pub aws: AwsConfig,
    pub postgres: PostgresConfig,
    pub dynamo: DynamoConfig,
    pub storage_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't have to touch
    /// the process environment.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = get("STORE_BACKEND")
            .unwrap_or_else(|| "postgres".into())
            .parse::<BackendKind>()?;

        let http = HttpConfig {
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "APP_PORT", 8080)?,
        };

        let aws = AwsConfig {
            region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".into()),
            endpoint_url: get("AWS_ENDPOINT_URL").filter(|v| !v.is_empty()),
        };

        let postgres = PostgresConfig {
            host: get("DATABASE_HOST").unwrap_or_else(|| "localhost".into()),
            port: parse_or(&get, "DATABASE_PORT", 5432)?,
            database: get("DATABASE_NAME").unwrap_or_else(|| "dbname".into()),
            max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
        };

        let dynamo = DynamoConfig {
            table: get("DYNAMODB_TABLE").unwrap_or_else(|| "users".into()),
            create_table: get("DYNAMODB_CREATE_TABLE")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        let timeout_secs: u64 = parse_or(&get, "STORAGE_TIMEOUT_SECS", 5)?;
        anyhow::ensure!(timeout_secs > 0, "STORAGE_TIMEOUT_SECS must be positive");

        Ok(Self {
            http,
            backend,
            secret_id: get("SECRET_ID").unwrap_or_else(|| "dev/clientID".into()),
            aws,
            postgres,
            dynamo,
            storage_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
