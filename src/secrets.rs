use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::AwsConfig;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret {secret_id} unavailable: {reason}")]
    Unavailable { secret_id: String, reason: String },
}

impl SecretError {
    fn unavailable(secret_id: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            secret_id: secret_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Database login pulled from the secret store. Immutable once resolved.
#[derive(Clone, Deserialize)]
pub struct DbCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Raw secret payload for `secret_id`.
    async fn secret_string(&self, secret_id: &str) -> Result<String, SecretError>;
}

pub struct AwsSecretsManager {
    client: Client,
}

impl AwsSecretsManager {
    pub async fn new(aws: &AwsConfig) -> Self {
        let shared = crate::aws::load_sdk_config(aws).await;
        Self {
            client: Client::new(&shared),
        }
    }
}

#[async_trait]
impl SecretSource for AwsSecretsManager {
    async fn secret_string(&self, secret_id: &str) -> Result<String, SecretError> {
        let out = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .version_stage("AWSCURRENT")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, secret_id, "get_secret_value failed");
                SecretError::unavailable(secret_id, e.to_string())
            })?;

        out.secret_string()
            .map(str::to_owned)
            .ok_or_else(|| SecretError::unavailable(secret_id, "secret has no string payload"))
    }
}

pub fn parse_credentials(secret_id: &str, raw: &str) -> Result<DbCredentials, SecretError> {
    let creds: DbCredentials = serde_json::from_str(raw)
        .map_err(|e| SecretError::unavailable(secret_id, format!("malformed payload: {e}")))?;
    if creds.username.trim().is_empty() || creds.password.is_empty() {
        return Err(SecretError::unavailable(
            secret_id,
            "payload is missing username or password",
        ));
    }
    Ok(creds)
}

/// Fetches and decodes the credential pair. Called once during startup.
pub async fn resolve_credentials(
    source: &dyn SecretSource,
    secret_id: &str,
) -> Result<DbCredentials, SecretError> {
    let raw = source.secret_string(secret_id).await?;
    let creds = parse_credentials(secret_id, &raw)?;
    info!(secret_id, username = %creds.username, "database credentials resolved");
    Ok(creds)
}
