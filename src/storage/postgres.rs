use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    FromRow, PgPool,
};
use time::OffsetDateTime;
use tracing::{error, info};

use super::{surrogate_id, StoreError, StoreResult, UserStore};
use crate::config::PostgresConfig;
use crate::secrets::DbCredentials;
use crate::users::{
    keys::{KeyScheme, UserKey},
    repo_types::{NewUserRecord, UserChanges, UserRecord},
};

const UNIQUE_VIOLATION: &str = "23505";

/// Row shape of the `users` table (live columns only).
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: Option<String>,
    email: String,
    password_hash: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(r: UserRow) -> Self {
        Self {
            id: Some(r.id),
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Relational driver. Rows are addressed by their `BIGSERIAL` id and
/// soft-deleted through `deleted_at`.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub async fn connect(cfg: &PostgresConfig, creds: &DbCredentials) -> anyhow::Result<Self> {
        let options = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .database(&cfg.database)
            .username(&creds.username)
            .password(&creds.password);

        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_with(options)
            .await
            .context("connect to database")?;
        info!(host = %cfg.host, database = %cfg.database, "postgres pool ready");
        Ok(Self { pool })
    }

    #[cfg(test)]
    fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `users` table and its indexes if they don't exist yet.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run users migration")?;
        Ok(())
    }
}

fn map_sqlx_error(err: sqlx::Error, email: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::AlreadyExists(email.unwrap_or_default().to_string());
        }
    }
    error!(error = %err, "postgres query failed");
    StoreError::Backend(format!("database error: {err}"))
}

#[async_trait]
impl UserStore for PgUserStore {
    fn scheme(&self) -> KeyScheme {
        KeyScheme::SurrogateId
    }

    async fn insert(&self, user: NewUserRecord) -> StoreResult<UserRecord> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, name, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, Some(user.email.as_str())))?;
        Ok(row.into())
    }

    async fn fetch(&self, key: &UserKey) -> StoreResult<Option<UserRecord>> {
        let id = surrogate_id(key)?;
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, None))?;
        Ok(row.map(Into::into))
    }

    async fn fetch_all(&self) -> StoreResult<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, created_at, updated_at
            FROM users
            WHERE deleted_at IS NULL
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, None))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update(&self, key: &UserKey, changes: UserChanges) -> StoreResult<UserRecord> {
        let id = surrogate_id(key)?;
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
               SET name          = COALESCE($2, name),
                   email         = COALESCE($3, email),
                   password_hash = COALESCE($4, password_hash),
                   updated_at    = $5
             WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, name, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .bind(changes.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, changes.email.as_deref()))?;
        row.map(Into::into).ok_or(StoreError::NotFound)
    }

    async fn remove(&self, key: &UserKey) -> StoreResult<()> {
        let id = surrogate_id(key)?;
        let result = sqlx::query(
            r#"
            UPDATE users
               SET deleted_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, None))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("postgres pool closed");
    }
}
