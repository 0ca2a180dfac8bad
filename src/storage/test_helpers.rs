//! Live-backend fixtures for driver tests.
//!
//! Postgres runs in a Testcontainers container, one per test. DynamoDB tests
//! talk to DynamoDB Local at `AWS_ENDPOINT_URL` (e.g. `http://localhost:8000`)
//! and get a throwaway table each. When neither Docker nor an endpoint is
//! available the fixture returns `None` and the test is skipped with a note
//! on stderr.

use std::sync::atomic::{AtomicU32, Ordering};

use aws_sdk_dynamodb::{
    config::{BehaviorVersion, Credentials, Region},
    Client,
};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use time::macros::datetime;

use super::{dynamodb::TableBootstrap, postgres::PgUserStore, StoreError, UserStore};
use crate::config::PostgresConfig;
use crate::secrets::DbCredentials;
use crate::users::{
    keys::UserKey,
    repo_types::{NewUserRecord, UserChanges},
};

/// A migrated Postgres store backed by its own container. The container is
/// removed when this is dropped, so keep it alive for the whole test.
pub struct TestDatabase {
    pub store: PgUserStore,
    _container: ContainerAsync<Postgres>,
}

impl TestDatabase {
    pub async fn start(prefix: &str) -> Option<Self> {
        let container = match Postgres::default().start().await {
            Ok(c) => c,
            Err(e) => {
                eprintln!("[{prefix}] skipped, postgres container unavailable: {e}");
                return None;
            }
        };
        let host = container
            .get_host()
            .await
            .unwrap_or_else(|e| panic!("container host for {prefix}: {e}"));
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .unwrap_or_else(|e| panic!("container port for {prefix}: {e}"));

        let config = PostgresConfig {
            host: host.to_string(),
            port,
            database: "postgres".into(),
            max_connections: 5,
        };
        let creds = DbCredentials {
            username: "postgres".into(),
            password: "postgres".into(),
        };
        let store = PgUserStore::connect(&config, &creds)
            .await
            .unwrap_or_else(|e| panic!("connect test pool for {prefix}: {e}"));
        store
            .migrate()
            .await
            .unwrap_or_else(|e| panic!("migrate {prefix}: {e}"));

        Some(Self {
            store,
            _container: container,
        })
    }
}

/// Client for DynamoDB Local plus a fresh table name, or `None` when
/// `AWS_ENDPOINT_URL` is unset.
pub async fn local_dynamo(prefix: &str) -> Option<(Client, String)> {
    static NEXT_TABLE: AtomicU32 = AtomicU32::new(0);

    let Some(endpoint) = std::env::var("AWS_ENDPOINT_URL").ok().filter(|v| !v.is_empty())
    else {
        eprintln!("[{prefix}] skipped, AWS_ENDPOINT_URL is not set");
        return None;
    };
    let config = aws_sdk_dynamodb::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .endpoint_url(endpoint)
        .credentials_provider(Credentials::new("local", "local", None, None, "test"))
        .build();
    let client = Client::from_conf(config);

    let table = format!(
        "{prefix}_{}_{}",
        std::process::id(),
        NEXT_TABLE.fetch_add(1, Ordering::SeqCst)
    );
    TableBootstrap::new(&client, &table)
        .ensure(true)
        .await
        .unwrap_or_else(|e| panic!("create table {table}: {e}"));
    Some((client, table))
}

pub async fn drop_table(client: &Client, table: &str) {
    let _ = client.delete_table().table_name(table).send().await;
}

pub fn new_user(email: &str) -> NewUserRecord {
    NewUserRecord {
        name: Some("Ada".into()),
        email: email.into(),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
        created_at: datetime!(2024-06-01 12:00 UTC),
    }
}

pub fn rename(name: &str) -> UserChanges {
    UserChanges {
        name: Some(name.into()),
        email: None,
        password_hash: None,
        updated_at: datetime!(2024-06-02 08:30 UTC),
    }
}

/// The part of the driver contract every email-keyed store must honour:
/// duplicate inserts conflict, missing users are `NotFound` for update and
/// delete, a second delete is `NotFound`, and list reflects deletions.
pub async fn check_email_keyed_contract(store: &dyn UserStore) {
    let ada = UserKey::Email("ada@x.io".into());
    let ghost = UserKey::Email("ghost@x.io".into());

    let created = store.insert(new_user("ada@x.io")).await.expect("insert");
    assert_eq!(created.email, "ada@x.io");
    assert_eq!(created.id, None);

    let err = store.insert(new_user("ada@x.io")).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(e) if e == "ada@x.io"));

    let fetched = store.fetch(&ada).await.expect("fetch").expect("stored");
    assert_eq!(fetched, created);
    assert!(store.fetch(&ghost).await.expect("fetch ghost").is_none());

    assert!(matches!(
        store.update(&ghost, rename("Nobody")).await,
        Err(StoreError::NotFound)
    ));
    // A failed update must not have created the item.
    assert!(store.fetch(&ghost).await.expect("fetch ghost").is_none());

    let updated = store.update(&ada, rename("Ada L.")).await.expect("update");
    assert_eq!(updated.name.as_deref(), Some("Ada L."));
    assert_eq!(updated.password_hash, created.password_hash);
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.updated_at, datetime!(2024-06-02 08:30 UTC));

    store.insert(new_user("grace@x.io")).await.expect("second insert");
    let mut emails: Vec<_> = store
        .fetch_all()
        .await
        .expect("list")
        .into_iter()
        .map(|r| r.email)
        .collect();
    emails.sort();
    assert_eq!(emails, ["ada@x.io", "grace@x.io"]);

    store.remove(&ada).await.expect("first delete");
    assert!(matches!(store.remove(&ada).await, Err(StoreError::NotFound)));
    assert!(matches!(store.remove(&ghost).await, Err(StoreError::NotFound)));
    assert!(store.fetch(&ada).await.expect("fetch deleted").is_none());
    assert_eq!(store.fetch_all().await.expect("list").len(), 1);

    // The key is free again once deleted.
    store.insert(new_user("ada@x.io")).await.expect("re-insert");
}
