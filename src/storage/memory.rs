use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StoreError, StoreResult, UserStore};
use crate::users::{
    keys::{KeyScheme, UserKey},
    repo_types::{NewUserRecord, UserChanges, UserRecord},
};

/// In-process driver. Follows either addressing scheme, so it can stand in
/// for the relational backend (ids assigned from a counter) or the key-value
/// ones (email keys).
#[derive(Debug, Clone)]
pub struct MemoryUserStore {
    scheme: KeyScheme,
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<UserKey, UserRecord>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<&UserKey>) -> bool {
        self.rows
            .iter()
            .any(|(k, r)| r.email == email && Some(k) != except)
    }
}

impl MemoryUserStore {
    pub fn new(scheme: KeyScheme) -> Self {
        Self {
            scheme,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    async fn insert(&self, user: NewUserRecord) -> StoreResult<UserRecord> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(&user.email, None) {
            return Err(StoreError::AlreadyExists(user.email));
        }
        let record = match self.scheme {
            KeyScheme::SurrogateId => {
                inner.next_id += 1;
                user.into_record(Some(inner.next_id))
            }
            KeyScheme::Email => user.into_record(None),
        };
        let key = self
            .scheme
            .derive(&record)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        inner.rows.insert(key, record.clone());
        Ok(record)
    }

    async fn fetch(&self, key: &UserKey) -> StoreResult<Option<UserRecord>> {
        Ok(self.inner.read().await.rows.get(key).cloned())
    }

    async fn fetch_all(&self) -> StoreResult<Vec<UserRecord>> {
        Ok(self.inner.read().await.rows.values().cloned().collect())
    }

    async fn update(&self, key: &UserKey, changes: UserChanges) -> StoreResult<UserRecord> {
        let mut inner = self.inner.write().await;
        if !inner.rows.contains_key(key) {
            return Err(StoreError::NotFound);
        }
        if let Some(email) = &changes.email {
            if inner.email_taken(email, Some(key)) {
                return Err(StoreError::AlreadyExists(email.clone()));
            }
        }
        let record = inner.rows.get_mut(key).ok_or(StoreError::NotFound)?;
        changes.apply_to(record);
        Ok(record.clone())
    }

    async fn remove(&self, key: &UserKey) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .rows
            .remove(key)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
