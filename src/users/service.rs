use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::storage::{StoreError, UserStore};
use crate::users::{
    dto::{NewUser, User, UserPatch},
    error::UserError,
    keys::{normalize_email, KeyScheme, UserKey},
    password::{hash_password, verify_password},
    repo_types::{NewUserRecord, UserChanges},
};

const MAX_NAME_LEN: usize = 255;
const MAX_EMAIL_LEN: usize = 255;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

fn validated_email(raw: &str) -> Result<String, UserError> {
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        return Err(UserError::Validation(format!("invalid email {email:?}")));
    }
    Ok(email)
}

fn validated_name(raw: Option<String>) -> Result<Option<String>, UserError> {
    let Some(name) = raw else { return Ok(None) };
    let name = name.trim().to_string();
    if name.chars().count() > MAX_NAME_LEN {
        return Err(UserError::Validation("name is too long".into()));
    }
    Ok((!name.is_empty()).then_some(name))
}

fn hashed(plain: &str) -> Result<String, UserError> {
    if plain.is_empty() {
        return Err(UserError::Validation("password must not be empty".into()));
    }
    hash_password(plain).map_err(|e| UserError::Storage(format!("hash password: {e}")))
}

/// Backend-agnostic user repository. Validates input, hashes passwords,
/// bounds every driver call by a timeout and folds driver errors into
/// `UserError`. Holds no state of its own besides the shared driver.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    timeout: Duration,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn scheme(&self) -> KeyScheme {
        self.store.scheme()
    }

    /// Key for a raw path segment under the active backend's scheme.
    pub fn parse_key(&self, raw: &str) -> Result<UserKey, UserError> {
        self.scheme().parse(raw)
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "storage call timed out");
                Err(StoreError::Backend(format!(
                    "{op} cancelled: storage call timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    pub async fn create(&self, input: NewUser) -> Result<User, UserError> {
        let email = validated_email(&input.email)?;
        let name = validated_name(input.name)?;
        let password_hash = hashed(&input.password)?;

        let record = NewUserRecord {
            name,
            email,
            password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        let key = UserKey::Email(record.email.clone());
        let stored = self
            .call("insert", self.store.insert(record))
            .await
            .map_err(|e| UserError::from_store(e, &key))?;

        info!(email = %stored.email, id = ?stored.id, "user created");
        Ok(stored.into())
    }

    pub async fn get(&self, key: &UserKey) -> Result<User, UserError> {
        let record = self
            .call("fetch", self.store.fetch(key))
            .await
            .map_err(|e| UserError::from_store(e, key))?
            .ok_or_else(|| UserError::NotFound(key.to_string()))?;
        Ok(record.into())
    }

    /// Fresh snapshot of every user; nothing is carried over between calls.
    pub async fn list(&self) -> Result<Vec<User>, UserError> {
        let records = self
            .call("fetch_all", self.store.fetch_all())
            .await
            .map_err(|e| {
                error!(error = %e, "list users failed");
                UserError::Storage(e.to_string())
            })?;
        debug!(count = records.len(), "users listed");
        Ok(records.into_iter().map(Into::into).collect())
    }

    pub async fn update(&self, key: &UserKey, patch: UserPatch) -> Result<User, UserError> {
        let email = patch.email.as_deref().map(validated_email).transpose()?;
        if let (KeyScheme::Email, Some(new), UserKey::Email(current)) =
            (self.scheme(), email.as_ref(), key)
        {
            if new != current {
                return Err(UserError::Validation(
                    "email identifies the user and cannot be changed".into(),
                ));
            }
        }

        let changes = UserChanges {
            name: validated_name(patch.name)?,
            email,
            password_hash: patch.password.as_deref().map(hashed).transpose()?,
            updated_at: OffsetDateTime::now_utc(),
        };
        let password_changed = changes.password_hash.is_some();

        let stored = self
            .call("update", self.store.update(key, changes))
            .await
            .map_err(|e| UserError::from_store(e, key))?;

        info!(key = %key, password_changed, "user updated");
        Ok(stored.into())
    }

    pub async fn delete(&self, key: &UserKey) -> Result<(), UserError> {
        self.call("remove", self.store.remove(key))
            .await
            .map_err(|e| UserError::from_store(e, key))?;
        info!(key = %key, "user deleted");
        Ok(())
    }

    /// Checks `plain` against the stored digest without handing the digest out.
    pub async fn verify_password(&self, key: &UserKey, plain: &str) -> Result<bool, UserError> {
        let record = self
            .call("fetch", self.store.fetch(key))
            .await
            .map_err(|e| UserError::from_store(e, key))?
            .ok_or_else(|| UserError::NotFound(key.to_string()))?;
        verify_password(plain, &record.password_hash)
            .map_err(|e| UserError::Storage(format!("stored digest unreadable: {e}")))
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
