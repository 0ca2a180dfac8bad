use time::OffsetDateTime;

/// User as the storage layer holds it. Carries the password digest and must
/// never be serialized to a client; convert to `dto::User` first.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: Option<i64>,            // surrogate id, relational backend only
    pub name: Option<String>,
    pub email: String,              // normalized, natural key for key-value backends
    pub password_hash: String,      // Argon2 PHC string
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Insert payload handed to a driver. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

impl NewUserRecord {
    /// Record as stored by backends that don't assign ids.
    pub fn into_record(self, id: Option<i64>) -> UserRecord {
        UserRecord {
            id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// In-place changes for an existing record. `None` keeps the stored value.
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub updated_at: OffsetDateTime,
}

impl UserChanges {
    pub fn apply_to(&self, record: &mut UserRecord) {
        if let Some(name) = &self.name {
            record.name = Some(name.clone());
        }
        if let Some(email) = &self.email {
            record.email = email.clone();
        }
        if let Some(hash) = &self.password_hash {
            record.password_hash = hash.clone();
        }
        record.updated_at = self.updated_at;
    }
}
