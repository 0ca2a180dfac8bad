//! Mapping from a user's logical identity to the address a backend stores it
//! under. Everything here is pure, so Get/Update/Delete can recompute a key
//! from a URL segment or a partially filled user without reading first.

use std::fmt;

use crate::users::{dto::User, error::UserError, repo_types::UserRecord};

/// Addressing scheme a backend commits to. A backend never mixes the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    /// Storage-assigned numeric id (relational backend).
    SurrogateId,
    /// The normalized email is the item key (key-value backends).
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserKey {
    Id(i64),
    Email(String),
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Email(email) => f.write_str(email),
        }
    }
}

/// Anything that carries enough identity to derive a key from.
pub trait Identified {
    fn surrogate_id(&self) -> Option<i64>;
    fn email(&self) -> &str;
}

impl Identified for User {
    fn surrogate_id(&self) -> Option<i64> {
        self.id
    }
    fn email(&self) -> &str {
        &self.email
    }
}

impl Identified for UserRecord {
    fn surrogate_id(&self) -> Option<i64> {
        self.id
    }
    fn email(&self) -> &str {
        &self.email
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl KeyScheme {
    pub fn derive<T: Identified + ?Sized>(self, user: &T) -> Result<UserKey, UserError> {
        match self {
            Self::SurrogateId => user.surrogate_id().map(UserKey::Id).ok_or_else(|| {
                UserError::Validation("user has no id; it was never stored".into())
            }),
            Self::Email => {
                let email = normalize_email(user.email());
                if email.is_empty() {
                    return Err(UserError::Validation("email is required".into()));
                }
                Ok(UserKey::Email(email))
            }
        }
    }

    /// Parses an identifier as it appears in a request path.
    pub fn parse(self, raw: &str) -> Result<UserKey, UserError> {
        let raw = raw.trim();
        match self {
            Self::SurrogateId => raw
                .parse::<i64>()
                .map(UserKey::Id)
                .map_err(|_| UserError::Validation(format!("invalid user id {raw:?}"))),
            Self::Email => {
                let email = normalize_email(raw);
                if email.is_empty() {
                    return Err(UserError::Validation("email is required".into()));
                }
                Ok(UserKey::Email(email))
            }
        }
    }
}
