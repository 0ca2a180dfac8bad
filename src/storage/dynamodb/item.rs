//! Explicit mapping between `UserRecord` and DynamoDB items. Field visibility
//! is decided here, not by reflection: only these attributes are ever written.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::storage::{StoreError, StoreResult};
use crate::users::repo_types::UserRecord;

pub const EMAIL: &str = "email";
pub const NAME: &str = "fullname";
pub const PASSWORD: &str = "password";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

pub type Item = HashMap<String, AttributeValue>;

pub fn key_for(email: &str) -> Item {
    HashMap::from([(EMAIL.to_string(), AttributeValue::S(email.to_string()))])
}

pub fn format_ts(ts: OffsetDateTime) -> StoreResult<String> {
    ts.format(&Rfc3339)
        .map_err(|e| StoreError::InvalidData(format!("format timestamp: {e}")))
}

fn parse_ts(item: &Item, attr: &str) -> StoreResult<OffsetDateTime> {
    let raw = get_string(item, attr)?;
    OffsetDateTime::parse(&raw, &Rfc3339)
        .map_err(|e| StoreError::InvalidData(format!("{attr}: {e}")))
}

fn get_string(item: &Item, attr: &str) -> StoreResult<String> {
    match item.get(attr) {
        Some(AttributeValue::S(s)) => Ok(s.clone()),
        Some(_) => Err(StoreError::InvalidData(format!("{attr} is not a string"))),
        None => Err(StoreError::InvalidData(format!("missing attribute {attr}"))),
    }
}

fn get_optional_string(item: &Item, attr: &str) -> Option<String> {
    match item.get(attr) {
        Some(AttributeValue::S(s)) => Some(s.clone()),
        _ => None,
    }
}

pub fn record_to_item(record: &UserRecord) -> StoreResult<Item> {
    let mut item = key_for(&record.email);
    if let Some(name) = &record.name {
        item.insert(NAME.to_string(), AttributeValue::S(name.clone()));
    }
    item.insert(
        PASSWORD.to_string(),
        AttributeValue::S(record.password_hash.clone()),
    );
    item.insert(
        CREATED_AT.to_string(),
        AttributeValue::S(format_ts(record.created_at)?),
    );
    item.insert(
        UPDATED_AT.to_string(),
        AttributeValue::S(format_ts(record.updated_at)?),
    );
    Ok(item)
}

pub fn item_to_record(item: &Item) -> StoreResult<UserRecord> {
    let created_at = parse_ts(item, CREATED_AT)?;
    // Items written before timestamps were tracked only carry created_at.
    let updated_at = match item.get(UPDATED_AT) {
        Some(_) => parse_ts(item, UPDATED_AT)?,
        None => created_at,
    };
    Ok(UserRecord {
        id: None,
        name: get_optional_string(item, NAME),
        email: get_string(item, EMAIL)?,
        password_hash: get_string(item, PASSWORD)?,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record() -> UserRecord {
        UserRecord {
            id: None,
            name: Some("Ada".into()),
            email: "ada@x.io".into(),
            password_hash: "$argon2id$digest".into(),
            created_at: datetime!(2024-05-01 10:00 UTC),
            updated_at: datetime!(2024-05-02 11:30 UTC),
        }
    }

    #[test]
    fn item_uses_email_as_key_and_fixed_attribute_names() {
        let item = record_to_item(&record()).unwrap();
        assert_eq!(item.get(EMAIL), Some(&AttributeValue::S("ada@x.io".into())));
        assert_eq!(item.get(NAME), Some(&AttributeValue::S("Ada".into())));
        assert_eq!(
            item.get(CREATED_AT),
            Some(&AttributeValue::S("2024-05-01T10:00:00Z".into()))
        );
        assert_eq!(item.len(), 5);
    }

    #[test]
    fn unnamed_users_have_no_fullname_attribute() {
        let mut r = record();
        r.name = None;
        let item = record_to_item(&r).unwrap();
        assert!(!item.contains_key(NAME));
        assert_eq!(item_to_record(&item).unwrap().name, None);
    }

    #[test]
    fn item_maps_back_to_record() {
        let original = record();
        let back = item_to_record(&record_to_item(&original).unwrap()).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn missing_or_mistyped_attributes_are_invalid_data() {
        let mut item = record_to_item(&record()).unwrap();
        item.remove(PASSWORD);
        assert!(matches!(item_to_record(&item), Err(StoreError::InvalidData(_))));

        let mut item = record_to_item(&record()).unwrap();
        item.insert(EMAIL.into(), AttributeValue::N("1".into()));
        assert!(matches!(item_to_record(&item), Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn legacy_items_without_updated_at_fall_back_to_created_at() {
        let mut item = record_to_item(&record()).unwrap();
        item.remove(UPDATED_AT);
        let r = item_to_record(&item).unwrap();
        assert_eq!(r.updated_at, r.created_at);
    }
}
