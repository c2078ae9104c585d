//! Key schema and item encoding for user partitions.
//!
//! | row     | PK              | SK               | type      |
//! |---------|-----------------|------------------|-----------|
//! | profile | `USER#<email>`  | `PROFILE#`       | `PROFILE` |
//! | token   | `USER#<email>`  | `TOKEN#<id>`     | `TOKEN`   |
//!
//! Keys are only ever built here.

use chrono::NaiveDate;
use roster_store::item::{PARTITION_KEY, SORT_KEY};
use roster_store::{AttributeValue, Item, Key};
use roster_types::{Email, UserRecord};
use uuid::Uuid;

use crate::UserError;

const USER_PREFIX: &str = "USER#";
const PROFILE_SORT_KEY: &str = "PROFILE#";
const TOKEN_PREFIX: &str = "TOKEN#";

const TYPE: &str = "type";
const PROFILE_TYPE: &str = "PROFILE";
const TOKEN_TYPE: &str = "TOKEN";

pub(crate) const ID: &str = "id";
pub(crate) const EMAIL: &str = "email";
pub(crate) const FIRST_NAME: &str = "firstName";
pub(crate) const LAST_NAME: &str = "lastName";
pub(crate) const ACTIVE: &str = "active";
pub(crate) const CREATED: &str = "created";
pub(crate) const OWNER_ID: &str = "ownerId";

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn partition_key(email: &Email) -> String {
    format!("{USER_PREFIX}{email}")
}

pub fn profile_key(email: &Email) -> Key {
    Key::new(partition_key(email), PROFILE_SORT_KEY)
}

pub fn token_key(email: &Email, token: &str) -> Key {
    Key::new(partition_key(email), format!("{TOKEN_PREFIX}{token}"))
}

pub fn profile_item(user: &UserRecord) -> Item {
    let mut item = profile_key(&user.email).to_item();
    item.extend([
        (TYPE.to_string(), AttributeValue::from(PROFILE_TYPE)),
        (ID.to_string(), AttributeValue::S(user.id.to_string())),
        (EMAIL.to_string(), AttributeValue::S(user.email.to_string())),
        (FIRST_NAME.to_string(), AttributeValue::S(user.first_name.clone())),
        (LAST_NAME.to_string(), AttributeValue::S(user.last_name.clone())),
        (ACTIVE.to_string(), AttributeValue::Bool(user.active)),
        (
            CREATED.to_string(),
            AttributeValue::S(user.created.format(DATE_FORMAT).to_string()),
        ),
    ]);
    item
}

/// The token row of a pending user. The token value is the user's id.
pub fn token_item(user: &UserRecord) -> Item {
    let mut item = token_key(&user.email, &user.id.to_string()).to_item();
    item.extend([
        (TYPE.to_string(), AttributeValue::from(TOKEN_TYPE)),
        (OWNER_ID.to_string(), AttributeValue::S(user.id.to_string())),
        (EMAIL.to_string(), AttributeValue::S(user.email.to_string())),
    ]);
    item
}

/// One row of a user partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRow {
    Profile(UserRecord),
    Token { owner_id: String, email: String },
}

impl UserRow {
    pub fn from_item(item: &Item) -> Result<Self, UserError> {
        match string_attr(item, TYPE)? {
            PROFILE_TYPE => user_from_item(item).map(Self::Profile),
            TOKEN_TYPE => Ok(Self::Token {
                owner_id: string_attr(item, OWNER_ID)?.to_string(),
                email: string_attr(item, EMAIL)?.to_string(),
            }),
            other => Err(UserError::MalformedRecord(format!("unknown row type {other:?}"))),
        }
    }
}

/// True when `item` is a profile row.
pub fn is_profile(item: &Item) -> bool {
    item.get(TYPE).and_then(AttributeValue::as_s) == Some(PROFILE_TYPE)
        && item.get(SORT_KEY).and_then(AttributeValue::as_s) == Some(PROFILE_SORT_KEY)
}

pub fn user_from_item(item: &Item) -> Result<UserRecord, UserError> {
    if !is_profile(item) {
        let pk = item.get(PARTITION_KEY).and_then(AttributeValue::as_s).unwrap_or("?");
        return Err(UserError::MalformedRecord(format!("{pk} is not a profile row")));
    }

    let id = string_attr(item, ID)?;
    let id = Uuid::parse_str(id)
        .map_err(|e| UserError::MalformedRecord(format!("bad id {id:?}: {e}")))?;

    let email = string_attr(item, EMAIL)?;
    let email = Email::parse(email)
        .map_err(|e| UserError::MalformedRecord(format!("bad email {email:?}: {e}")))?;

    let created = string_attr(item, CREATED)?;
    let created = NaiveDate::parse_from_str(created, DATE_FORMAT)
        .map_err(|e| UserError::MalformedRecord(format!("bad created date {created:?}: {e}")))?;

    let active = item
        .get(ACTIVE)
        .and_then(AttributeValue::as_bool)
        .ok_or_else(|| missing(ACTIVE))?;

    Ok(UserRecord {
        id,
        email,
        first_name: string_attr(item, FIRST_NAME)?.to_string(),
        last_name: string_attr(item, LAST_NAME)?.to_string(),
        active,
        created,
    })
}

fn string_attr<'a>(item: &'a Item, name: &str) -> Result<&'a str, UserError> {
    item.get(name)
        .and_then(AttributeValue::as_s)
        .ok_or_else(|| missing(name))
}

fn missing(name: &str) -> UserError {
    UserError::MalformedRecord(format!("missing attribute {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: Email::parse("test@user.com").unwrap(),
            first_name: "Test".into(),
            last_name: "User".into(),
            active: false,
            created: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        }
    }

    #[test]
    fn key_schema() {
        let u = user();
        let token = u.id.to_string();
        assert_eq!(partition_key(&u.email), "USER#test@user.com");
        assert_eq!(profile_key(&u.email), Key::new("USER#test@user.com", "PROFILE#"));
        assert_eq!(
            token_key(&u.email, &token),
            Key::new("USER#test@user.com", format!("TOKEN#{token}"))
        );
    }

    #[test]
    fn profile_item_roundtrip() {
        let mut u = user();
        u.active = true;
        let item = profile_item(&u);
        assert_eq!(item.get("created"), Some(&AttributeValue::S("2024-02-29".into())));
        assert_eq!(user_from_item(&item).unwrap(), u);
    }

    #[test]
    fn token_item_shares_partition() {
        let u = user();
        let profile = Key::of(&profile_item(&u)).unwrap();
        let token = Key::of(&token_item(&u)).unwrap();
        assert_eq!(profile.pk, token.pk);
        assert_ne!(profile.sk, token.sk);

        match UserRow::from_item(&token_item(&u)).unwrap() {
            UserRow::Token { owner_id, email } => {
                assert_eq!(owner_id, u.id.to_string());
                assert_eq!(email, "test@user.com");
            }
            other => panic!("expected token row, got {other:?}"),
        }
    }

    #[test]
    fn token_item_is_not_a_profile() {
        let err = user_from_item(&token_item(&user())).unwrap_err();
        assert!(matches!(err, UserError::MalformedRecord(_)));
    }

    #[test]
    fn missing_attribute_is_malformed() {
        let mut item = profile_item(&user());
        item.remove("lastName");
        let err = user_from_item(&item).unwrap_err();
        assert_eq!(err.to_string(), "stored user record is malformed: missing attribute lastName");
    }
}
