use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Email, UserRecord};

// -- Registration --

/// Raw registration fields. Missing fields deserialize as empty strings so
/// the validation pipeline, not the JSON decoder, reports them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

// -- Lookup --

/// A user as shown over HTTP. Leaves out the id, which is the activation
/// token and must only reach the mailbox owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub created: NaiveDate,
}

impl From<UserRecord> for UserProfile {
    fn from(user: UserRecord) -> Self {
        Self {
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            active: user.active,
            created: user.created,
        }
    }
}

// -- Activation --

/// Query string of an activation link: `?email=<email>&token=<id>`.
#[derive(Debug, Default, Deserialize)]
pub struct ActivateQuery {
    pub email: Option<String>,
    pub token: Option<String>,
}

/// Plain `{status, message}` body used for activation and for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: u16,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn profile_hides_the_activation_token() {
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: Email::parse("test@user.com").unwrap(),
            first_name: "Test".into(),
            last_name: "User".into(),
            active: false,
            created: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        let token = user.id.to_string();

        let body = serde_json::to_value(UserProfile::from(user)).unwrap();
        assert!(body.get("id").is_none());
        assert!(!body.to_string().contains(&token));
        assert_eq!(body["firstName"], "Test");
        assert_eq!(body["created"], "2024-03-01");
    }

    #[test]
    fn register_request_rejects_unknown_fields() {
        let req: RegisterRequest = serde_json::from_str(r#"{"email":"a@b.co"}"#).unwrap();
        assert_eq!(req.first_name, "");
        assert!(serde_json::from_str::<RegisterRequest>(r#"{"id":"x"}"#).is_err());
    }
}
