use roster_types::api::RegisterRequest;
use roster_types::{Email, EmailError};

use crate::UserError;

/// Registration input that passed [`validate`]. The email is normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRegistration {
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
}

/// Check registration input. Rules run in a fixed order and the first
/// failure is returned: first name, last name, email presence, email syntax.
pub fn validate(req: &RegisterRequest) -> Result<ValidatedRegistration, UserError> {
    if req.first_name.is_empty() {
        return Err(UserError::FirstNameEmpty);
    }
    if req.last_name.is_empty() {
        return Err(UserError::LastNameEmpty);
    }

    let email = Email::parse(&req.email).map_err(|e| match e {
        EmailError::Empty => UserError::EmailEmpty,
        _ => UserError::InvalidEmail,
    })?;

    Ok(ValidatedRegistration {
        email,
        first_name: req.first_name.clone(),
        last_name: req.last_name.clone(),
    })
}
