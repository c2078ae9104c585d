use roster_store::StoreError;

/// Everything the user operations can fail with. Adapters match on the
/// variant (or on [`UserError::code`]), never on the message.
#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("first name is empty")]
    FirstNameEmpty,

    #[error("last name is empty")]
    LastNameEmpty,

    #[error("email is empty")]
    EmailEmpty,

    #[error("email is not a valid address")]
    InvalidEmail,

    #[error("user table name is empty")]
    TableNameEmpty,

    /// The email is already registered.
    #[error("a user with this email already exists")]
    DuplicateUser,

    #[error("user not found")]
    UserNotFound,

    #[error("user is already active")]
    UserAlreadyActive,

    /// Wrong token, or another activation got there first.
    #[error("user could not be activated")]
    ActivateUserFailed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("stored user record is malformed: {0}")]
    MalformedRecord(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UserError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FirstNameEmpty => "FirstNameIsEmpty",
            Self::LastNameEmpty => "LastNameIsEmpty",
            Self::EmailEmpty => "EmailIsEmpty",
            Self::InvalidEmail => "InvalidEmail",
            Self::TableNameEmpty => "UserTableNameIsEmpty",
            Self::DuplicateUser => "DuplicateUser",
            Self::UserNotFound => "UserNotFound",
            Self::UserAlreadyActive => "UserAlreadyActive",
            Self::ActivateUserFailed => "ActivateUserFailed",
            Self::Cancelled => "Cancelled",
            Self::MalformedRecord(_) => "MalformedRecord",
            Self::Store(_) => "StoreError",
        }
    }

    /// True for errors caused by the caller's input or by the state of the
    /// user being operated on. Everything else is a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::FirstNameEmpty
                | Self::LastNameEmpty
                | Self::EmailEmpty
                | Self::InvalidEmail
                | Self::DuplicateUser
                | Self::UserNotFound
                | Self::UserAlreadyActive
                | Self::ActivateUserFailed
        )
    }
}
