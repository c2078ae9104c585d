use std::future::Future;

use chrono::Utc;
use roster_store::{AttributeValue, Condition, Item, Store, StoreError, WriteOp};
use roster_types::api::RegisterRequest;
use roster_types::{Email, EmailError, UserRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::record::{self, ACTIVE, UserRow};
use crate::{UserError, validate};

/// Registration, lookup and activation against one store.
///
/// Holds no state besides the store handle; every call is one request or
/// one transaction, attempted once.
#[derive(Clone)]
pub struct UserService<S> {
    store: S,
}

impl<S: Store> UserService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Register a new, inactive user together with its activation token.
    ///
    /// The profile and token rows are written in one transaction, each
    /// guarded by "key does not exist". A rejected transaction therefore
    /// means the email is taken and is reported as
    /// [`UserError::DuplicateUser`].
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        table: &str,
        req: &RegisterRequest,
    ) -> Result<UserRecord, UserError> {
        check_table(table)?;
        let valid = validate(req)?;

        let user = UserRecord {
            id: Uuid::new_v4(),
            email: valid.email,
            first_name: valid.first_name,
            last_name: valid.last_name,
            active: false,
            created: Utc::now().date_naive(),
        };
        debug!(email = %user.email, id = %user.id, "Creating user");

        let ops = vec![
            WriteOp::Put {
                item: record::profile_item(&user),
                condition: Some(Condition::NotExists),
            },
            WriteOp::Put {
                item: record::token_item(&user),
                condition: Some(Condition::NotExists),
            },
        ];

        match guarded(cancel, self.store.transact_write(table, ops)).await {
            Ok(()) => {}
            Err(UserError::Store(e)) if e.is_condition_failure() => {
                debug!(email = %user.email, "Email already registered");
                return Err(UserError::DuplicateUser);
            }
            Err(e) => return Err(e),
        }

        info!(email = %user.email, id = %user.id, "User created");
        Ok(user)
    }

    /// Read the profile stored for `email`.
    pub async fn load(
        &self,
        cancel: &CancellationToken,
        table: &str,
        email: &str,
    ) -> Result<UserRecord, UserError> {
        check_table(table)?;
        let email = lookup_email(email)?;

        let item = guarded(cancel, self.store.get(table, &record::profile_key(&email)))
            .await?
            .ok_or(UserError::UserNotFound)?;

        record::user_from_item(&item)
    }

    /// Consume the activation token of a pending user.
    ///
    /// Fails with [`UserError::UserAlreadyActive`] when the stored profile is
    /// already active. Otherwise the profile update (guarded by
    /// `active == false`) and the deletion of `TOKEN#<token>` (guarded by the
    /// row existing) commit together; a wrong token and a lost race both
    /// surface as [`UserError::ActivateUserFailed`].
    pub async fn activate(
        &self,
        cancel: &CancellationToken,
        table: &str,
        email: &str,
        token: &str,
    ) -> Result<(), UserError> {
        let user = self.load(cancel, table, email).await?;
        if user.active {
            return Err(UserError::UserAlreadyActive);
        }

        let ops = vec![
            WriteOp::Update {
                key: record::profile_key(&user.email),
                set: Item::from([(ACTIVE.to_string(), AttributeValue::Bool(true))]),
                condition: Some(Condition::equals(ACTIVE, false)),
            },
            WriteOp::Delete {
                key: record::token_key(&user.email, token),
                condition: Some(Condition::Exists),
            },
        ];

        match guarded(cancel, self.store.transact_write(table, ops)).await {
            Ok(()) => {}
            Err(UserError::Store(e)) if e.is_condition_failure() => {
                warn!(email = %user.email, "Activation rejected");
                return Err(UserError::ActivateUserFailed);
            }
            Err(e) => return Err(e),
        }

        info!(email = %user.email, id = %user.id, "User activated");
        Ok(())
    }

    /// Every row of the user's partition: the profile and any outstanding
    /// token.
    pub async fn rows(
        &self,
        cancel: &CancellationToken,
        table: &str,
        email: &str,
    ) -> Result<Vec<UserRow>, UserError> {
        check_table(table)?;
        let email = lookup_email(email)?;

        let items = guarded(
            cancel,
            self.store.query(table, &record::partition_key(&email)),
        )
        .await?;

        items.iter().map(UserRow::from_item).collect()
    }
}

fn check_table(table: &str) -> Result<(), UserError> {
    if table.is_empty() {
        return Err(UserError::TableNameEmpty);
    }
    Ok(())
}

/// Normalize an email used as a lookup key. An address that does not parse
/// cannot have been registered.
fn lookup_email(email: &str) -> Result<Email, UserError> {
    Email::parse(email).map_err(|e| match e {
        EmailError::Empty => UserError::EmailEmpty,
        _ => UserError::UserNotFound,
    })
}

/// Run one store call unless `cancel` has fired. A call that is in flight
/// when `cancel` fires is abandoned and reported as cancelled; whether it
/// took effect is not checked.
async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> Result<T, UserError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    if cancel.is_cancelled() {
        return Err(UserError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UserError::Cancelled),
        res = call => res.map_err(UserError::from),
    }
}
