//! User commands.

use roster_store::Store;
use roster_types::UserRecord;
use roster_types::api::RegisterRequest;
use roster_users::{UserRow, UserService};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Register a user and log the stored record.
pub async fn add<S: Store>(
    users: &UserService<S>,
    cancel: &CancellationToken,
    table: &str,
    email: String,
    first_name: String,
    last_name: String,
) -> anyhow::Result<UserRecord> {
    info!("Executing the add command");

    let req = RegisterRequest {
        email,
        first_name,
        last_name,
    };
    let user = users.create(cancel, table, &req).await?;

    info!("User created: {}", serde_json::to_string(&user)?);
    info!("Activation token: {}", user.id);
    Ok(user)
}

pub async fn activate<S: Store>(
    users: &UserService<S>,
    cancel: &CancellationToken,
    table: &str,
    email: &str,
    token: &str,
) -> anyhow::Result<()> {
    info!("Executing the activate command");

    users
        .activate(cancel, table, &email.to_lowercase(), token)
        .await?;

    info!("User activated");
    Ok(())
}

pub async fn show<S: Store>(
    users: &UserService<S>,
    cancel: &CancellationToken,
    table: &str,
    email: &str,
) -> anyhow::Result<Vec<UserRow>> {
    let rows = users.rows(cancel, table, email).await?;
    if rows.is_empty() {
        info!("No rows stored for {}", email);
    }

    for row in &rows {
        match row {
            UserRow::Profile(user) => info!("Profile: {}", serde_json::to_string(user)?),
            UserRow::Token { owner_id, .. } => info!("Outstanding activation token: {}", owner_id),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use roster_store::MemoryStore;
    use roster_users::UserError;

    use super::*;

    #[tokio::test]
    async fn add_activate_show() {
        let users = UserService::new(MemoryStore::new());
        let cancel = CancellationToken::new();

        let user = add(
            &users,
            &cancel,
            "User",
            "Test@User.com".into(),
            "Test".into(),
            "User".into(),
        )
        .await
        .unwrap();

        let rows = show(&users, &cancel, "User", "test@user.com").await.unwrap();
        assert_eq!(rows.len(), 2);

        activate(&users, &cancel, "User", "TEST@USER.COM", &user.id.to_string())
            .await
            .unwrap();

        let rows = show(&users, &cancel, "User", "test@user.com").await.unwrap();
        assert!(matches!(rows.as_slice(), [UserRow::Profile(u)] if u.active));
    }

    #[tokio::test]
    async fn errors_keep_their_kind() {
        let users = UserService::new(MemoryStore::new());
        let cancel = CancellationToken::new();

        let err = add(&users, &cancel, "", "a@b.co".into(), "A".into(), "B".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UserError>(),
            Some(UserError::TableNameEmpty)
        ));

        let err = activate(&users, &cancel, "User", "nobody@user.com", "t")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UserError>(),
            Some(UserError::UserNotFound)
        ));
    }
}
