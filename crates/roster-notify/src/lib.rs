//! Change-stream consumer that mails activation links.
//!
//! A new profile row gets an email carrying
//! `<activation-url>?email=<email>&token=<id>`; a profile whose `active` flag
//! flips to true gets a confirmation. Every other change is ignored.

pub mod mailer;

use askama::Template;
use roster_store::{StreamEvent, StreamRecord};
use roster_types::UserRecord;
use roster_users::{UserError, record};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub use mailer::{LogMailer, MailMessage, Mailer};

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("invalid activation url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("could not decode user from stream record: {0}")]
    Decode(#[from] UserError),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Template)]
#[template(path = "email/activation.html")]
struct ActivationEmailHtml<'a> {
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/activation.txt")]
struct ActivationEmailText<'a> {
    link: &'a str,
}

/// HTML templates escape their fields; the first name is free-form input.
#[derive(Template)]
#[template(path = "email/activated.html")]
struct ActivatedEmailHtml<'a> {
    first_name: &'a str,
}

#[derive(Template)]
#[template(path = "email/activated.txt")]
struct ActivatedEmailText<'a> {
    first_name: &'a str,
}

/// What a stream record led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ActivationLink { recipient: String, link: Url },
    Activated { recipient: String },
}

pub struct Notifier<M> {
    mailer: M,
    activation_url: Url,
    sender: String,
    table: String,
}

impl<M: Mailer> Notifier<M> {
    pub fn new(
        mailer: M,
        activation_url: &str,
        sender: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            mailer,
            activation_url: Url::parse(activation_url)?,
            sender: sender.into(),
            table: table.into(),
        })
    }

    /// Link that activates `user` when followed.
    pub fn activation_link(&self, user: &UserRecord) -> Url {
        let mut link = self.activation_url.clone();
        link.query_pairs_mut()
            .append_pair("email", user.email.as_str())
            .append_pair("token", &user.id.to_string());
        link
    }

    /// Process one stream record, sending mail when it calls for one.
    pub async fn handle(&self, change: &StreamRecord) -> Result<Option<Notification>, NotifyError> {
        if change.table != self.table {
            return Ok(None);
        }
        let Some(new_image) = change.new_image.as_ref().filter(|i| record::is_profile(i)) else {
            return Ok(None);
        };

        match change.event {
            StreamEvent::Insert => {
                let user = record::user_from_item(new_image)?;
                let link = self.activation_link(&user);
                debug!(email = %user.email, "Sending activation link");

                let html_body = ActivationEmailHtml { link: link.as_str() }.render()?;
                let text_body = ActivationEmailText { link: link.as_str() }.render()?;
                self.mailer
                    .send(&MailMessage {
                        sender: self.sender.clone(),
                        recipient: user.email.to_string(),
                        subject: "Activate account".into(),
                        html_body,
                        text_body,
                    })
                    .await?;

                Ok(Some(Notification::ActivationLink {
                    recipient: user.email.into_inner(),
                    link,
                }))
            }
            StreamEvent::Modify => {
                let user = record::user_from_item(new_image)?;
                let was_active = change
                    .old_image
                    .as_ref()
                    .map(record::user_from_item)
                    .transpose()?
                    .is_some_and(|old| old.active);
                if was_active || !user.active {
                    return Ok(None);
                }

                let first_name = user.first_name.as_str();
                let html_body = ActivatedEmailHtml { first_name }.render()?;
                let text_body = ActivatedEmailText { first_name }.render()?;
                self.mailer
                    .send(&MailMessage {
                        sender: self.sender.clone(),
                        recipient: user.email.to_string(),
                        subject: "Account activated".into(),
                        html_body,
                        text_body,
                    })
                    .await?;

                Ok(Some(Notification::Activated {
                    recipient: user.email.into_inner(),
                }))
            }
            StreamEvent::Remove => Ok(None),
        }
    }

    /// Consume the stream until `cancel` fires or the stream closes. A
    /// record that fails to process is logged and skipped.
    pub async fn run(self, mut rx: broadcast::Receiver<StreamRecord>, cancel: CancellationToken) {
        info!("Notifier listening on table {}", self.table);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = rx.recv() => {
                    let change = match result {
                        Ok(change) => change,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Notifier lagged by {} records", n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    match self.handle(&change).await {
                        Ok(Some(notification)) => debug!(?notification, "Notification sent"),
                        Ok(None) => {}
                        Err(e) => warn!(pk = %change.keys.pk, "Failed to process stream record: {}", e),
                    }
                }
            }
        }

        info!("Notifier stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use roster_store::{AttributeValue, Item, Key, MemoryStore, Store};
    use roster_types::api::RegisterRequest;
    use roster_users::UserService;

    use super::*;

    const URL: &str = "http://localhost:3000/users/activate";

    #[derive(Clone, Default)]
    struct RecordingMailer {
        sent: Arc<Mutex<Vec<MailMessage>>>,
    }

    impl RecordingMailer {
        fn sent(&self) -> Vec<MailMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &MailMessage) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn notifier(mailer: RecordingMailer) -> Notifier<RecordingMailer> {
        Notifier::new(mailer, URL, "no-reply@roster.dev", "User").unwrap()
    }

    fn registration() -> RegisterRequest {
        RegisterRequest {
            email: "Test+1@User.com".into(),
            first_name: "Test".into(),
            last_name: "User".into(),
        }
    }

    #[test]
    fn link_is_percent_encoded() {
        let user = UserRecord {
            id: uuid::Uuid::nil(),
            email: roster_types::Email::parse("test+1@user.com").unwrap(),
            first_name: "Test".into(),
            last_name: "User".into(),
            active: false,
            created: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };
        let link = notifier(RecordingMailer::default()).activation_link(&user);
        assert_eq!(
            link.as_str(),
            "http://localhost:3000/users/activate?email=test%2B1%40user.com&token=00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(matches!(
            Notifier::new(LogMailer, "not a url", "a@b.co", "User"),
            Err(NotifyError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn registration_and_activation_send_mail() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        let users = UserService::new(store.clone());
        let cancel = CancellationToken::new();
        let mailer = RecordingMailer::default();
        let notifier = notifier(mailer.clone());

        let user = users.create(&cancel, "User", &registration()).await.unwrap();

        // Profile insert, then token insert
        let first = notifier.handle(&rx.recv().await.unwrap()).await.unwrap();
        let token_row = notifier.handle(&rx.recv().await.unwrap()).await.unwrap();
        assert!(token_row.is_none());

        match first {
            Some(Notification::ActivationLink { recipient, link }) => {
                assert_eq!(recipient, "test+1@user.com");
                let pairs: Vec<_> = link.query_pairs().into_owned().collect();
                assert_eq!(
                    pairs,
                    vec![
                        ("email".to_string(), "test+1@user.com".to_string()),
                        ("token".to_string(), user.id.to_string()),
                    ]
                );
            }
            other => panic!("expected activation link, got {other:?}"),
        }

        users
            .activate(&cancel, "User", "test+1@user.com", &user.id.to_string())
            .await
            .unwrap();
        let mut outcomes = vec![];
        while let Ok(record) = rx.try_recv() {
            outcomes.push(notifier.handle(&record).await.unwrap());
        }
        assert_eq!(
            outcomes,
            vec![
                Some(Notification::Activated {
                    recipient: "test+1@user.com".into()
                }),
                None,
            ]
        );

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "Activate account");
        assert_eq!(sent[0].sender, "no-reply@roster.dev");
        assert!(sent[0].text_body.contains(&user.id.to_string()));
        assert_eq!(sent[1].subject, "Account activated");
    }

    #[tokio::test]
    async fn other_tables_are_ignored() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        let users = UserService::new(store.clone());
        users
            .create(&CancellationToken::new(), "Staging", &registration())
            .await
            .unwrap();

        let notifier = notifier(RecordingMailer::default());
        assert_eq!(notifier.handle(&rx.recv().await.unwrap()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn run_skips_bad_records_and_stops_on_cancel() {
        let store = MemoryStore::new();
        let rx = store.subscribe();
        let mailer = RecordingMailer::default();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(notifier(mailer.clone()).run(rx, cancel.clone()));

        // A profile row missing most attributes
        let mut broken: Item = Key::new("USER#x@y.co", "PROFILE#").to_item();
        broken.insert("type".into(), AttributeValue::S("PROFILE".into()));
        store.put("User", broken, None).await.unwrap();

        UserService::new(store.clone())
            .create(&CancellationToken::new(), "User", &registration())
            .await
            .unwrap();

        for _ in 0..100 {
            if !mailer.sent().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(mailer.sent().len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn names_are_escaped_in_html_mail() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        let users = UserService::new(store.clone());
        let cancel = CancellationToken::new();
        let mailer = RecordingMailer::default();
        let notifier = notifier(mailer.clone());

        let req = RegisterRequest {
            first_name: r#"<a href="http://evil">x</a>"#.into(),
            ..registration()
        };
        let user = users.create(&cancel, "User", &req).await.unwrap();
        users
            .activate(&cancel, "User", "test+1@user.com", &user.id.to_string())
            .await
            .unwrap();
        while let Ok(change) = rx.try_recv() {
            notifier.handle(&change).await.unwrap();
        }

        let sent = mailer.sent();
        let activated = sent
            .iter()
            .find(|m| m.subject == "Account activated")
            .unwrap();
        assert!(!activated.html_body.contains("<a"));
        assert!(activated.html_body.contains("&lt;a href="));
        assert!(activated.html_body.starts_with("<p>Welcome, "));

        // The link's query separator is escaped too, not dropped
        let link = sent.iter().find(|m| m.subject == "Activate account").unwrap();
        assert!(link.html_body.contains("&amp;token="));
        assert!(link.text_body.contains("&token="));
    }
}
