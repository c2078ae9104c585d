use async_trait::async_trait;
use tracing::info;

use crate::NotifyError;

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Delivery of outgoing mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), NotifyError>;
}

/// Writes each message to the log instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), NotifyError> {
        info!(
            sender = %message.sender,
            recipient = %message.recipient,
            subject = %message.subject,
            "Sending email: {}",
            message.text_body
        );
        Ok(())
    }
}
