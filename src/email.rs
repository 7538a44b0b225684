//! Outgoing email port.
//!
//! Delivery is fire-and-forget from the engine's point of view: an [`EmailSender`]
//! reports success or failure as a `bool` and never returns an error, so a broken
//! transport can only ever cause a reminder to be retried on the next run.

use crate::config::engine::EmailConfig;
use async_trait::async_trait;
use tracing::info;

/// A rendered email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
}

/// Delivers emails. Implementations must not panic and must not block indefinitely.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends `message`, returning `true` only when delivery was accepted.
    async fn send_email(&self, message: &EmailMessage) -> bool;
}

/// Sender that writes every message to the log instead of a mail transport.
///
/// Used by the worker when no real transport is wired in.
#[derive(Debug, Clone)]
pub struct LogEmailSender {
    from: String,
}

impl LogEmailSender {
    /// Creates a log sender using the configured sender identity.
    #[must_use]
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            from: config.from_header(),
        }
    }
}

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_email(&self, message: &EmailMessage) -> bool {
        info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            "Email delivered to log transport"
        );
        true
    }
}
