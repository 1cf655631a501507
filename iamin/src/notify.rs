//! Out-of-band owner notifications for spot requests.

use crate::config::SmtpConfig;
use futures::future::BoxFuture;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

/// Notification failures. Logged by callers; never shown to guests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Sender or recipient could not be parsed
    #[error("Invalid address: {0}")]
    Address(String),

    /// Message could not be assembled
    #[error("Failed to build email: {0}")]
    Build(String),

    /// Relay refused or unreachable
    #[error("Failed to send email: {0}")]
    Transport(String),
}

/// A guest asked for a spot on a full event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitlistNotice {
    /// Host address
    pub owner_email: String,
    /// Event title
    pub event_title: String,
    /// Public link of the event
    pub event_url: String,
    /// Guest name
    pub name: String,
    /// Guest phone
    pub phone: String,
    /// Optional note from the guest
    pub message: Option<String>,
}

impl WaitlistNotice {
    fn subject(&self) -> String {
        format!("Someone wants a spot at {}", self.event_title)
    }

    fn body(&self) -> String {
        let note = self
            .message
            .as_deref()
            .map(|m| format!("\nTheir note:\n{m}\n"))
            .unwrap_or_default();
        format!(
            "{name} ({phone}) asked for a spot at \"{title}\", which is full.\n{note}\nEvent page: {url}\n",
            name = self.name,
            phone = self.phone,
            title = self.event_title,
            url = self.event_url,
        )
    }
}

/// Delivers [`WaitlistNotice`]s to event hosts.
pub trait OwnerNotifier: Send + Sync {
    /// Send one notice.
    fn notify(&self, notice: WaitlistNotice) -> BoxFuture<'_, Result<(), NotifyError>>;
}

/// SMTP relay notifier.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpNotifier {
    /// Build a notifier for the configured relay.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Transport`] if the relay host is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: format!("{} <{}>", config.from_name, config.from_email),
        })
    }

    fn build_message(&self, notice: &WaitlistNotice) -> Result<Message, NotifyError> {
        Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| NotifyError::Address(format!("from: {e}")))?,
            )
            .to(notice
                .owner_email
                .parse()
                .map_err(|e| NotifyError::Address(format!("to: {e}")))?)
            .subject(notice.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(notice.body())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

impl OwnerNotifier for SmtpNotifier {
    fn notify(&self, notice: WaitlistNotice) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async move {
            let email = self.build_message(&notice)?;
            self.transport
                .send(email)
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            tracing::info!(event = %notice.event_title, "Owner notified of spot request");
            Ok(())
        })
    }
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

/// Logs notices instead of sending them. Used when no relay is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleNotifier;

impl OwnerNotifier for ConsoleNotifier {
    fn notify(&self, notice: WaitlistNotice) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async move {
            tracing::info!(
                to = %notice.owner_email,
                subject = %notice.subject(),
                body = %notice.body(),
                "Owner notification (console)"
            );
            Ok(())
        })
    }
}
