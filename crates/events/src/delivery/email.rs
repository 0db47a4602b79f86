//! Email delivery via SMTP.
//!
//! [`EmailSender`] wraps the `lettre` async SMTP transport. Addresses come
//! from the recipient directory. If `SMTP_HOST` is not set,
//! [`EmailConfig::from_env`] returns `None` and no email sender is
//! registered, so email channels fail as "no sender".

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::channels::Channel;
use lettre::message::{header::ContentType, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{ChannelSender, OutboundMessage, SendError};
use crate::store::RecipientStore;

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@courier.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set.
    ///
    /// | Variable        | Required | Default                  |
    /// |-----------------|----------|--------------------------|
    /// | `SMTP_HOST`     | yes      |                          |
    /// | `SMTP_PORT`     | no       | `587`                    |
    /// | `SMTP_FROM`     | no       | `noreply@courier.local`  |
    /// | `SMTP_USER`     | no       |                          |
    /// | `SMTP_PASSWORD` | no       |                          |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailSender
// ---------------------------------------------------------------------------

pub struct EmailSender {
    config: EmailConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    recipients: Arc<dyn RecipientStore>,
}

impl EmailSender {
    /// Build the SMTP transport. Nothing connects until the first send.
    pub fn new(
        config: EmailConfig,
        recipients: Arc<dyn RecipientStore>,
    ) -> Result<Self, SendError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| SendError::Build(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            config,
            recipients,
        })
    }

    fn build_message(&self, to: &str, message: &OutboundMessage) -> Result<Message, SendError> {
        let from = self
            .config
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| SendError::Build(e.to_string()))?;
        let to = to
            .parse()
            .map_err(|e: lettre::address::AddressError| SendError::Build(e.to_string()))?;
        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone());

        let built = match &message.html {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            ),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.body.clone()),
        };
        built.map_err(|e| SendError::Build(e.to_string()))
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let address = self
            .recipients
            .find(message.user_id)
            .await?
            .and_then(|r| r.email)
            .ok_or(SendError::MissingAddress {
                channel: Channel::Email,
                user_id: message.user_id,
            })?;

        let email = self.build_message(&address, message)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        tracing::info!(user_id = message.user_id, subject = %message.subject, "Email sent");
        Ok(())
    }
}
