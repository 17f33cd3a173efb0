//! Email delivery via SMTP.
//!
//! [`SmtpSender`] wraps the `lettre` async SMTP transport to deliver
//! assembled [`EmailPayload`]s. Configuration is loaded from environment
//! variables; if `SMTP_HOST` is not set, [`EmailConfig::from_env`] returns
//! `None` and no sender should be constructed.

use async_trait::async_trait;

use crate::payload::{EmailPayload, KEY_NOTIFIER_CATEGORY};
use crate::sources::{EmailSender, SendError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for SMTP delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP transport failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled from the payload.
    #[error("Could not assemble message: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// STARTTLS submission port.
const DEFAULT_SMTP_PORT: u16 = 587;

const DEFAULT_FROM_ADDRESS: &str = "noreply@scanmail.local";

/// Connection settings for the SMTP relay.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    /// Username/password pair; authenticated submission only when present.
    pub credentials: Option<(String, String)>,
}

impl EmailConfig {
    /// Read settings from the `SMTP_*` environment variables.
    ///
    /// `SMTP_HOST` gates the whole feature: without it this returns `None`
    /// and no sender should be constructed. `SMTP_PORT` defaults to 587 and
    /// `SMTP_FROM` to a local noreply address. Credentials are picked up
    /// only when both `SMTP_USER` and `SMTP_PASSWORD` are set; one without
    /// the other is treated as unauthenticated.
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        let smtp_port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT);
        let from_address =
            std::env::var("SMTP_FROM").unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string());
        let credentials = match (std::env::var("SMTP_USER"), std::env::var("SMTP_PASSWORD")) {
            (Ok(user), Ok(password)) => Some((user, password)),
            _ => None,
        };
        Some(Self {
            smtp_host,
            smtp_port,
            from_address,
            credentials,
        })
    }
}

// ---------------------------------------------------------------------------
// SmtpSender
// ---------------------------------------------------------------------------

/// Sends notification emails over SMTP.
pub struct SmtpSender {
    config: EmailConfig,
}

impl SmtpSender {
    /// Create a new sender with the given configuration.
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    async fn deliver(&self, payload: &EmailPayload) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let category = payload
            .model
            .get(KEY_NOTIFIER_CATEGORY)
            .and_then(|v| v.as_str())
            .unwrap_or("NOTIFICATION");
        let subject = format!("[scanmail] {category}");
        let body = serde_json::to_string_pretty(&payload.model)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut builder = Message::builder()
            .from(self.config.from_address.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &payload.recipients {
            builder = builder.to(recipient.parse()?);
        }
        let email = builder
            .body(body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);
        if let Some((user, password)) = &self.config.credentials {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await?;

        tracing::info!(
            recipients = payload.recipients.len(),
            template = %payload.template_name,
            "Notification email sent"
        );
        Ok(())
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    async fn send(&self, payload: &EmailPayload) -> Result<(), SendError> {
        if payload.is_noop() {
            tracing::debug!(template = %payload.template_name, "Skipping payload with no recipients");
            return Ok(());
        }
        self.deliver(payload)
            .await
            .map_err(|e| SendError(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
