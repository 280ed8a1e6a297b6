// src/alerts/email.rs
//! SMTP notification sink.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{NotificationSink, Tier};
use crate::error::DispatchError;

pub const ENV_SMTP_HOST: &str = "SMTP_HOST";
pub const ENV_SMTP_USER: &str = "SMTP_USER";
pub const ENV_SMTP_PASS: &str = "SMTP_PASS";
pub const ENV_EMAIL_FROM: &str = "ALERT_EMAIL_FROM";
pub const ENV_EMAIL_TO: &str = "ALERT_EMAIL_TO";

pub struct EmailSink {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSink {
    /// All five SMTP variables are required once `SMTP_HOST` is set; a
    /// missing or malformed one aborts startup.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var(ENV_SMTP_HOST).context("SMTP_HOST missing")?;
        let user = std::env::var(ENV_SMTP_USER).context("SMTP_USER missing")?;
        let pass = std::env::var(ENV_SMTP_PASS).context("SMTP_PASS missing")?;
        let from_addr = std::env::var(ENV_EMAIL_FROM).context("ALERT_EMAIL_FROM missing")?;
        let to_addr = std::env::var(ENV_EMAIL_TO).context("ALERT_EMAIL_TO missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr.parse().context("invalid ALERT_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid ALERT_EMAIL_TO")?;
        Ok(Self { mailer, from, to })
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    async fn send(
        &self,
        subject: &str,
        body: &str,
        _tier: Tier,
        _count: usize,
    ) -> Result<(), DispatchError> {
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DispatchError::Failed {
                sink: "email",
                message: format!("build message: {e}"),
            })?;

        self.mailer
            .send(msg)
            .await
            .map_err(|e| DispatchError::Failed {
                sink: "email",
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
