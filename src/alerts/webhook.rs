// src/alerts/webhook.rs
//! JSON webhook sink with a short in-sink retry.
//!
//! Retries cover transient transport blips within the current attempt only;
//! the dispatcher's outer timeout still bounds the whole send.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::{NotificationSink, Tier};
use crate::error::DispatchError;

pub const ENV_WEBHOOK_URL: &str = "ALERT_WEBHOOK_URL";

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(4);
const MAX_ATTEMPTS: u8 = 2;
const RETRY_BASE_MS: u64 = 500;

pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    tier: &'a str,
    opportunity_count: usize,
}

impl WebhookSink {
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(ENV_WEBHOOK_URL).context("ALERT_WEBHOOK_URL missing")?;
        Ok(Self::new(url))
    }

    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(
        &self,
        subject: &str,
        body: &str,
        tier: Tier,
        count: usize,
    ) -> Result<(), DispatchError> {
        let payload = WebhookPayload {
            subject,
            body,
            tier: tier.as_str(),
            opportunity_count: count,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(ATTEMPT_TIMEOUT)
                .json(&payload)
                .send()
                .await;

            let err_msg = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => format!("HTTP error: {e}"),
                },
                Err(e) if e.is_timeout() => {
                    return Err(DispatchError::Timeout {
                        sink: "webhook",
                        after: ATTEMPT_TIMEOUT,
                    })
                }
                Err(e) => format!("request failed: {e}"),
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(DispatchError::Failed {
                    sink: "webhook",
                    message: err_msg,
                });
            }
            tokio::time::sleep(Duration::from_millis(RETRY_BASE_MS << (attempt - 1))).await;
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
