use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::DeliverySink;
use crate::error::DeliveryError;
use crate::model::Destination;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage` sink.
#[derive(Clone)]
pub struct TelegramSink {
    api_base: String,
    token: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl TelegramSink {
    pub fn new(token: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Per-request timeout; a timed out attempt counts as transient.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn backoff(attempt: u8) {
        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct ApiReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait::async_trait]
impl DeliverySink for TelegramSink {
    async fn deliver(&self, destination: Destination, text: &str) -> Result<(), DeliveryError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let payload = SendMessage {
            chat_id: destination.0,
            text,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let rsp = match res {
                Ok(rsp) => rsp,
                Err(e) => {
                    if attempt < self.max_retries {
                        Self::backoff(attempt).await;
                        continue;
                    }
                    return Err(DeliveryError::Transient(format!(
                        "telegram request failed: {e}"
                    )));
                }
            };

            let status = rsp.status();
            let reply: ApiReply = rsp.json().await.unwrap_or_default();
            if status.is_success() && reply.ok {
                return Ok(());
            }

            let description = reply
                .description
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

            if status == StatusCode::FORBIDDEN || description.contains("Forbidden") {
                return Err(DeliveryError::PermanentReject {
                    destination,
                    reason: description,
                });
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < self.max_retries {
                Self::backoff(attempt).await;
                continue;
            }
            return Err(DeliveryError::Transient(format!(
                "telegram {}: {}",
                status.as_u16(),
                description
            )));
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
