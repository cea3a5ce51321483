use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::TelegramConfig;
use crate::error::NotifyError;
use crate::models::{escape_markdown, AlertMessage};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers an already formatted message to the operator channel.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;

    fn name(&self) -> &'static str;
}

pub struct TelegramTransport {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramTransport {
    pub fn new(api_base: &str, token: &str, chat_id: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl AlertTransport for TelegramTransport {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        // The endpoint embeds the bot token, so reqwest errors are logged without their url.
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: TelegramResponse = resp.json().await.map_err(|e| NotifyError::Transport(e.without_url()))?;
        if !body.ok {
            return Err(NotifyError::Api(
                body.description.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

/// Fallback when no chat credentials are configured: alerts only reach the log.
pub struct LogTransport;

#[async_trait]
impl AlertTransport for LogTransport {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        warn!(alert = %text, "no notification channel configured");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn AlertTransport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn AlertTransport>) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &TelegramConfig) -> Result<Self, reqwest::Error> {
        let transport: Arc<dyn AlertTransport> = match config.credentials() {
            Some((token, chat_id)) => Arc::new(TelegramTransport::new(&config.api_base, token, chat_id)?),
            None => {
                warn!("TELEGRAM_TOKEN or ADMIN_CHAT_ID missing, alerts will only be logged");
                Arc::new(LogTransport)
            }
        };
        info!(transport = transport.name(), "notifier ready");
        Ok(Self::new(transport))
    }

    /// Sends one alert and reports whether it was delivered. Transport failures
    /// are logged and swallowed.
    pub async fn alert(&self, message: &AlertMessage) -> bool {
        match self.transport.send(&message.render()).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    target_name = %message.target_name,
                    transport = self.transport.name(),
                    error = %e,
                    "could not deliver alert to operator"
                );
                false
            }
        }
    }

    pub async fn started(&self, service_name: &str, target_count: usize) {
        let text = format!(
            "\u{1f7e2} *{}* started and watching {} services.",
            escape_markdown(service_name),
            target_count
        );
        if let Err(e) = self.transport.send(&text).await {
            error!(transport = self.transport.name(), error = %e, "could not deliver startup notification");
        }
    }
}
