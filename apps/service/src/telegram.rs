//! Minimal Telegram Bot API client used for notifications and commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::monitoring::types::TenantId;
use crate::notifier::{FormatHint, NotificationSink, NotifyError};

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self, NotifyError> {
        // long polls must not be cut off by the client timeout
        let http = reqwest::Client::builder().timeout(poll_timeout + Duration::from_secs(10)).build()?;

        Ok(Self {
            http,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            poll_timeout,
        })
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: FormatHint,
    ) -> Result<(), NotifyError> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: match format {
                FormatHint::Html => Some("HTML"),
                FormatHint::Plain => None,
            },
            disable_web_page_preview: true,
        };

        let _: Message = self.call("sendMessage", &body).await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, NotifyError> {
        let body = GetUpdates {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: ["message"],
        };

        self.call("getUpdates", &body).await
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, NotifyError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response: ApiResponse<T> = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(body)
            .send()
            .await?
            .json()
            .await?;

        match (response.ok, response.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(NotifyError::Api(
                response.description.unwrap_or_else(|| format!("{method} failed")),
            )),
        }
    }
}

/// Notification sink delivering to the tenant's Telegram chat
pub struct TelegramSink {
    client: std::sync::Arc<TelegramClient>,
}

impl TelegramSink {
    pub fn new(client: std::sync::Arc<TelegramClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, tenant: TenantId, text: &str, format: FormatHint) -> Result<(), NotifyError> {
        self.client.send_message(tenant.0, text, format).await
    }
}
