//! Outbound notifications to tenants.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::monitoring::types::{ProbeOutcome, TenantId};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Notification rejected: {0}")]
    Api(String),
}

/// How the receiving channel should render the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Plain,
    Html,
}

/// Fire-and-forget delivery of a text to a tenant
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, tenant: TenantId, text: &str, format: FormatHint) -> Result<(), NotifyError>;
}

/// Sink that only writes notifications to the log
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, tenant: TenantId, text: &str, _format: FormatHint) -> Result<(), NotifyError> {
        info!(%tenant, text, "Notification");
        Ok(())
    }
}

/// Message sent when an endpoint changes reachability
pub fn compose_transition_message(url: &str, outcome: &ProbeOutcome) -> String {
    let mut message = format!("🔄 Status of <b>{}</b> changed:\n\n", escape_html(url));

    if outcome.reachable {
        message.push_str("✅ Service is reachable");
    } else {
        message.push_str("❌ Service is unreachable");
        message.push_str(&format!("\n\nReason: <code>{}</code>", escape_html(&outcome.reason)));
    }

    message
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
