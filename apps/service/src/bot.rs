//! Long-polling loop feeding chat messages to the command handler.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::commands::CommandHandler;
use crate::monitoring::scheduler::shutdown_requested;
use crate::monitoring::types::TenantId;
use crate::notifier::FormatHint;
use crate::telegram::{TelegramClient, Update};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Poll for updates until `shutdown` flips to true. Each chat is a tenant.
pub async fn run_bot(
    client: Arc<TelegramClient>,
    handler: Arc<CommandHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut offset = 0;
    info!("Bot polling started");

    loop {
        let polled = tokio::select! {
            polled = client.get_updates(offset) => polled,
            _ = shutdown_requested(&mut shutdown) => break,
        };

        match polled {
            Ok(updates) => {
                offset = next_offset(offset, &updates);
                for update in updates {
                    dispatch(client.clone(), handler.clone(), update);
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to poll updates, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    _ = shutdown_requested(&mut shutdown) => break,
                }
            }
        }
    }

    info!("Bot polling stopped");
}

/// Acknowledge everything up to the newest update
fn next_offset(current: i64, updates: &[Update]) -> i64 {
    updates.iter().map(|u| u.update_id + 1).fold(current, i64::max)
}

fn dispatch(client: Arc<TelegramClient>, handler: Arc<CommandHandler>, update: Update) {
    let Some(message) = update.message else {
        return;
    };
    let Some(text) = message.text else {
        return;
    };
    let chat = message.chat.id;

    tokio::spawn(async move {
        let Some(reply) = handler.handle(TenantId(chat), &text).await else {
            return;
        };

        debug!(chat, "Replying to command");
        if let Err(e) = client.send_message(chat, &reply, FormatHint::Html).await {
            warn!(chat, error = %e, "Failed to send reply");
        }
    });
}
