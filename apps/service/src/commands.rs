//! Chat commands: registration, interval and log queries, on-demand checks.
//!
//! Every handler answers from stored state, except `/check_service`, which
//! runs one bounded probe outside the scheduler.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::database::models::Endpoint;
use crate::database::{DowntimeLedger, StoreError, TenantStore};
use crate::monitoring::checker::HttpProber;
use crate::monitoring::tracker::StatusTracker;
use crate::monitoring::types::TenantId;
use crate::notifier::escape_html;
use crate::validation::{parse_interval, validate_endpoint_name, validate_http_endpoint};

const HELP: &str = "Available commands:\n\
/add URL [name] - start monitoring a service\n\
/remove URL - stop monitoring a service\n\
/interval SECONDS - change the check interval\n\
/get_interval - show the current check interval\n\
/log - show accumulated downtime per service\n\
/myservices - list your services\n\
/status - last known status of your services\n\
/check_service URL - check a service right now";

/// Longest reply the chat API accepts, in characters
pub const MESSAGE_LIMIT: usize = 4096;

/// Room kept free for the "and N more" line
const OVERFLOW_RESERVE: usize = 32;

/// A parsed chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Interval(String),
    GetInterval,
    Add(String),
    Remove(String),
    Log,
    MyServices,
    Status,
    CheckService(String),
    Unknown(String),
}

impl Command {
    /// Parse `/name@bot args`. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;

        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim().to_string()),
            None => (rest, String::new()),
        };
        let name = head.split('@').next().unwrap_or_default().to_ascii_lowercase();

        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "interval" => Command::Interval(args),
            "get_interval" => Command::GetInterval,
            "add" => Command::Add(args),
            "remove" => Command::Remove(args),
            "log" => Command::Log,
            "myservices" => Command::MyServices,
            "status" => Command::Status,
            "check_service" => Command::CheckService(args),
            _ => Command::Unknown(name),
        })
    }
}

pub struct CommandHandler {
    store: Arc<dyn TenantStore>,
    ledger: Arc<dyn DowntimeLedger>,
    tracker: Arc<StatusTracker>,
    on_demand: Arc<HttpProber>,
}

impl CommandHandler {
    pub fn new(
        store: Arc<dyn TenantStore>,
        ledger: Arc<dyn DowntimeLedger>,
        tracker: Arc<StatusTracker>,
        on_demand: Arc<HttpProber>,
    ) -> Self {
        Self { store, ledger, tracker, on_demand }
    }

    /// Handle one message and produce the reply (HTML), or `None` if the
    /// message is not a command.
    pub async fn handle(&self, tenant: TenantId, text: &str) -> Option<String> {
        let command = Command::parse(text)?;

        let reply = match self.dispatch(tenant, command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%tenant, error = %e, "Command failed");
                "Something went wrong while talking to the database, please try again later."
                    .to_string()
            }
        };

        Some(reply)
    }

    async fn dispatch(&self, tenant: TenantId, command: Command) -> Result<String, StoreError> {
        match command {
            Command::Start => {
                self.store.ensure_tenant(tenant).await?;
                Ok(format!("Hi! I monitor your services and tell you when they go up or down.\n\n{HELP}"))
            }
            Command::Help => Ok(HELP.to_string()),
            Command::Interval(arg) => self.set_interval(tenant, &arg).await,
            Command::GetInterval => match self.store.get_interval(tenant).await? {
                Some(seconds) => Ok(format!("Current check interval: {seconds} seconds.")),
                None => Ok("No interval configured yet, use /start first.".to_string()),
            },
            Command::Add(args) => self.add(tenant, &args).await,
            Command::Remove(url) => self.remove(tenant, &url).await,
            Command::Log => self.log(tenant).await,
            Command::MyServices => self.my_services(tenant).await,
            Command::Status => Ok(self.status(tenant)),
            Command::CheckService(url) => Ok(self.check_service(&url).await),
            Command::Unknown(name) => {
                Ok(format!("Unknown command /{}. Use /help to see what I can do.", escape_html(&name)))
            }
        }
    }

    async fn set_interval(&self, tenant: TenantId, arg: &str) -> Result<String, StoreError> {
        if arg.is_empty() {
            return Ok("Please give the interval in seconds, e.g. /interval 60".to_string());
        }

        match parse_interval(arg) {
            Ok(seconds) => {
                self.store.set_interval(tenant, seconds).await?;
                Ok(format!("Check interval changed to {seconds} seconds."))
            }
            Err(invalid) => Ok(format!("Could not change the interval: {}", escape_html(invalid.message()))),
        }
    }

    async fn add(&self, tenant: TenantId, args: &str) -> Result<String, StoreError> {
        let mut parts = args.splitn(2, char::is_whitespace);
        let url = parts.next().unwrap_or_default().trim();
        let name = parts.next().map(str::trim).filter(|n| !n.is_empty());

        if url.is_empty() {
            return Ok("Please provide a service URL, e.g. /add https://example.com".to_string());
        }

        let valid = validate_http_endpoint(url);
        if !valid.is_valid {
            return Ok(format!("Cannot add {}: {}", escape_html(url), escape_html(valid.message())));
        }

        if let Some(name) = name {
            let valid = validate_endpoint_name(name);
            if !valid.is_valid {
                return Ok(format!("Cannot add {}: {}", escape_html(url), escape_html(valid.message())));
            }
        }

        let endpoint = Endpoint::new(tenant, url.to_string(), name.map(str::to_string));
        if self.store.add_endpoint(&endpoint).await? {
            Ok(format!("Service {} added for monitoring.", escape_html(url)))
        } else {
            Ok(format!("Service {} is already monitored.", escape_html(url)))
        }
    }

    async fn remove(&self, tenant: TenantId, url: &str) -> Result<String, StoreError> {
        if url.is_empty() {
            return Ok("Please provide the URL of the service to remove.".to_string());
        }

        if self.store.remove_endpoint(tenant, url).await? {
            Ok(format!("Service {} removed.", escape_html(url)))
        } else {
            Ok(format!("Service {} is not in your list.", escape_html(url)))
        }
    }

    async fn log(&self, tenant: TenantId) -> Result<String, StoreError> {
        let entries = self.ledger.entries_for_tenant(tenant).await?;
        if entries.is_empty() {
            return Ok("No downtime recorded.".to_string());
        }

        let lines: Vec<String> = entries
            .iter()
            .map(|entry| {
                format!(
                    "{} - {} (last updated {})",
                    escape_html(&entry.url),
                    format_duration(entry.downtime),
                    format_timestamp(entry.updated_at)
                )
            })
            .collect();

        Ok(bounded_list("Downtime log:\n\n", &lines))
    }

    async fn my_services(&self, tenant: TenantId) -> Result<String, StoreError> {
        let endpoints = self.store.list_endpoints(tenant).await?;
        if endpoints.is_empty() {
            return Ok("You have not added any services yet.".to_string());
        }

        let lines: Vec<String> = endpoints
            .iter()
            .map(|endpoint| match &endpoint.name {
                Some(name) => format!("{} ({})", escape_html(&endpoint.url), escape_html(name)),
                None => escape_html(&endpoint.url),
            })
            .collect();

        Ok(bounded_list("Your services:\n\n", &lines))
    }

    fn status(&self, tenant: TenantId) -> String {
        let statuses = self.tracker.snapshot(tenant);
        if statuses.is_empty() {
            return "No checks have completed yet.".to_string();
        }

        let lines: Vec<String> = statuses
            .iter()
            .map(|(url, record)| {
                if record.reachable {
                    format!("✅ {}", escape_html(url))
                } else {
                    format!("❌ {} - {}", escape_html(url), escape_html(&record.reason))
                }
            })
            .collect();

        bounded_list("", &lines)
    }

    async fn check_service(&self, url: &str) -> String {
        if url.is_empty() {
            return "Please provide the URL of the service to check.".to_string();
        }

        let outcome = self.on_demand.check_now(url).await;
        if outcome.reachable {
            format!("Service {} is reachable. {}", escape_html(url), escape_html(&outcome.detail()))
        } else {
            format!("Service {} is unreachable. Error: {}", escape_html(url), escape_html(&outcome.detail()))
        }
    }
}

/// Join `lines` under `header`, dropping the tail that would not fit in one
/// message and saying how many lines were left out
pub fn bounded_list(header: &str, lines: &[String]) -> String {
    let mut reply = header.to_string();
    let mut used = header.chars().count();

    for (shown, line) in lines.iter().enumerate() {
        let cost = line.chars().count() + 1;
        if used + cost > MESSAGE_LIMIT - OVERFLOW_RESERVE {
            reply.push_str(&format!("\n... and {} more", lines.len() - shown));
            break;
        }

        if shown > 0 {
            reply.push('\n');
        }
        reply.push_str(line);
        used += cost;
    }

    reply
}

/// Render a duration as e.g. "1h 2m 5s"
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m {seconds}s"),
        _ => format!("{hours}h {minutes}m {seconds}s"),
    }
}

fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
