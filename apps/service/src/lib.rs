//! Per-tenant HTTP endpoint reachability monitoring with a chat front end.

pub mod bot;
pub mod commands;
pub mod config;
pub mod database;
pub mod monitoring;
pub mod notifier;
pub mod pool;
pub mod telegram;
pub mod validation;
