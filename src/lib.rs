// nudge-bot: search, resolve and bulk-annotate SaaS apps in Nudge Security
// Exposes the app-resolution and bulk-update engine as a library

pub mod auth;
pub mod bulk;
pub mod catalog;
pub mod cli;
pub mod collection;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod model;
pub mod rate_limit;
pub mod resolver;
pub mod retry;
pub mod sanitize;
pub mod search;
pub mod validation;
