//! Command-line interface for nudge-bot
//!
//! Global flags configure the API client and how unresolved apps are
//! handled; each subcommand maps to one operation in [`crate::commands`].
//!
//! Every credential flag falls back to an environment variable so tokens
//! need not appear in shell history:
//!
//! | flag              | variable              |
//! |-------------------|-----------------------|
//! | `--api-token`     | `API_TOKEN`           |
//! | `--refresh-token` | `NUDGE_REFRESH_TOKEN` |
//! | `--client-id`     | `NUDGE_CLIENT_ID`     |
//! | `--auth-url`      | `NUDGE_AUTH_URL`      |
//! | `--base-url`      | `NUDGE_API_URL`       |
//! | `--csrf-token`    | `NUDGE_CSRF_TOKEN`    |

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_BASE_URL;
use crate::search::ConstraintDialect;

/// Search, resolve and bulk-annotate SaaS apps in Nudge Security
///
/// # Examples
///
/// ```text
/// nudge-bot transform-app-list --app-list apps.txt
/// nudge-bot bulk-set-app-field --field Owner --value Security --app-list transformed_list.txt
/// ```
#[derive(Parser, Debug)]
#[command(name = "nudge-bot", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// API access token
    #[arg(long, env = "API_TOKEN", hide_env_values = true, global = true)]
    pub api_token: Option<String>,

    /// Refresh token used to renew an expired access token
    #[arg(long, env = "NUDGE_REFRESH_TOKEN", hide_env_values = true, global = true)]
    pub refresh_token: Option<String>,

    /// Client id of the identity provider that issued the tokens
    #[arg(long, env = "NUDGE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Token refresh endpoint
    #[arg(long, env = "NUDGE_AUTH_URL", global = true)]
    pub auth_url: Option<String>,

    #[arg(long, env = "NUDGE_API_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// Initial CSRF token for mutating requests
    #[arg(long, env = "NUDGE_CSRF_TOKEN", hide_env_values = true, global = true)]
    pub csrf_token: Option<String>,

    /// Request timeout in milliseconds
    #[arg(short = 't', long, default_value = "30000", global = true)]
    pub timeout_ms: u64,

    /// Rate limit (requests per minute)
    #[arg(short = 'r', long, default_value = "120", global = true)]
    pub rate_limit: usize,

    /// Prompt to settle apps that match nothing or several results
    #[arg(short = 'i', long, global = true)]
    pub interactive: bool,

    /// Wire format for search constraints
    #[arg(long, value_enum, default_value = "current", global = true)]
    pub search_dialect: SearchDialect,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDialect {
    Current,
    Legacy,
}

impl From<SearchDialect> for ConstraintDialect {
    fn from(dialect: SearchDialect) -> Self {
        match dialect {
            SearchDialect::Current => ConstraintDialect::Current,
            SearchDialect::Legacy => ConstraintDialect::Legacy,
        }
    }
}

/// Identifies one app by name or by URL
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("app").required(true).args(["app_name", "domain"])))]
pub struct AppSelector {
    #[arg(long)]
    pub app_name: Option<String>,

    /// App URL, e.g. https://zoom.us
    #[arg(long)]
    pub domain: Option<String>,
}

impl AppSelector {
    /// The free-text term to resolve
    pub fn term(&self) -> &str {
        self.app_name
            .as_deref()
            .or(self.domain.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List custom fields with their allowed values
    List {
        /// Only fields with this scope (application, account or user)
        #[arg(long)]
        scope: Option<String>,
    },

    /// Search apps by name, domain, category or field values
    #[command(group(
        ArgGroup::new("mode")
            .required(true)
            .args(["app_name", "domain", "category", "field"])
    ))]
    SearchApp {
        #[arg(long)]
        app_name: Option<String>,

        #[arg(long)]
        domain: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Field name; repeat together with --value
        #[arg(long, requires = "value")]
        field: Vec<String>,

        /// Field value ("None" matches apps without the field)
        #[arg(long)]
        value: Vec<String>,

        /// Also print each app's values for this field
        #[arg(long)]
        show_field: Vec<String>,
    },

    /// Set a field value on one app
    SetAppField {
        #[arg(long)]
        field: String,

        #[arg(long)]
        value: String,

        #[command(flatten)]
        app: AppSelector,
    },

    /// Resolve a list of app names into `id, name[, value]` lines
    ///
    /// Each input line is an app name or URL, optionally followed by
    /// `,value`. Blank lines and lines starting with '#' are skipped.
    TransformAppList {
        #[arg(long)]
        app_list: PathBuf,

        #[arg(long, default_value = "transformed_list.txt")]
        transformed_list: PathBuf,
    },

    /// Set a field on every app in a transformed list
    #[command(group(ArgGroup::new("values").required(true).args(["value", "per_record"])))]
    BulkSetAppField {
        #[arg(long)]
        field: String,

        /// One value for every app
        #[arg(long)]
        value: Option<String>,

        /// Take each app's value from the third column
        #[arg(long)]
        per_record: bool,

        /// Output of transform-app-list
        #[arg(long)]
        app_list: PathBuf,

        /// Validate and report without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Create a custom field
    CreateField {
        #[arg(long)]
        field_name: String,

        /// application, account or user; repeatable
        #[arg(long, required = true)]
        field_scope: Vec<String>,

        /// SELECT, MULTI_SELECT, TEXT, NUMBER or DATETIME
        #[arg(long, default_value = "SELECT")]
        field_type: String,

        #[arg(long)]
        allowed_value: Vec<String>,
    },

    /// Rename, re-scope or add allowed values to a custom field
    UpdateField {
        #[arg(long)]
        field_id: String,

        #[arg(long)]
        field_name: Option<String>,

        #[arg(long)]
        field_scope: Vec<String>,

        #[arg(long)]
        allowed_value: Vec<String>,
    },

    /// List the vendors an app depends on
    SupplyChain {
        #[arg(long)]
        app_name: String,
    },

    /// Show platform details for a domain
    AppInfo {
        #[arg(long)]
        domain: String,
    },
}
