//! Search and IMAP connection configuration

use crate::error::{Error, Result};
use std::env;
use std::str::FromStr;

/// Tunables for the search engine.
///
/// Field names match the configuration keys; [`SearchConfig::from_env`]
/// reads them upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Connection attempts before giving up (backoff bound).
    pub max_connection_retries: u32,
    /// Address of the delegated mailbox. `None` disables shared search.
    pub shared_mailbox_email: Option<String>,
    /// Reported by the access check only.
    pub personal_retention_months: u32,
    /// Reported by the access check only.
    pub shared_retention_months: u32,
    pub max_search_results: usize,
    /// Body character cap, `0` means unlimited.
    pub max_body_chars: usize,
    pub clean_html_content: bool,
    pub max_recipients_display: usize,
    /// Also search `Sent Items` and `Drafts` when quota remains.
    pub search_all_folders: bool,
    pub use_extended_mapi_login: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_connection_retries: 3,
            shared_mailbox_email: None,
            personal_retention_months: 6,
            shared_retention_months: 12,
            max_search_results: 500,
            max_body_chars: 0,
            clean_html_content: true,
            max_recipients_display: 10,
            search_all_folders: true,
            use_extended_mapi_login: true,
        }
    }
}

impl SearchConfig {
    /// Load search configuration from environment variables
    ///
    /// Reads from `.env` file if present. Every variable is optional;
    /// unset keys keep the [`Default`] value:
    /// - `MAX_CONNECTION_RETRIES` (default: `3`)
    /// - `SHARED_MAILBOX_EMAIL` (default: unset)
    /// - `PERSONAL_RETENTION_MONTHS` (default: `6`)
    /// - `SHARED_RETENTION_MONTHS` (default: `12`)
    /// - `MAX_SEARCH_RESULTS` (default: `500`)
    /// - `MAX_BODY_CHARS` (default: `0`)
    /// - `CLEAN_HTML_CONTENT` (default: `true`)
    /// - `MAX_RECIPIENTS_DISPLAY` (default: `10`)
    /// - `SEARCH_ALL_FOLDERS` (default: `true`)
    /// - `USE_EXTENDED_MAPI_LOGIN` (default: `true`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            max_connection_retries: parse_or(
                &lookup,
                "MAX_CONNECTION_RETRIES",
                defaults.max_connection_retries,
            )?,
            shared_mailbox_email: lookup("SHARED_MAILBOX_EMAIL")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            personal_retention_months: parse_or(
                &lookup,
                "PERSONAL_RETENTION_MONTHS",
                defaults.personal_retention_months,
            )?,
            shared_retention_months: parse_or(
                &lookup,
                "SHARED_RETENTION_MONTHS",
                defaults.shared_retention_months,
            )?,
            max_search_results: parse_or(
                &lookup,
                "MAX_SEARCH_RESULTS",
                defaults.max_search_results,
            )?,
            max_body_chars: parse_or(&lookup, "MAX_BODY_CHARS", defaults.max_body_chars)?,
            clean_html_content: parse_bool_or(
                &lookup,
                "CLEAN_HTML_CONTENT",
                defaults.clean_html_content,
            )?,
            max_recipients_display: parse_or(
                &lookup,
                "MAX_RECIPIENTS_DISPLAY",
                defaults.max_recipients_display,
            )?,
            search_all_folders: parse_bool_or(
                &lookup,
                "SEARCH_ALL_FOLDERS",
                defaults.search_all_folders,
            )?,
            use_extended_mapi_login: parse_bool_or(
                &lookup,
                "USE_EXTENDED_MAPI_LOGIN",
                defaults.use_extended_mapi_login,
            )?,
        })
    }

    /// Whether a shared mailbox is configured at all.
    #[must_use]
    pub const fn shared_configured(&self) -> bool {
        self.shared_mailbox_email.is_some()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {key}: {e}"))),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("Invalid {key}: {other}"))),
    }
}

/// IMAP connection configuration for the IMAP provider adapter
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Prefix under which other users' mailboxes are exposed.
    pub shared_namespace: String,
}

impl ImapConfig {
    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `127.0.0.1`)
    /// - `IMAP_PORT` (default: `1143`)
    /// - `IMAP_SHARED_NAMESPACE` (default: `Other Users`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: env::var("IMAP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("IMAP_PORT")
                .unwrap_or_else(|_| "1143".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?,
            username: env::var("IMAP_USERNAME")
                .map_err(|_| Error::Config("IMAP_USERNAME not set".into()))?,
            password: env::var("IMAP_PASSWORD")
                .map_err(|_| Error::Config("IMAP_PASSWORD not set".into()))?,
            shared_namespace: env::var("IMAP_SHARED_NAMESPACE")
                .unwrap_or_else(|_| "Other Users".to_string()),
        })
    }
}
