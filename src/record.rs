//! Normalized email records
//!
//! Providers hand back [`RawItem`]s whose attributes may be missing.
//! [`normalize`] fixes the defaults once, at this boundary, and applies
//! the body and recipient shaping rules from [`SearchConfig`].

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Which store a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxKind {
    Personal,
    Shared,
}

impl MailboxKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Shared => "shared",
        }
    }
}

impl fmt::Display for MailboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Message importance as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

/// A recipient as the provider exposes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecipient {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// A message as read from a provider, before normalization.
///
/// Every attribute is optional; `None` means the provider could not
/// supply it. `entry_id` is required for a record to be produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub entry_id: Option<String>,
    pub subject: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub recipients: Option<Vec<RawRecipient>>,
    pub received_time: Option<DateTime<Utc>>,
    pub importance: Option<Importance>,
    pub body: Option<String>,
    pub size: Option<u64>,
    pub attachment_count: Option<u32>,
    pub unread: Option<bool>,
}

/// A normalized search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    /// Capped display list; a trailing `... and N more` entry marks overflow.
    pub recipients: Vec<String>,
    /// `None` sorts after every dated record.
    pub received_time: Option<DateTime<Utc>>,
    pub folder_name: String,
    pub mailbox_kind: MailboxKind,
    pub importance: Importance,
    pub body: String,
    pub size: u64,
    pub attachment_count: u32,
    pub unread: bool,
    /// Provider-issued stable identifier, the dedup key.
    pub entry_id: String,
}

const TRUNCATION_MARKER: &str = " [truncated]";

/// Convert a raw provider item into an [`EmailRecord`].
///
/// # Errors
///
/// Returns [`Error::Extraction`] when the item carries no entry id.
pub fn normalize(
    item: RawItem,
    folder_name: &str,
    kind: MailboxKind,
    config: &SearchConfig,
) -> Result<EmailRecord> {
    let entry_id = item
        .entry_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Extraction(format!("item in {folder_name} has no entry id")))?;

    let mut body = truncate_body(item.body.unwrap_or_default(), config.max_body_chars);
    if config.clean_html_content && !body.is_empty() {
        body = clean_html(&body);
    }

    Ok(EmailRecord {
        subject: item.subject.unwrap_or_else(|| "No Subject".to_string()),
        sender_name: item.sender_name.unwrap_or_else(|| "Unknown".to_string()),
        sender_email: item.sender_email.unwrap_or_default(),
        recipients: display_recipients(
            item.recipients.unwrap_or_default(),
            config.max_recipients_display,
        ),
        received_time: item.received_time,
        folder_name: folder_name.to_string(),
        mailbox_kind: kind,
        importance: item.importance.unwrap_or_default(),
        body,
        size: item.size.unwrap_or(0),
        attachment_count: item.attachment_count.unwrap_or(0),
        unread: item.unread.unwrap_or(false),
        entry_id,
    })
}

/// Cut `body` to `max_chars` characters and append a marker. A cap of
/// `0` disables truncation.
#[must_use]
pub fn truncate_body(body: String, max_chars: usize) -> String {
    if max_chars == 0 {
        return body;
    }
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &body[..cut]),
        None => body,
    }
}

/// Show at most `max` recipients, summarizing the rest in one entry.
#[must_use]
pub fn display_recipients(recipients: Vec<RawRecipient>, max: usize) -> Vec<String> {
    let total = recipients.len();
    let mut shown: Vec<String> = recipients
        .into_iter()
        .take(max)
        .map(|r| r.name.filter(|n| !n.is_empty()).or(r.address).unwrap_or_default())
        .collect();

    if total > max {
        shown.push(format!("... and {} more", total - max));
    }
    shown
}

const HTML_ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
];

/// Strip markup, decode the common entities and collapse whitespace.
#[must_use]
pub fn clean_html(text: &str) -> String {
    let mut text = html_tag_regex().replace_all(text, "").into_owned();

    for (entity, ch) in HTML_ENTITIES {
        text = text.replace(entity, ch);
    }

    whitespace_regex().replace_all(&text, " ").trim().to_string()
}

fn html_tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid HTML tag regex"))
}

fn whitespace_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}
