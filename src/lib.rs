//! Mailbox search library
//!
//! Full-text search over a personal mailbox and an optional delegated
//! (shared) mailbox reached through the same mail client session.
//!
//! A search prefers the provider's indexed search over the inbox and
//! the sent and drafts folders, polling until the match count settles.
//! When an indexed search cannot be issued the folder is filtered
//! directly instead. Results from both mailboxes are normalized into
//! [`EmailRecord`]s, merged newest first, and cached for an hour.
//!
//! Providers plug in through [`MailProvider`]. Two ship with the crate:
//! [`ImapProvider`] for a local IMAP bridge, and [`InMemoryProvider`]
//! for tests and embedding.

mod cache;
mod config;
mod connection;
mod error;
pub mod imap;
mod localize;
pub mod memory;
pub mod provider;
mod query;
mod record;
mod search;
mod strategy;
mod transport;

pub use cache::{CacheKey, DEFAULT_CAPACITY, DEFAULT_TTL, SearchCache};
pub use config::{ImapConfig, SearchConfig};
pub use connection::{AccessReport, Connection, backoff_delay};
pub use error::{Error, Result};
pub use imap::ImapProvider;
pub use localize::{ScopeToken, canonical_path};
pub use memory::{AdvancedBehavior, InMemoryProvider, MemoryStore, ProviderStats};
pub use provider::{MailProvider, MailSession};
pub use query::{Filter, escape_literal};
pub use record::{
    EmailRecord, Importance, MailboxKind, RawItem, RawRecipient, clean_html, display_recipients,
    normalize, truncate_body,
};
pub use search::{MailSearch, SearchQuery, merge};
pub use strategy::{
    Completion, FolderCache, FolderOutcome, MailboxSearch, PRIMARY_CEILING, SIBLING_CEILING,
    SearchRun,
};
