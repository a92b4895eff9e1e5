//! Mailbox provider interface
//!
//! The engine drives a remote mail store through these two traits. A
//! [`MailProvider`] is shared, immutable configuration that can open
//! sessions; a [`MailSession`] is the provider's connection context and
//! is never shared between tasks. Every task that talks to the store
//! opens its own session.

use crate::error::Result;
use crate::localize::ScopeToken;
use crate::query::Filter;
use crate::record::RawItem;
use async_trait::async_trait;

/// A folder inside a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderRef {
    /// Provider-specific identifier used to reopen the folder.
    pub id: String,
    /// Display name, e.g. `Inbox` or `Posteingang`.
    pub name: String,
    /// Full, locale-dependent path.
    pub path: String,
    /// Identifier of the parent store.
    pub store_id: String,
}

/// A resolved delegated-mailbox owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientHandle {
    pub address: String,
    pub id: String,
}

/// A running asynchronous indexed search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHandle {
    pub id: String,
    pub tag: String,
}

/// Factory for provider sessions.
#[async_trait]
pub trait MailProvider: Send + Sync + 'static {
    /// Attach to a session the provider already has running.
    async fn attach(&self) -> Result<Box<dyn MailSession>>;

    /// Start a new provider session. Slower than [`Self::attach`].
    async fn launch(&self) -> Result<Box<dyn MailSession>>;
}

/// One connection context to the mail store.
#[async_trait]
pub trait MailSession: Send {
    /// Additional logon that some providers accept to avoid interactive
    /// prompts. Failure is not fatal to the session.
    async fn extended_logon(&mut self) -> Result<()>;

    async fn resolve_recipient(&mut self, address: &str) -> Result<Option<RecipientHandle>>;

    /// The personal store's inbox.
    async fn inbox(&mut self) -> Result<FolderRef>;

    /// The inbox of a delegated store.
    async fn shared_inbox(&mut self, recipient: &RecipientHandle) -> Result<FolderRef>;

    /// Display name of the store that owns `folder`.
    async fn store_display_name(&mut self, folder: &FolderRef) -> Result<String>;

    /// Top-level folders of a store.
    async fn root_folders(&mut self, store_id: &str) -> Result<Vec<FolderRef>>;

    /// Start an indexed search. Completion is not signalled; callers
    /// poll [`Self::search_count`].
    async fn advanced_search(
        &mut self,
        scope: &ScopeToken,
        filter: &Filter,
        recurse_subfolders: bool,
        tag: &str,
    ) -> Result<SearchHandle>;

    /// Items accumulated so far by a running search.
    async fn search_count(&mut self, search: &SearchHandle) -> Result<usize>;

    /// Read the accumulated item at `index` (zero-based).
    async fn search_item(&mut self, search: &SearchHandle, index: usize) -> Result<RawItem>;

    /// Ask the provider to stop a search. Advisory only.
    async fn stop_search(&mut self, search: &SearchHandle) -> Result<()>;

    /// Synchronous filter over one folder's items, in provider order.
    async fn restrict(&mut self, folder: &FolderRef, filter: &Filter) -> Result<Vec<RawItem>>;
}
