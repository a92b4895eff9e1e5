//! Search orchestration across personal and shared mailboxes

use crate::cache::{CacheKey, SearchCache};
use crate::config::SearchConfig;
use crate::connection::{AccessReport, Connection};
use crate::error::Result;
use crate::provider::MailProvider;
use crate::record::{EmailRecord, MailboxKind};
use crate::strategy::{MailboxSearch, SearchRun};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// An immutable search request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    pub text: String,
    pub include_personal: bool,
    pub include_shared: bool,
    pub max_results: usize,
}

impl SearchQuery {
    /// Search both mailboxes for `text`.
    #[must_use]
    pub fn new(text: impl Into<String>, max_results: usize) -> Self {
        Self {
            text: text.into(),
            include_personal: true,
            include_shared: true,
            max_results,
        }
    }

    #[must_use]
    pub const fn personal_only(mut self) -> Self {
        self.include_personal = true;
        self.include_shared = false;
        self
    }

    #[must_use]
    pub const fn shared_only(mut self) -> Self {
        self.include_personal = false;
        self.include_shared = true;
        self
    }

    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            text: self.text.clone(),
            include_personal: self.include_personal,
            include_shared: self.include_shared,
            max_results: self.max_results,
        }
    }
}

/// Entry point for mailbox searches.
///
/// Owns the primary connection context and the result cache. Parallel
/// searches open their own connection contexts and never touch either.
pub struct MailSearch<P: MailProvider> {
    provider: Arc<P>,
    config: Arc<SearchConfig>,
    connection: Connection<P>,
    cache: SearchCache,
}

impl<P: MailProvider> MailSearch<P> {
    #[must_use]
    pub fn new(provider: P, config: SearchConfig) -> Self {
        let provider = Arc::new(provider);
        let config = Arc::new(config);
        Self {
            connection: Connection::new(Arc::clone(&provider), Arc::clone(&config)),
            provider,
            config,
            cache: SearchCache::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub const fn cache(&self) -> &SearchCache {
        &self.cache
    }

    /// Connect the primary context. See [`Connection::connect`].
    pub async fn connect(&mut self) -> bool {
        self.connection.connect().await
    }

    /// Probe mailbox reachability. See [`Connection::check_access`].
    pub async fn check_access(&mut self) -> Result<AccessReport> {
        self.connection.check_access().await
    }

    /// Search subject and body text in the requested mailboxes, using
    /// the configured result limit.
    pub async fn search_emails(
        &mut self,
        text: &str,
        include_personal: bool,
        include_shared: bool,
    ) -> Vec<EmailRecord> {
        let query = SearchQuery {
            text: text.to_string(),
            include_personal,
            include_shared,
            max_results: self.config.max_search_results,
        };
        self.search(&query).await
    }

    /// Older name for [`Self::search_emails`]. Searches body text too.
    pub async fn search_emails_by_subject(
        &mut self,
        subject: &str,
        include_personal: bool,
        include_shared: bool,
    ) -> Vec<EmailRecord> {
        self.search_emails(subject, include_personal, include_shared)
            .await
    }

    /// Run `query`, newest first, at most `query.max_results` records.
    ///
    /// Never fails. A mailbox that cannot be searched contributes no
    /// records; if the provider is unreachable the result is empty.
    pub async fn search(&mut self, query: &SearchQuery) -> Vec<EmailRecord> {
        if !self.connection.connect().await {
            return Vec::new();
        }

        let key = query.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            info!("Returning cached results for '{}'", query.text);
            return hit.to_vec();
        }

        let shared_configured = self.config.shared_configured();
        let records = if query.include_personal && query.include_shared && shared_configured {
            search_parallel(&self.provider, &self.config, query).await
        } else {
            self.search_sequential(query, shared_configured).await
        };

        let results = merge(records, query.max_results);
        self.cache.put(key, results.clone());
        results
    }

    async fn search_sequential(
        &mut self,
        query: &SearchQuery,
        shared_configured: bool,
    ) -> Vec<EmailRecord> {
        let mut run = SearchRun::new(query.max_results);
        let mut all = Vec::new();

        if query.include_personal {
            match search_mailbox(&mut self.connection, MailboxKind::Personal, &query.text, &mut run)
                .await
            {
                Ok(records) => {
                    info!("Found {} emails in personal mailbox", records.len());
                    all.extend(records);
                }
                Err(e) => error!("Error searching personal mailbox: {}", e),
            }
        }

        if query.include_shared && shared_configured && !run.is_exhausted() {
            match search_mailbox(&mut self.connection, MailboxKind::Shared, &query.text, &mut run)
                .await
            {
                Ok(records) => {
                    info!("Found {} emails in shared mailbox", records.len());
                    all.extend(records);
                }
                Err(e) => error!("Error searching shared mailbox: {}", e),
            }
        }

        all
    }
}

/// Search both mailboxes at once, one task and one connection context
/// per mailbox. Joined personal first.
async fn search_parallel<P: MailProvider>(
    provider: &Arc<P>,
    config: &Arc<SearchConfig>,
    query: &SearchQuery,
) -> Vec<EmailRecord> {
    let personal = tokio::spawn(search_in_fresh_context(
        Arc::clone(provider),
        Arc::clone(config),
        MailboxKind::Personal,
        query.text.clone(),
        query.max_results,
    ));
    let shared = tokio::spawn(search_in_fresh_context(
        Arc::clone(provider),
        Arc::clone(config),
        MailboxKind::Shared,
        query.text.clone(),
        query.max_results,
    ));

    let mut all = Vec::new();
    for (kind, handle) in [(MailboxKind::Personal, personal), (MailboxKind::Shared, shared)] {
        match handle.await {
            Ok(records) => all.extend(records),
            Err(e) => error!("Error in parallel {} search: {}", kind, e),
        }
    }
    all
}

/// Body of one parallel task: a connection context of its own, built
/// here and dropped here.
async fn search_in_fresh_context<P: MailProvider>(
    provider: Arc<P>,
    config: Arc<SearchConfig>,
    kind: MailboxKind,
    text: String,
    max_results: usize,
) -> Vec<EmailRecord> {
    let mut connection = Connection::new(provider, config);
    if !connection.connect().await {
        error!("Could not connect for {} mailbox search", kind);
        return Vec::new();
    }

    let mut run = SearchRun::new(max_results);
    match search_mailbox(&mut connection, kind, &text, &mut run).await {
        Ok(records) => {
            info!("Found {} emails in {} mailbox", records.len(), kind);
            records
        }
        Err(e) => {
            error!("Error in {} mailbox search: {}", kind, e);
            Vec::new()
        }
    }
}

async fn search_mailbox<P: MailProvider>(
    connection: &mut Connection<P>,
    kind: MailboxKind,
    text: &str,
    run: &mut SearchRun,
) -> Result<Vec<EmailRecord>> {
    let inbox = connection.open_mailbox(kind).await?;
    let config = Arc::clone(connection.config());
    let (session, folders) = connection.search_parts()?;
    Ok(MailboxSearch::new(session, folders, &config, kind)
        .run(&inbox, text, run)
        .await)
}

/// Newest first, one record per entry id, at most `max_results`.
///
/// Records without a received time sort last. The sort is stable so
/// equal times keep their gathering order.
#[must_use]
pub fn merge(mut records: Vec<EmailRecord>, max_results: usize) -> Vec<EmailRecord> {
    records.sort_by(|a, b| b.received_time.cmp(&a.received_time));

    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.entry_id.clone()));
    records.truncate(max_results);
    records
}
