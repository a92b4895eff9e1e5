//! Per-mailbox search
//!
//! One mailbox is searched in stages:
//!
//! 1. An indexed (advanced) search over the inbox, scoped by a
//!    canonicalized folder path and matching the phrase in subject or
//!    body. The provider gives no completion signal, so the running
//!    result count is polled until it stops changing or a wall-clock
//!    ceiling is reached. Either way the accumulated items are used.
//! 2. If the indexed search cannot be issued or polled, a synchronous
//!    subject-only substring filter replaces it. Body matches are lost
//!    on this path.
//! 3. While quota remains, `Sent Items` and `Drafts` go through the
//!    same stages with a shorter ceiling.
//!
//! A [`SearchRun`] carries the dedup set and remaining quota across all
//! of these stages.

use crate::config::SearchConfig;
use crate::error::Result;
use crate::localize::ScopeToken;
use crate::provider::{FolderRef, MailSession, SearchHandle};
use crate::query::Filter;
use crate::record::{EmailRecord, MailboxKind, RawItem, normalize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SETTLE_WINDOW: Duration = Duration::from_millis(500);

/// Wall-clock ceiling for the inbox search.
pub const PRIMARY_CEILING: Duration = Duration::from_secs(30);
/// Wall-clock ceiling for each secondary folder.
pub const SIBLING_CEILING: Duration = Duration::from_secs(10);

const SIBLING_FOLDERS: [&str; 2] = ["Sent Items", "Drafts"];

/// Dedup set and remaining quota for one top-level search call.
#[derive(Debug, Clone)]
pub struct SearchRun {
    seen: HashSet<String>,
    remaining: usize,
}

impl SearchRun {
    #[must_use]
    pub fn new(quota: usize) -> Self {
        Self {
            seen: HashSet::new(),
            remaining: quota,
        }
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    #[must_use]
    pub fn has_seen(&self, entry_id: &str) -> bool {
        self.seen.contains(entry_id)
    }

    /// Claim one quota slot for `entry_id`. Returns `false` when the id
    /// was already taken or the quota is used up.
    pub fn admit(&mut self, entry_id: &str) -> bool {
        if self.is_exhausted() || !self.seen.insert(entry_id.to_string()) {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// How an indexed search stopped polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The result count held still for the settle window.
    Stable,
    /// The ceiling elapsed first; results are partial.
    TimedOut,
}

/// Which path produced a folder's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderOutcome {
    Advanced(Completion),
    Fallback,
    /// Both paths failed; the folder contributed nothing.
    Failed,
}

/// Case-insensitive folder lookup, cached per parent store.
#[derive(Debug, Default)]
pub struct FolderCache {
    by_store: HashMap<(String, String), FolderRef>,
}

impl FolderCache {
    /// Find a top-level folder of `store_id` named `name`, ignoring
    /// case. Only hits are cached.
    pub async fn find(
        &mut self,
        session: &mut dyn MailSession,
        store_id: &str,
        name: &str,
    ) -> Result<Option<FolderRef>> {
        let key = (store_id.to_string(), name.to_lowercase());
        if let Some(folder) = self.by_store.get(&key) {
            return Ok(Some(folder.clone()));
        }

        let found = session
            .root_folders(store_id)
            .await?
            .into_iter()
            .find(|f| f.name.to_lowercase() == key.1);

        if let Some(folder) = &found {
            self.by_store.insert(key, folder.clone());
        }
        Ok(found)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_store.is_empty()
    }
}

fn search_tag(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..8])
}

/// Runs the staged search for one mailbox over one session.
pub struct MailboxSearch<'a> {
    session: &'a mut dyn MailSession,
    folders: &'a mut FolderCache,
    config: &'a SearchConfig,
    kind: MailboxKind,
}

impl<'a> MailboxSearch<'a> {
    pub fn new(
        session: &'a mut dyn MailSession,
        folders: &'a mut FolderCache,
        config: &'a SearchConfig,
        kind: MailboxKind,
    ) -> Self {
        Self {
            session,
            folders,
            config,
            kind,
        }
    }

    /// Search `inbox` and, quota permitting, its sibling folders.
    ///
    /// Never fails: every error is logged and the folder it hit is
    /// skipped.
    pub async fn run(
        &mut self,
        inbox: &FolderRef,
        text: &str,
        run: &mut SearchRun,
    ) -> Vec<EmailRecord> {
        let mut records = Vec::new();

        let outcome = self
            .search_folder(
                inbox,
                text,
                PRIMARY_CEILING,
                search_tag("EmailBodySearch"),
                run,
                &mut records,
            )
            .await;
        info!(
            "{} inbox search finished via {:?} with {} records",
            self.kind,
            outcome,
            records.len()
        );

        if !run.is_exhausted() && self.config.search_all_folders {
            self.search_siblings(inbox, text, run, &mut records).await;
        }

        records
    }

    async fn search_siblings(
        &mut self,
        inbox: &FolderRef,
        text: &str,
        run: &mut SearchRun,
        records: &mut Vec<EmailRecord>,
    ) {
        for name in SIBLING_FOLDERS {
            if run.is_exhausted() {
                break;
            }

            let folder = match self
                .folders
                .find(&mut *self.session, &inbox.store_id, name)
                .await
            {
                Ok(Some(folder)) => folder,
                Ok(None) => {
                    debug!("No {} folder in {} mailbox, skipping", name, self.kind);
                    continue;
                }
                Err(e) => {
                    debug!("Error resolving {} in {} mailbox: {}", name, self.kind, e);
                    continue;
                }
            };

            let before = records.len();
            let tag = search_tag(&format!("OtherFolderSearch-{}", name.replace(' ', "")));
            let outcome = self
                .search_folder(&folder, text, SIBLING_CEILING, tag, run, records)
                .await;
            debug!(
                "{} search finished via {:?} with {} records",
                folder.name,
                outcome,
                records.len() - before
            );
        }
    }

    /// Advanced search with fallback for a single folder.
    async fn search_folder(
        &mut self,
        folder: &FolderRef,
        text: &str,
        ceiling: Duration,
        tag: String,
        run: &mut SearchRun,
        records: &mut Vec<EmailRecord>,
    ) -> FolderOutcome {
        match self.advanced(folder, text, ceiling, &tag, run, records).await {
            Ok(completion) => FolderOutcome::Advanced(completion),
            Err(e) => {
                info!("Advanced search in {} failed: {}", folder.name, e);
                info!("Falling back to subject filter in {}", folder.name);
                match self.fallback(folder, text, run, records).await {
                    Ok(()) => FolderOutcome::Fallback,
                    Err(e) => {
                        error!("Fallback subject filter in {} failed: {}", folder.name, e);
                        FolderOutcome::Failed
                    }
                }
            }
        }
    }

    async fn advanced(
        &mut self,
        folder: &FolderRef,
        text: &str,
        ceiling: Duration,
        tag: &str,
        run: &mut SearchRun,
        records: &mut Vec<EmailRecord>,
    ) -> Result<Completion> {
        let scope = ScopeToken::for_path(&folder.path);
        let filter = Filter::phrase_match(text);
        debug!("Advanced search scope={} filter={} tag={}", scope, filter, tag);

        let search = self
            .session
            .advanced_search(&scope, &filter, false, tag)
            .await?;

        let (completion, count) = match self.await_settled(&search, ceiling).await {
            Ok(settled) => settled,
            Err(e) => {
                self.stop(&search).await;
                return Err(e);
            }
        };
        info!(
            "Advanced search in {} returned {} ({:?}, quota {})",
            folder.name,
            count,
            completion,
            run.remaining()
        );

        for index in 0..count {
            if run.is_exhausted() {
                break;
            }
            match self.session.search_item(&search, index).await {
                Ok(item) => self.admit(item, &folder.name, run, records),
                Err(e) => debug!("Error processing result {}: {}", index, e),
            }
        }

        self.stop(&search).await;
        Ok(completion)
    }

    /// Poll the running count until it holds still for the settle
    /// window or `ceiling` elapses.
    async fn await_settled(
        &mut self,
        search: &SearchHandle,
        ceiling: Duration,
    ) -> Result<(Completion, usize)> {
        let started = Instant::now();
        let mut last = self.session.search_count(search).await?;
        let mut unchanged_since = Instant::now();

        loop {
            if unchanged_since.elapsed() >= SETTLE_WINDOW {
                return Ok((Completion::Stable, last));
            }
            if started.elapsed() >= ceiling {
                warn!(
                    "Advanced search {} still running after {}s, using {} partial results",
                    search.tag,
                    ceiling.as_secs(),
                    last
                );
                return Ok((Completion::TimedOut, last));
            }

            sleep(POLL_INTERVAL).await;

            let count = self.session.search_count(search).await?;
            if count != last {
                last = count;
                unchanged_since = Instant::now();
            }
        }
    }

    async fn fallback(
        &mut self,
        folder: &FolderRef,
        text: &str,
        run: &mut SearchRun,
        records: &mut Vec<EmailRecord>,
    ) -> Result<()> {
        let filter = Filter::subject_contains(text);
        let mut items = self.session.restrict(folder, &filter).await?;
        items.sort_by(|a, b| b.received_time.cmp(&a.received_time));

        for item in items {
            if run.is_exhausted() {
                break;
            }
            self.admit(item, &folder.name, run, records);
        }
        Ok(())
    }

    fn admit(
        &self,
        item: RawItem,
        folder_name: &str,
        run: &mut SearchRun,
        records: &mut Vec<EmailRecord>,
    ) {
        if item.entry_id.as_deref().is_some_and(|id| run.has_seen(id)) {
            return;
        }

        match normalize(item, folder_name, self.kind, self.config) {
            Ok(record) => {
                if run.admit(&record.entry_id) {
                    records.push(record);
                }
            }
            Err(e) => warn!("Skipping item in {}: {}", folder_name, e),
        }
    }

    async fn stop(&mut self, search: &SearchHandle) {
        if let Err(e) = self.session.stop_search(search).await {
            debug!("Stopping search {} failed: {}", search.tag, e);
        }
    }
}
