//! In-memory mail provider
//!
//! Holds a personal store and any number of shared stores entirely in
//! memory. Used by the test suite and handy for embedding the engine
//! without a live mail server. Connection failures, failing folders
//! and slow indexed searches can be scripted, and every provider call
//! is counted in [`ProviderStats`].

use crate::error::{Error, Result};
use crate::localize::{ScopeToken, canonical_path};
use crate::provider::{FolderRef, MailProvider, MailSession, RecipientHandle, SearchHandle};
use crate::query::Filter;
use crate::record::{MailboxKind, RawItem};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How indexed searches behave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdvancedBehavior {
    /// All matches are visible at the first poll.
    #[default]
    Immediate,
    /// Each poll reveals `per_poll` more matches.
    Trickle { per_poll: usize },
    /// Issuing the search fails.
    Fail,
}

/// Call counters and recorded arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderStats {
    pub attach_calls: usize,
    pub launch_calls: usize,
    pub extended_logons: usize,
    pub recipient_resolutions: usize,
    pub root_folder_listings: usize,
    pub advanced_searches: usize,
    pub restricts: usize,
    pub stopped_searches: usize,
    /// Quoted scope of every indexed search, in issue order.
    pub scopes: Vec<String>,
    /// Rendered filter of every indexed search and restrict.
    pub filters: Vec<String>,
}

/// One mail store: a display name and its top-level folders.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    display_name: String,
    inbox: String,
    folders: Vec<(String, Vec<RawItem>)>,
}

impl MemoryStore {
    /// A store with an empty `Inbox`.
    #[must_use]
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            inbox: "Inbox".to_string(),
            folders: vec![("Inbox".to_string(), Vec::new())],
        }
    }

    /// Rename the default inbox, e.g. to a localized name.
    #[must_use]
    pub fn inbox_name(mut self, name: &str) -> Self {
        if let Some(folder) = self.folders.iter_mut().find(|(n, _)| *n == self.inbox) {
            folder.0 = name.to_string();
        }
        self.inbox = name.to_string();
        self
    }

    /// Add an empty top-level folder.
    #[must_use]
    pub fn folder(mut self, name: &str) -> Self {
        self.folder_mut(name);
        self
    }

    /// Add `item` to `folder`, creating the folder if needed.
    #[must_use]
    pub fn item(mut self, folder: &str, item: RawItem) -> Self {
        self.folder_mut(folder).push(item);
        self
    }

    fn folder_mut(&mut self, name: &str) -> &mut Vec<RawItem> {
        let idx = match self.folders.iter().position(|(n, _)| n == name) {
            Some(idx) => idx,
            None => {
                self.folders.push((name.to_string(), Vec::new()));
                self.folders.len() - 1
            }
        };
        &mut self.folders[idx].1
    }

    fn folder_ref(&self, store_id: &str, name: &str) -> FolderRef {
        FolderRef {
            id: format!("{store_id}/{name}"),
            name: name.to_string(),
            path: format!("\\\\{}\\{}", self.display_name, name),
            store_id: store_id.to_string(),
        }
    }
}

struct RunningSearch {
    matches: Vec<RawItem>,
    polls: usize,
}

struct State {
    /// Index 0 is the personal store.
    stores: Vec<MemoryStore>,
    shared: HashMap<String, usize>,
    session_running: bool,
    connect_failures: u32,
    advanced: AdvancedBehavior,
    failing_inboxes: Vec<MailboxKind>,
    searches: HashMap<String, RunningSearch>,
    next_search: usize,
    stats: ProviderStats,
}

impl State {
    fn store_index(store_id: &str) -> Result<usize> {
        store_id
            .strip_prefix("store-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Error::FolderUnavailable(format!("unknown store {store_id}")))
    }

    fn store(&self, store_id: &str) -> Result<&MemoryStore> {
        self.stores
            .get(Self::store_index(store_id)?)
            .ok_or_else(|| Error::FolderUnavailable(format!("unknown store {store_id}")))
    }

    fn inbox_of(&self, idx: usize, kind: MailboxKind) -> Result<FolderRef> {
        if self.failing_inboxes.contains(&kind) {
            return Err(Error::FolderUnavailable(format!("{kind} inbox unavailable")));
        }
        let store = self
            .stores
            .get(idx)
            .ok_or_else(|| Error::FolderUnavailable(format!("no store {idx}")))?;
        Ok(store.folder_ref(&format!("store-{idx}"), &store.inbox))
    }

    fn items_in(&self, folder: &FolderRef) -> Result<&[RawItem]> {
        self.store(&folder.store_id)?
            .folders
            .iter()
            .find(|(name, _)| *name == folder.name)
            .map(|(_, items)| items.as_slice())
            .ok_or_else(|| Error::FolderUnavailable(folder.path.clone()))
    }

    fn items_in_scope(&self, scope: &ScopeToken) -> Option<&[RawItem]> {
        self.stores.iter().enumerate().find_map(|(idx, store)| {
            store.folders.iter().find_map(|(name, items)| {
                let path = store.folder_ref(&format!("store-{idx}"), name).path;
                (canonical_path(&path) == scope.path()).then_some(items.as_slice())
            })
        })
    }
}

fn matching(items: &[RawItem], filter: &Filter) -> Vec<RawItem> {
    items
        .iter()
        .filter(|item| {
            filter.matches(
                item.subject.as_deref().unwrap_or_default(),
                item.body.as_deref().unwrap_or_default(),
            )
        })
        .cloned()
        .collect()
}

/// A scripted, in-memory [`MailProvider`].
#[derive(Clone)]
pub struct InMemoryProvider {
    state: Arc<Mutex<State>>,
}

impl InMemoryProvider {
    #[must_use]
    pub fn new(personal: MemoryStore) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                stores: vec![personal],
                shared: HashMap::new(),
                session_running: true,
                connect_failures: 0,
                advanced: AdvancedBehavior::default(),
                failing_inboxes: Vec::new(),
                searches: HashMap::new(),
                next_search: 0,
                stats: ProviderStats::default(),
            })),
        }
    }

    /// Expose `store` as the delegated mailbox of `address`.
    #[must_use]
    pub fn with_shared(self, address: &str, store: MemoryStore) -> Self {
        {
            let mut state = self.lock();
            state.stores.push(store);
            let idx = state.stores.len() - 1;
            state.shared.insert(address.to_lowercase(), idx);
        }
        self
    }

    /// Make [`MailProvider::attach`] fail so sessions must be launched.
    #[must_use]
    pub fn without_running_session(self) -> Self {
        self.lock().session_running = false;
        self
    }

    /// Fail the next `n` connection attempts (attach and launch).
    #[must_use]
    pub fn with_connect_failures(self, n: u32) -> Self {
        self.lock().connect_failures = n;
        self
    }

    #[must_use]
    pub fn with_advanced_search(self, behavior: AdvancedBehavior) -> Self {
        self.set_advanced_search(behavior);
        self
    }

    pub fn set_advanced_search(&self, behavior: AdvancedBehavior) {
        self.lock().advanced = behavior;
    }

    /// Make opening the inbox of `kind` fail until reset.
    pub fn set_inbox_failure(&self, kind: MailboxKind, failing: bool) {
        let mut state = self.lock();
        state.failing_inboxes.retain(|k| *k != kind);
        if failing {
            state.failing_inboxes.push(kind);
        }
    }

    #[must_use]
    pub fn stats(&self) -> ProviderStats {
        self.lock().stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> Box<dyn MailSession> {
        Box::new(MemorySession {
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl MailProvider for InMemoryProvider {
    async fn attach(&self) -> Result<Box<dyn MailSession>> {
        let mut state = self.lock();
        state.stats.attach_calls += 1;
        if !state.session_running || state.connect_failures > 0 {
            return Err(Error::Connection("no running session".into()));
        }
        drop(state);
        Ok(self.session())
    }

    async fn launch(&self) -> Result<Box<dyn MailSession>> {
        let mut state = self.lock();
        state.stats.launch_calls += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(Error::Connection("provider unavailable".into()));
        }
        state.session_running = true;
        drop(state);
        Ok(self.session())
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
}

impl MemorySession {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MailSession for MemorySession {
    async fn extended_logon(&mut self) -> Result<()> {
        self.lock().stats.extended_logons += 1;
        Ok(())
    }

    async fn resolve_recipient(&mut self, address: &str) -> Result<Option<RecipientHandle>> {
        let mut state = self.lock();
        state.stats.recipient_resolutions += 1;
        Ok(state
            .shared
            .get(&address.to_lowercase())
            .map(|idx| RecipientHandle {
                address: address.to_string(),
                id: format!("store-{idx}"),
            }))
    }

    async fn inbox(&mut self) -> Result<FolderRef> {
        self.lock().inbox_of(0, MailboxKind::Personal)
    }

    async fn shared_inbox(&mut self, recipient: &RecipientHandle) -> Result<FolderRef> {
        let idx = State::store_index(&recipient.id)?;
        self.lock().inbox_of(idx, MailboxKind::Shared)
    }

    async fn store_display_name(&mut self, folder: &FolderRef) -> Result<String> {
        Ok(self.lock().store(&folder.store_id)?.display_name.clone())
    }

    async fn root_folders(&mut self, store_id: &str) -> Result<Vec<FolderRef>> {
        let mut state = self.lock();
        state.stats.root_folder_listings += 1;
        let store = state.store(store_id)?;
        Ok(store
            .folders
            .iter()
            .map(|(name, _)| store.folder_ref(store_id, name))
            .collect())
    }

    async fn advanced_search(
        &mut self,
        scope: &ScopeToken,
        filter: &Filter,
        _recurse_subfolders: bool,
        tag: &str,
    ) -> Result<SearchHandle> {
        let mut state = self.lock();
        state.stats.advanced_searches += 1;
        state.stats.scopes.push(scope.quoted());
        state.stats.filters.push(filter.to_sql());

        if state.advanced == AdvancedBehavior::Fail {
            return Err(Error::Search("indexed search unavailable".into()));
        }

        let matches = state
            .items_in_scope(scope)
            .map(|items| matching(items, filter))
            .ok_or_else(|| Error::Search(format!("scope not found: {scope}")))?;

        state.next_search += 1;
        let id = format!("search-{}", state.next_search);
        state
            .searches
            .insert(id.clone(), RunningSearch { matches, polls: 0 });

        Ok(SearchHandle {
            id,
            tag: tag.to_string(),
        })
    }

    async fn search_count(&mut self, search: &SearchHandle) -> Result<usize> {
        let mut state = self.lock();
        let behavior = state.advanced;
        let running = state
            .searches
            .get_mut(&search.id)
            .ok_or_else(|| Error::Search(format!("unknown search {}", search.id)))?;
        running.polls += 1;

        Ok(match behavior {
            AdvancedBehavior::Trickle { per_poll } => {
                running.matches.len().min(per_poll * running.polls)
            }
            AdvancedBehavior::Immediate | AdvancedBehavior::Fail => running.matches.len(),
        })
    }

    async fn search_item(&mut self, search: &SearchHandle, index: usize) -> Result<RawItem> {
        self.lock()
            .searches
            .get(&search.id)
            .and_then(|running| running.matches.get(index).cloned())
            .ok_or_else(|| Error::Extraction(format!("no result {index} in {}", search.id)))
    }

    async fn stop_search(&mut self, search: &SearchHandle) -> Result<()> {
        let mut state = self.lock();
        state.searches.remove(&search.id);
        state.stats.stopped_searches += 1;
        Ok(())
    }

    async fn restrict(&mut self, folder: &FolderRef, filter: &Filter) -> Result<Vec<RawItem>> {
        let mut state = self.lock();
        state.stats.restricts += 1;
        state.stats.filters.push(filter.to_sql());
        let items = state.items_in(folder)?;
        Ok(matching(items, filter))
    }
}
