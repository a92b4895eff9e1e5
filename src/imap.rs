//! IMAP mail provider
//!
//! Maps the provider interface onto a plain IMAP server reached over
//! STARTTLS, such as a local mail bridge:
//!
//! - the personal inbox is `INBOX`
//! - delegated mailboxes live under the other-users namespace
//!   (RFC 2342), e.g. `Other Users/team@example.com/INBOX`
//! - an indexed search is a `UID SEARCH` that completes immediately, so
//!   its count is stable from the first poll
//! - entry ids are `<folder>:<uid>`
//!
//! The hierarchy delimiter is assumed to be `/`.

use crate::config::ImapConfig;
use crate::error::{Error, Result};
use crate::localize::ScopeToken;
use crate::provider::{FolderRef, MailProvider, MailSession, RecipientHandle, SearchHandle};
use crate::query::Filter;
use crate::record::{RawItem, RawRecipient};
use crate::transport::{self, ImapSession};
use async_imap::types::Flag;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use email_extract::{EmailAddress, parse_email};
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const INBOX: &str = "INBOX";

/// [`MailProvider`] backed by an IMAP server.
pub struct ImapProvider {
    config: ImapConfig,
}

impl ImapProvider {
    #[must_use]
    pub const fn new(config: ImapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailProvider for ImapProvider {
    async fn attach(&self) -> Result<Box<dyn MailSession>> {
        let session = transport::open(&self.config).await?;
        Ok(Box::new(ImapMailSession {
            session,
            account: self.config.username.clone(),
            namespace: self.config.shared_namespace.clone(),
            selected: None,
            searches: HashMap::new(),
            next_search: 0,
        }))
    }

    async fn launch(&self) -> Result<Box<dyn MailSession>> {
        Err(Error::Connection(format!(
            "no IMAP server listening on {}:{}; start the bridge first",
            self.config.host, self.config.port
        )))
    }
}

struct CompletedSearch {
    folder: String,
    uids: Vec<u32>,
}

struct ImapMailSession {
    session: ImapSession,
    account: String,
    namespace: String,
    selected: Option<String>,
    searches: HashMap<String, CompletedSearch>,
    next_search: usize,
}

impl ImapMailSession {
    async fn list(&mut self, pattern: &str) -> Result<Vec<String>> {
        let mut stream = self
            .session
            .list(Some(""), Some(&quote(pattern)))
            .await
            .map_err(|e| Error::Imap(format!("List folders failed: {e}")))?;

        let mut names = Vec::new();
        while let Some(item) = stream.next().await {
            if let Ok(name) = item {
                names.push(name.name().to_string());
            }
        }
        drop(stream);
        Ok(names)
    }

    async fn select(&mut self, folder: &str) -> Result<()> {
        if self.selected.as_deref() == Some(folder) {
            return Ok(());
        }
        // A failed SELECT leaves no folder selected.
        self.selected = None;
        self.session
            .select(folder)
            .await
            .map_err(|e| Error::Imap(format!("Failed to select {folder}: {e}")))?;
        self.selected = Some(folder.to_string());
        Ok(())
    }

    async fn uid_search(&mut self, folder: &str, filter: &Filter) -> Result<Vec<u32>> {
        self.select(folder).await?;
        let criteria = imap_criteria(filter);
        let uids = self
            .session
            .uid_search(&criteria)
            .await
            .map_err(|e| Error::Search(format!("UID SEARCH {criteria} failed: {e}")))?;

        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_item(&mut self, folder: &str, uid: u32) -> Result<RawItem> {
        self.select(folder).await?;
        let mut messages = self
            .session
            .uid_fetch(uid.to_string(), "(UID FLAGS RFC822.SIZE BODY.PEEK[])")
            .await
            .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?;

        // Drain the whole response so the tagged completion is consumed.
        let mut item = None;
        while let Some(msg_result) = messages.next().await {
            let msg = msg_result.map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;
            if item.is_some() {
                continue;
            }
            let seen = msg.flags().any(|f| matches!(f, Flag::Seen));
            if let Some(body) = msg.body() {
                item = Some(item_from_message(folder, uid, seen, msg.size, body));
            }
        }
        drop(messages);

        item.unwrap_or_else(|| Err(Error::Extraction(format!("No body found for {folder}:{uid}"))))
    }
}

#[async_trait]
impl MailSession for ImapMailSession {
    async fn extended_logon(&mut self) -> Result<()> {
        // LOGIN already authenticated the session; just confirm it.
        self.session
            .noop()
            .await
            .map_err(|e| Error::Imap(format!("NOOP failed: {e}")))
    }

    async fn resolve_recipient(&mut self, address: &str) -> Result<Option<RecipientHandle>> {
        let root = format!("{}/{}", self.namespace, address);
        let found = self.list(&root).await?;
        debug!("Other-users lookup for {} found {:?}", address, found);

        Ok(found.into_iter().next().map(|id| RecipientHandle {
            address: address.to_string(),
            id,
        }))
    }

    async fn inbox(&mut self) -> Result<FolderRef> {
        Ok(FolderRef {
            id: INBOX.to_string(),
            name: INBOX.to_string(),
            path: INBOX.to_string(),
            store_id: String::new(),
        })
    }

    async fn shared_inbox(&mut self, recipient: &RecipientHandle) -> Result<FolderRef> {
        let path = format!("{}/{INBOX}", recipient.id);
        if self.list(&path).await?.is_empty() {
            return Err(Error::FolderUnavailable(path));
        }
        Ok(FolderRef {
            id: path.clone(),
            name: INBOX.to_string(),
            path,
            store_id: recipient.id.clone(),
        })
    }

    async fn store_display_name(&mut self, folder: &FolderRef) -> Result<String> {
        if folder.store_id.is_empty() {
            return Ok(self.account.clone());
        }
        Ok(folder
            .store_id
            .rsplit('/')
            .next()
            .unwrap_or(&folder.store_id)
            .to_string())
    }

    async fn root_folders(&mut self, store_id: &str) -> Result<Vec<FolderRef>> {
        let pattern = if store_id.is_empty() {
            "%".to_string()
        } else {
            format!("{store_id}/%")
        };

        Ok(self
            .list(&pattern)
            .await?
            .into_iter()
            .map(|path| FolderRef {
                id: path.clone(),
                name: path.rsplit('/').next().unwrap_or(&path).to_string(),
                path,
                store_id: store_id.to_string(),
            })
            .collect())
    }

    async fn advanced_search(
        &mut self,
        scope: &ScopeToken,
        filter: &Filter,
        _recurse_subfolders: bool,
        tag: &str,
    ) -> Result<SearchHandle> {
        let folder = scope.path().to_string();
        let uids = self.uid_search(&folder, filter).await?;
        info!("{} matched {} messages in {}", tag, uids.len(), folder);

        self.next_search += 1;
        let id = format!("{tag}#{}", self.next_search);
        self.searches
            .insert(id.clone(), CompletedSearch { folder, uids });

        Ok(SearchHandle {
            id,
            tag: tag.to_string(),
        })
    }

    async fn search_count(&mut self, search: &SearchHandle) -> Result<usize> {
        self.searches
            .get(&search.id)
            .map(|s| s.uids.len())
            .ok_or_else(|| Error::Search(format!("unknown search {}", search.id)))
    }

    async fn search_item(&mut self, search: &SearchHandle, index: usize) -> Result<RawItem> {
        let (folder, uid) = self
            .searches
            .get(&search.id)
            .and_then(|s| s.uids.get(index).map(|uid| (s.folder.clone(), *uid)))
            .ok_or_else(|| Error::Extraction(format!("no result {index} in {}", search.id)))?;
        self.fetch_item(&folder, uid).await
    }

    async fn stop_search(&mut self, search: &SearchHandle) -> Result<()> {
        self.searches.remove(&search.id);
        Ok(())
    }

    async fn restrict(&mut self, folder: &FolderRef, filter: &Filter) -> Result<Vec<RawItem>> {
        let uids = self.uid_search(&folder.id, filter).await?;

        let mut items = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.fetch_item(&folder.id, uid).await {
                Ok(item) => items.push(item),
                Err(e) => warn!("Failed to fetch {}:{}: {}", folder.id, uid, e),
            }
        }
        Ok(items)
    }
}

/// Render a [`Filter`] as IMAP `SEARCH` criteria.
#[must_use]
pub fn imap_criteria(filter: &Filter) -> String {
    let text = quote(filter.text());
    let charset = if filter.text().is_ascii() {
        ""
    } else {
        "CHARSET UTF-8 "
    };

    match filter {
        Filter::PhraseMatch(_) => format!("{charset}OR SUBJECT {text} BODY {text}"),
        Filter::SubjectContains(_) => format!("{charset}SUBJECT {text}"),
    }
}

/// IMAP quoted string: backslash and double quote are escaped.
fn quote(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Build a [`RawItem`] from a fetched RFC 2822 message.
pub fn item_from_message(
    folder: &str,
    uid: u32,
    seen: bool,
    size: Option<u32>,
    raw: &[u8],
) -> Result<RawItem> {
    let email = parse_email(uid, raw).map_err(|e| Error::Parse(e.to_string()))?;

    let recipients = email
        .to
        .iter()
        .chain(email.cc.iter())
        .map(|r| RawRecipient {
            name: r.name.as_ref().map(|n| n.full.clone()),
            address: Some(r.address.clone()),
        })
        .collect();

    Ok(RawItem {
        entry_id: Some(format!("{folder}:{uid}")),
        subject: Some(email.subject.original.clone()),
        sender_name: Some(display_name(&email.from)),
        sender_email: Some(email.from.address.clone()),
        recipients: Some(recipients),
        received_time: Utc.timestamp_opt(email.date.timestamp(), 0).single(),
        importance: None,
        body: Some(email.body.best_text().to_string()),
        size: size.map(u64::from),
        attachment_count: None,
        unread: Some(!seen),
    })
}

/// The display name of `address`, or the bare address when it has none.
fn display_name(address: &EmailAddress) -> String {
    address
        .name
        .as_ref()
        .map(|n| n.full.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or(&address.address)
        .to_string()
}
