//! Provider connection management
//!
//! A [`Connection`] is one connection context: it owns exactly one
//! provider session, the memoized shared-mailbox recipient and the
//! per-store folder cache. It is built from shared immutable
//! configuration and must stay with the task that created it.

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::provider::{FolderRef, MailProvider, MailSession, RecipientHandle};
use crate::record::MailboxKind;
use crate::strategy::FolderCache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

/// Result of a non-destructive access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessReport {
    pub connected: bool,
    pub personal_accessible: bool,
    pub personal_name: Option<String>,
    pub shared_configured: bool,
    pub shared_accessible: bool,
    pub shared_name: Option<String>,
    pub retention_personal_months: u32,
    pub retention_shared_months: u32,
    /// Non-fatal problems found while probing.
    pub errors: Vec<String>,
}

/// Delay before retry number `attempt + 1`: 1s, 2s, 4s, ...
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2_u64.saturating_pow(attempt))
}

pub struct Connection<P: MailProvider> {
    provider: Arc<P>,
    config: Arc<SearchConfig>,
    session: Option<Box<dyn MailSession>>,
    shared_recipient: Option<RecipientHandle>,
    folders: FolderCache,
}

impl<P: MailProvider> Connection<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, config: Arc<SearchConfig>) -> Self {
        Self {
            provider,
            config,
            session: None,
            shared_recipient: None,
            folders: FolderCache::default(),
        }
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub const fn config(&self) -> &Arc<SearchConfig> {
        &self.config
    }

    /// Establish the session, reusing it if already connected.
    ///
    /// Retries with exponential backoff up to
    /// `max_connection_retries` attempts. Returns whether a session is
    /// available; failures are logged, never returned.
    pub async fn connect(&mut self) -> bool {
        if self.session.is_some() {
            return true;
        }

        let attempts = self.config.max_connection_retries.max(1);
        for attempt in 0..attempts {
            let started = Instant::now();
            match open_session(self.provider.as_ref(), &self.config).await {
                Ok(session) => {
                    info!(
                        "Connected to mail provider in {:.2} seconds",
                        started.elapsed().as_secs_f64()
                    );
                    self.session = Some(session);
                    return true;
                }
                Err(e) => {
                    error!(
                        "Failed to connect to mail provider (attempt {}): {}",
                        attempt + 1,
                        e
                    );
                    if attempt + 1 < attempts {
                        let wait = backoff_delay(attempt);
                        info!("Retrying connection in {} seconds...", wait.as_secs());
                        sleep(wait).await;
                    }
                }
            }
        }

        false
    }

    /// The live session, or an error when not connected.
    pub(crate) fn session_mut(&mut self) -> Result<&mut (dyn MailSession + 'static)> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| Error::Connection("not connected".into()))
    }

    /// Session and folder cache, borrowed together for a search pass.
    pub(crate) fn search_parts(
        &mut self,
    ) -> Result<(&mut (dyn MailSession + 'static), &mut FolderCache)> {
        let session = self
            .session
            .as_deref_mut()
            .ok_or_else(|| Error::Connection("not connected".into()))?;
        Ok((session, &mut self.folders))
    }

    /// Open the inbox of the given mailbox.
    ///
    /// For the shared mailbox the resolved recipient is memoized and
    /// dropped again after any failure, so the next call resolves
    /// afresh.
    pub async fn open_mailbox(&mut self, kind: MailboxKind) -> Result<FolderRef> {
        match kind {
            MailboxKind::Personal => self.session_mut()?.inbox().await,
            MailboxKind::Shared => {
                let result = self.open_shared_inbox().await;
                if result.is_err() {
                    self.shared_recipient = None;
                }
                result
            }
        }
    }

    async fn open_shared_inbox(&mut self) -> Result<FolderRef> {
        let address = self
            .config
            .shared_mailbox_email
            .clone()
            .ok_or_else(|| Error::RecipientUnresolved("no shared mailbox configured".into()))?;

        let recipient = if let Some(cached) = &self.shared_recipient {
            cached.clone()
        } else {
            let resolved = self
                .session_mut()?
                .resolve_recipient(&address)
                .await?
                .ok_or_else(|| Error::RecipientUnresolved(address.clone()))?;
            self.shared_recipient = Some(resolved.clone());
            resolved
        };

        self.session_mut()?.shared_inbox(&recipient).await
    }

    /// Probe both mailboxes without modifying anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] only when no session can be
    /// established. Every other problem lands in
    /// [`AccessReport::errors`].
    pub async fn check_access(&mut self) -> Result<AccessReport> {
        if !self.connect().await {
            return Err(Error::Connection("Could not connect to mail provider".into()));
        }

        let mut report = AccessReport {
            connected: true,
            personal_accessible: false,
            personal_name: None,
            shared_configured: self.config.shared_configured(),
            shared_accessible: false,
            shared_name: None,
            retention_personal_months: self.config.personal_retention_months,
            retention_shared_months: self.config.shared_retention_months,
            errors: Vec::new(),
        };

        match self.reach_mailbox(MailboxKind::Personal).await {
            Ok(name) => {
                report.personal_accessible = true;
                report.personal_name = Some(name);
            }
            Err(e) => report.errors.push(format!("Personal mailbox error: {e}")),
        }

        if report.shared_configured {
            match self.reach_mailbox(MailboxKind::Shared).await {
                Ok(name) => {
                    report.shared_accessible = true;
                    report.shared_name = Some(name);
                }
                Err(e) => report.errors.push(format!("Shared mailbox error: {e}")),
            }
        }

        Ok(report)
    }

    async fn reach_mailbox(&mut self, kind: MailboxKind) -> Result<String> {
        let inbox = self.open_mailbox(kind).await?;
        let name = match self.session_mut()?.store_display_name(&inbox).await {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => "Mailbox".to_string(),
            Err(e) => {
                debug!("Could not read store name for {}: {}", kind, e);
                "Mailbox".to_string()
            }
        };
        Ok(name)
    }
}

/// Attach to a running provider session, else launch one.
///
/// Borrows only the provider and config: a `&Connection` held across
/// an await is not `Send`, since sessions are not `Sync`.
async fn open_session<P: MailProvider>(
    provider: &P,
    config: &SearchConfig,
) -> Result<Box<dyn MailSession>> {
    let mut session = match provider.attach().await {
        Ok(session) => {
            info!("Attached to running provider session");
            session
        }
        Err(e) => {
            info!("No running provider session ({}), launching a new one", e);
            provider.launch().await?
        }
    };

    if config.use_extended_mapi_login {
        match session.extended_logon().await {
            Ok(()) => debug!("Extended logon successful"),
            Err(e) => warn!("Extended logon failed: {}", e),
        }
    }

    Ok(session)
}
