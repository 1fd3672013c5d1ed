//! A logged-in session on one mailbox folder

use crate::config::AccountConfig;
use crate::connection::{self, ImapSession};
use crate::disposition::Disposition;
use crate::error::{Error, Result};
use crate::flag::{Flag, store_query};
use crate::message::{DecodedMessage, MessageSummary};
use crate::runner::MailStore;
use crate::search::{SearchBackend, SearchOutcome, SubjectSearch, uid_set};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

/// An authenticated IMAP session with a folder selected.
///
/// Opened once per account and reused for every search and fetch of a
/// run.
pub struct MailboxSession {
    session: ImapSession,
    account: String,
    literal_limit: Option<usize>,
}

impl MailboxSession {
    /// Connect, log in and select the account's folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, login or SELECT fails.
    pub async fn open(config: &AccountConfig) -> Result<Self> {
        let mut session = connection::connect(config).await?;
        connection::select(&mut session, &config.folder).await?;
        debug!(account = %config.username, folder = %config.folder, "Folder selected");

        // RFC 7888: LITERAL- only covers literals up to 4096 bytes.
        let literal_limit = match session.capabilities().await {
            Ok(caps) if caps.has_str("LITERAL+") => Some(usize::MAX),
            Ok(caps) if caps.has_str("LITERAL-") => Some(4096),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "CAPABILITY failed, searching without literals");
                None
            }
        };

        Ok(Self {
            session,
            account: config.username.clone(),
            literal_limit,
        })
    }

    /// Run the subject search chain on the selected folder.
    pub async fn search_subject(&mut self, subject: &str) -> SearchOutcome {
        let outcome = SubjectSearch::default().run(self, subject).await;
        info!(
            account = %self.account,
            subject,
            hits = outcome.uids.len(),
            strategy = outcome.strategy.map(|s| s.name()),
            "Subject search finished"
        );
        outcome
    }

    /// List all folders of the account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Imap`] if the LIST command fails.
    pub async fn list_folders(&mut self) -> Result<Vec<String>> {
        let mut folder_stream = self
            .session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| Error::Imap(format!("List folders failed: {e}")))?;

        let mut names = Vec::new();
        while let Some(item) = folder_stream.next().await {
            if let Some(name) = parsed_or_warn(&self.account, item, "LIST") {
                names.push(name.name().to_string());
            }
        }
        Ok(names)
    }

    /// Fetch the full raw message without setting `\Seen`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Imap`] if the FETCH fails or the server returns
    /// no body for `uid`.
    pub async fn fetch_raw(&mut self, uid: u32) -> Result<Vec<u8>> {
        let messages: Vec<_> = self
            .session
            .uid_fetch(uid.to_string(), "(BODY.PEEK[])")
            .await
            .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;

        messages
            .iter()
            .find_map(|msg| msg.body())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::Imap(format!("No body found for UID {uid}")))
    }

    /// Fetch and parse one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails or the message cannot be
    /// parsed.
    pub async fn fetch_message(&mut self, uid: u32) -> Result<DecodedMessage> {
        let raw = self.fetch_raw(uid).await?;
        DecodedMessage::parse(uid, &raw)
    }

    /// The raw header block of one message.
    async fn fetch_header(&mut self, uid: u32) -> Result<Vec<u8>> {
        let messages: Vec<_> = self
            .session
            .uid_fetch(uid.to_string(), "(RFC822.HEADER)")
            .await
            .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;

        messages
            .iter()
            .find_map(|msg| msg.header())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::Imap(format!("No header found for UID {uid}")))
    }

    /// Headers of each UID, skipping messages that fail to fetch.
    pub async fn summaries(&mut self, uids: &[u32]) -> Vec<MessageSummary> {
        let mut summaries = Vec::with_capacity(uids.len());
        for &uid in uids {
            let header = match self.fetch_header(uid).await {
                Ok(header) => header,
                Err(e) => {
                    warn!(uid, error = %e, "Failed to fetch header");
                    continue;
                }
            };
            match DecodedMessage::parse(uid, &header) {
                Ok(message) => summaries.push(message.summary()),
                Err(e) => warn!(uid, error = %e, "Failed to parse header"),
            }
        }
        summaries
    }

    /// Add `flags` to one message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Imap`] if the STORE fails.
    pub async fn add_flags(&mut self, uid: u32, flags: &[Flag]) -> Result<()> {
        if flags.is_empty() {
            return Ok(());
        }
        let _: Vec<_> = self
            .session
            .uid_store(uid.to_string(), store_query(flags))
            .await
            .map_err(|e| Error::Imap(format!("Store failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("Store failed: {e}")))?;
        Ok(())
    }

    /// Permanently remove messages flagged `\Deleted`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Imap`] if the EXPUNGE fails.
    pub async fn expunge(&mut self) -> Result<()> {
        let removed: Vec<u32> = self
            .session
            .expunge()
            .await
            .map_err(|e| Error::Imap(format!("Expunge failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("Expunge failed: {e}")))?;
        debug!(removed = removed.len(), "Expunged");
        Ok(())
    }

    /// Apply `disposition` to one message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Imap`] if the STORE or EXPUNGE fails.
    pub async fn dispose(&mut self, uid: u32, disposition: Disposition) -> Result<()> {
        self.add_flags(uid, disposition.flags()).await?;
        if disposition.expunges() {
            self.expunge().await?;
        }
        debug!(uid, %disposition, "Message disposed");
        Ok(())
    }

    /// Log out, ignoring errors; the connection is going away either
    /// way.
    pub async fn logout(mut self) {
        self.session.logout().await.ok();
    }
}

impl SearchBackend for MailboxSession {
    async fn uid_search(&mut self, query: &str) -> Result<Vec<u32>> {
        let uids = self
            .session
            .uid_search(query)
            .await
            .map_err(|e| Error::Imap(format!("Search failed: {e}")))?;
        Ok(uids.into_iter().collect())
    }

    fn literal_limit(&self) -> Option<usize> {
        self.literal_limit
    }

    async fn fetch_subjects(&mut self, uids: &[u32]) -> Result<Vec<(u32, Vec<u8>)>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let messages: Vec<_> = self
            .session
            .uid_fetch(uid_set(uids), "(UID BODY.PEEK[HEADER.FIELDS (SUBJECT)])")
            .await
            .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;

        Ok(messages
            .iter()
            .filter_map(|msg| Some((msg.uid?, msg.header()?.to_vec())))
            .collect())
    }
}

impl MailStore for MailboxSession {
    async fn search_subject(&mut self, subject: &str) -> Vec<u32> {
        Self::search_subject(self, subject).await.uids
    }

    async fn fetch_message(&mut self, uid: u32) -> Result<DecodedMessage> {
        Self::fetch_message(self, uid).await
    }

    async fn dispose(&mut self, uid: u32, disposition: Disposition) -> Result<()> {
        Self::dispose(self, uid, disposition).await
    }
}

/// Keep a parsed stream item, or log why it was dropped.
fn parsed_or_warn<T, E: std::fmt::Display>(
    account: &str,
    item: std::result::Result<T, E>,
    command: &str,
) -> Option<T> {
    match item {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(account, command, error = %e, "Skipping unparsable response");
            None
        }
    }
}
