//! Subject search with fallbacks
//!
//! Servers disagree on `SEARCH SUBJECT`: some reject `CHARSET UTF-8`,
//! some cannot take the literal a non-ASCII search text needs, some
//! return nothing for encoded subjects. [`SubjectSearch`] tries each [`SearchStrategy`] in
//! order and stops at the first one that succeeds with hits.

use crate::error::{Error, Result};
use crate::message::header_subject;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// The IMAP operations a search needs.
#[allow(async_fn_in_trait)]
pub trait SearchBackend {
    /// Run `UID SEARCH <query>` on the selected mailbox.
    async fn uid_search(&mut self, query: &str) -> Result<Vec<u32>>;

    /// Largest non-synchronizing literal the server accepts (RFC 7888),
    /// or `None` without LITERAL+ / LITERAL-.
    fn literal_limit(&self) -> Option<usize>;

    /// The raw `Subject` header field of each of `uids`, in a single
    /// FETCH. Messages the server does not return are left out.
    async fn fetch_subjects(&mut self, uids: &[u32]) -> Result<Vec<(u32, Vec<u8>)>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStrategy {
    /// `UID SEARCH SUBJECT "..."`, ASCII queries only.
    ServerSubject,
    /// `UID SEARCH CHARSET UTF-8 SUBJECT ...`, with non-ASCII text
    /// sent as a literal.
    ServerSubjectUtf8,
    /// Fetch every subject header in one command and match the decoded
    /// subject locally, newest first.
    ClientScan,
}

impl SearchStrategy {
    pub const DEFAULT_ORDER: [Self; 3] = [Self::ServerSubject, Self::ServerSubjectUtf8, Self::ClientScan];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ServerSubject => "server-subject",
            Self::ServerSubjectUtf8 => "server-subject-utf8",
            Self::ClientScan => "client-scan",
        }
    }

    /// Run this strategy alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the command, or
    /// [`Error::Imap`] for a non-ASCII query under
    /// [`SearchStrategy::ServerSubject`] or against a server without
    /// non-synchronizing literals.
    pub async fn run<B: SearchBackend>(self, backend: &mut B, subject: &str) -> Result<Vec<u32>> {
        match self {
            Self::ServerSubject => {
                if !subject.is_ascii() {
                    return Err(Error::Imap(
                        "non-ASCII subject requires a charset-aware search".to_string(),
                    ));
                }
                let mut uids = backend.uid_search(&format!("SUBJECT {}", quote(subject)?)).await?;
                uids.sort_unstable();
                Ok(uids)
            }
            Self::ServerSubjectUtf8 => {
                let text = if subject.is_ascii() {
                    quote(subject)?
                } else {
                    literal(subject, backend.literal_limit())?
                };
                let query = format!("CHARSET UTF-8 SUBJECT {text}");
                let mut uids = backend.uid_search(&query).await?;
                uids.sort_unstable();
                Ok(uids)
            }
            Self::ClientScan => client_scan(backend, subject).await,
        }
    }
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Quote `s` as an IMAP quoted string.
///
/// # Errors
///
/// Returns [`Error::Imap`] if `s` contains CR or LF, which a quoted
/// string cannot carry.
pub fn quote(s: &str) -> Result<String> {
    if s.contains(['\r', '\n']) {
        return Err(Error::Imap("search text cannot contain line breaks".to_string()));
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    Ok(out)
}

/// `s` as a non-synchronizing literal (`{n+}` and the raw bytes).
///
/// # Errors
///
/// Returns [`Error::Imap`] if the server takes no non-synchronizing
/// literal of this size, or if `s` contains CR or LF.
pub fn literal(s: &str, limit: Option<usize>) -> Result<String> {
    if s.contains(['\r', '\n']) {
        return Err(Error::Imap("search text cannot contain line breaks".to_string()));
    }
    match limit {
        Some(limit) if s.len() <= limit => Ok(format!("{{{}+}}\r\n{s}", s.len())),
        Some(_) => Err(Error::Imap("search text too long for a literal".to_string())),
        None => Err(Error::Imap(
            "server does not accept non-synchronizing literals".to_string(),
        )),
    }
}

/// A compact UID set such as `1:3,7` covering `uids`.
pub fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for uid in sorted {
        match ranges.last_mut() {
            Some((_, end)) if end.checked_add(1) == Some(uid) => *end = uid,
            _ => ranges.push((uid, uid)),
        }
    }
    ranges
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}:{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

async fn client_scan<B: SearchBackend>(backend: &mut B, subject: &str) -> Result<Vec<u32>> {
    let needle = subject.to_lowercase();
    let mut all = backend.uid_search("ALL").await?;
    if all.is_empty() {
        return Ok(all);
    }
    all.sort_unstable_by(|a, b| b.cmp(a));
    debug!(messages = all.len(), "Scanning headers for subject");

    let matching: HashSet<u32> = backend
        .fetch_subjects(&all)
        .await?
        .into_iter()
        .filter(|(_, header)| {
            header_subject(header).is_some_and(|s| s.to_lowercase().contains(&needle))
        })
        .map(|(uid, _)| uid)
        .collect();
    all.retain(|uid| matching.contains(uid));
    Ok(all)
}

/// Result of a [`SubjectSearch`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub uids: Vec<u32>,
    /// The strategy that produced `uids`; `None` when every strategy
    /// came back empty or failed.
    pub strategy: Option<SearchStrategy>,
}

/// An ordered chain of strategies.
#[derive(Debug, Clone)]
pub struct SubjectSearch {
    strategies: Vec<SearchStrategy>,
}

impl Default for SubjectSearch {
    fn default() -> Self {
        Self {
            strategies: SearchStrategy::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl SubjectSearch {
    #[must_use]
    pub fn new(strategies: Vec<SearchStrategy>) -> Self {
        Self { strategies }
    }

    /// Find messages whose subject contains `subject`.
    ///
    /// Never fails: strategy errors are logged and the next strategy
    /// is tried. An empty outcome means nothing matched.
    pub async fn run<B: SearchBackend>(&self, backend: &mut B, subject: &str) -> SearchOutcome {
        for &strategy in &self.strategies {
            match strategy.run(backend, subject).await {
                Ok(uids) if !uids.is_empty() => {
                    debug!(%strategy, hits = uids.len(), "Search matched");
                    return SearchOutcome {
                        uids,
                        strategy: Some(strategy),
                    };
                }
                Ok(_) => debug!(%strategy, "Search returned no messages"),
                Err(e) => warn!(%strategy, error = %e, "Search strategy failed"),
            }
        }
        SearchOutcome::default()
    }
}
