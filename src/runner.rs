//! Iteration controller
//!
//! One run opens up to `count` messages matching a subject, one per
//! iteration. The search is repeated every iteration so messages that
//! arrive or vanish mid-run are seen; a run ends early as soon as no
//! unprocessed match is left.

use crate::disposition::Disposition;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::message::DecodedMessage;
use crate::present::Presenter;
use crate::rewrite::{LinkPolicy, RewriteOptions, RewriteStats, rewrite_message};
use crate::sampling::{ClickSampler, jittered_delay};
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Mailbox operations a run needs.
#[allow(async_fn_in_trait)]
pub trait MailStore {
    /// UIDs of messages whose subject contains `subject`. Empty when
    /// nothing matches or the search failed.
    async fn search_subject(&mut self, subject: &str) -> Vec<u32>;

    async fn fetch_message(&mut self, uid: u32) -> Result<DecodedMessage>;

    async fn dispose(&mut self, uid: u32, disposition: Disposition) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub subject: String,
    /// Maximum number of messages to open.
    pub count: usize,
    /// Base pause between iterations, jittered by up to half either way.
    pub delay: Duration,
    /// Share of processed messages, in percent, whose links are
    /// resolved.
    pub click_percentage: u8,
    pub link_policy: LinkPolicy,
    pub disposition: Disposition,
}

impl RunOptions {
    /// One message, no delay, no link resolution, delete afterwards.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            count: 1,
            delay: Duration::ZERO,
            click_percentage: 0,
            link_policy: LinkPolicy::All,
            disposition: Disposition::Delete,
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageOutcome {
    pub iteration: usize,
    pub uid: u32,
    pub subject: Option<String>,
    /// Whether this message was sampled for link resolution.
    pub links_enabled: bool,
    pub stats: Option<RewriteStats>,
    pub page: Option<PathBuf>,
    pub disposed: bool,
    /// Fetch or parse failure; nothing was presented.
    pub error: Option<String>,
    pub disposition_error: Option<String>,
}

impl MessageOutcome {
    fn new(iteration: usize, uid: u32, links_enabled: bool) -> Self {
        Self {
            iteration,
            uid,
            subject: None,
            links_enabled,
            stats: None,
            page: None,
            disposed: false,
            error: None,
            disposition_error: None,
        }
    }

    /// Whether the message was opened.
    #[must_use]
    pub const fn opened(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub account: String,
    pub subject: String,
    pub requested: usize,
    pub outcomes: Vec<MessageOutcome>,
    /// Fewer than `requested` unprocessed matches were available.
    pub stopped_early: bool,
}

impl RunReport {
    /// Number of messages actually opened.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.outcomes.iter().filter(|o| o.opened()).count()
    }
}

/// Drives one run on one mailbox.
pub struct Runner<'a, M, F> {
    store: &'a mut M,
    fetcher: &'a F,
    presenter: &'a Presenter,
    account: String,
}

impl<'a, M: MailStore, F: Fetcher> Runner<'a, M, F> {
    pub fn new(
        account: impl Into<String>,
        store: &'a mut M,
        fetcher: &'a F,
        presenter: &'a Presenter,
    ) -> Self {
        Self {
            store,
            fetcher,
            presenter,
            account: account.into(),
        }
    }

    /// Run the iteration loop.
    ///
    /// Per-message failures are recorded in the report and never stop
    /// the run.
    pub async fn run<R: Rng + ?Sized>(&mut self, options: &RunOptions, rng: &mut R) -> RunReport {
        let mut clicks = ClickSampler::new(options.click_percentage);
        let mut processed = HashSet::new();
        let mut outcomes = Vec::new();
        let mut stopped_early = false;

        for iteration in 0..options.count {
            if iteration > 0 {
                let pause = jittered_delay(options.delay, rng);
                debug!(?pause, "Sleeping before next iteration");
                tokio::time::sleep(pause).await;
            }

            let pending: Vec<u32> = self
                .store
                .search_subject(&options.subject)
                .await
                .into_iter()
                .filter(|uid| !processed.contains(uid))
                .collect();
            let Some(&uid) = pending.first() else {
                info!(
                    account = %self.account,
                    iteration,
                    requested = options.count,
                    "No more matching messages"
                );
                stopped_early = true;
                break;
            };
            processed.insert(uid);

            let remaining = pending.len().min(options.count - iteration);
            let links_enabled = clicks.choose(remaining, rng);
            debug!(iteration, uid, links_enabled, "Link resolution sampled");

            let outcome = self
                .process(iteration, uid, links_enabled, options, rng)
                .await;
            outcomes.push(outcome);
        }

        RunReport {
            account: self.account.clone(),
            subject: options.subject.clone(),
            requested: options.count,
            outcomes,
            stopped_early,
        }
    }

    async fn process<R: Rng + ?Sized>(
        &mut self,
        iteration: usize,
        uid: u32,
        links_enabled: bool,
        options: &RunOptions,
        rng: &mut R,
    ) -> MessageOutcome {
        let mut outcome = MessageOutcome::new(iteration, uid, links_enabled);

        let message = match self.store.fetch_message(uid).await {
            Ok(message) => message,
            Err(e) => {
                warn!(account = %self.account, uid, error = %e, "Failed to fetch message");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };
        outcome.subject = Some(message.subject.clone());

        let rewrite_options = RewriteOptions {
            resolve_links: links_enabled,
            link_policy: options.link_policy,
        };
        let page = rewrite_message(&message, self.fetcher, &rewrite_options, rng).await;
        outcome.stats = Some(page.stats);

        match self.presenter.present(&self.account, &message, &page).await {
            Ok(path) => outcome.page = path,
            Err(e) => warn!(uid, error = %e, "Failed to save page"),
        }

        match self.store.dispose(uid, options.disposition).await {
            Ok(()) => outcome.disposed = true,
            Err(e) => {
                warn!(account = %self.account, uid, disposition = %options.disposition, error = %e, "Disposition failed");
                outcome.disposition_error = Some(e.to_string());
            }
        }
        outcome
    }
}
