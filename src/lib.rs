//! Subject-driven IMAP mail opener
//!
//! Finds messages whose subject contains a given text, renders each one
//! as a standalone HTML page (embedded and remote images inlined, links
//! replaced by the target their redirect chain ends at) and then
//! deletes, marks or keeps it. A run repeats this up to a requested
//! number of times with a randomized pause in between.
//!
//! The pieces are usable on their own: [`MailboxSession`] for IMAP
//! access, [`SubjectSearch`] for the search fallback chain,
//! [`rewrite_message`] for rendering and [`Runner`] for the loop.

mod config;
mod connection;
mod decode;
mod disposition;
mod error;
mod fetch;
mod flag;
mod folder;
mod html;
mod message;
mod present;
mod rewrite;
mod runner;
mod sampling;
mod search;
mod session;

pub use config::{AccountConfig, HttpConfig, Security};
pub use decode::{decode_text, detect_charset};
pub use disposition::Disposition;
pub use error::{Error, Result};
pub use fetch::{FetchedImage, Fetcher, HttpFetcher, RedirectMethod};
pub use flag::{Flag, store_query};
pub use folder::Folder;
pub use message::{DecodedMessage, MessagePart, MessageSummary};
pub use present::Presenter;
pub use rewrite::{LinkPolicy, RewriteOptions, RewriteStats, Rewritten, rewrite_html, rewrite_message};
pub use runner::{MailStore, MessageOutcome, RunOptions, RunReport, Runner};
pub use sampling::{ClickSampler, jittered_delay, pick_link};
pub use search::{SearchBackend, SearchOutcome, SearchStrategy, SubjectSearch};
pub use session::MailboxSession;
