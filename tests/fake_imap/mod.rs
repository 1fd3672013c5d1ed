//! Fake IMAP server for integration testing
//!
//! An in-process server that speaks enough IMAP to drive a
//! `MailboxSession` through a whole run: search, fetch, flag and
//! expunge. It listens with STARTTLS or implicit TLS and keeps its
//! mailbox behind a mutex so tests can inspect it afterwards.
//!
//! - `server` -- TCP listener, TLS setup and command dispatch
//! - `handlers/` -- command handlers
//! - `mailbox` -- test data model (folders, emails, builder)
//! - `io` -- shared write helpers

mod handlers;
mod server;

#[allow(unused_imports)]
pub use mailbox::{Mailbox, MailboxBuilder};
pub use server::FakeImapServer;
