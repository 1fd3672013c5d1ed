//! Message flags used when disposing of processed messages
//!
//! Only the two system flags the opener ever sets are modelled.
//! [`store_query`] builds the argument of a `UID STORE` command.

use std::fmt;

/// An IMAP system flag.
///
/// # Examples
///
/// ```
/// use mail_opener::{Flag, store_query};
///
/// assert_eq!(Flag::Seen.as_imap_str(), "\\Seen");
/// assert_eq!(store_query(&[Flag::Deleted]), "+FLAGS.SILENT (\\Deleted)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `\Seen`: the message has been read.
    Seen,
    /// `\Deleted`: the message is removed by the next EXPUNGE.
    Deleted,
}

impl Flag {
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Deleted => "\\Deleted",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

/// `UID STORE` argument adding `flags` without asking the server to
/// echo the new flag set.
#[must_use]
pub fn store_query(flags: &[Flag]) -> String {
    let list: Vec<&str> = flags.iter().map(|f| f.as_imap_str()).collect();
    format!("+FLAGS.SILENT ({})", list.join(" "))
}
