//! What happens to a message once it has been opened

use crate::error::{Error, Result};
use crate::flag::Flag;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// Flag `\Deleted` and expunge.
    #[default]
    Delete,
    /// Flag `\Seen` only.
    MarkRead,
    /// Leave the message untouched.
    Keep,
}

impl Disposition {
    /// Flags to add to the message.
    #[must_use]
    pub fn flags(self) -> &'static [Flag] {
        match self {
            Self::Delete => &[Flag::Deleted],
            Self::MarkRead => &[Flag::Seen],
            Self::Keep => &[],
        }
    }

    /// Whether the mailbox must be expunged afterwards.
    #[must_use]
    pub const fn expunges(self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl FromStr for Disposition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "mark-read" | "read" | "seen" => Ok(Self::MarkRead),
            "keep" | "none" => Ok(Self::Keep),
            other => Err(Error::Config(format!("unknown disposition: {other}"))),
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Delete => "delete",
            Self::MarkRead => "mark-read",
            Self::Keep => "keep",
        })
    }
}
