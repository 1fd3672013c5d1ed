//! Mailbox and HTTP configuration

use crate::error::{Error, Result};
use crate::folder::Folder;
use std::env;
use std::time::Duration;

/// How the IMAP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// TLS from the first byte (usually port 993).
    Tls,
    /// Plain TCP upgraded with STARTTLS (usually port 143).
    StartTls,
}

impl Security {
    const fn default_port(self) -> u16 {
        match self {
            Self::Tls => 993,
            Self::StartTls => 143,
        }
    }
}

impl std::str::FromStr for Security {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tls" | "ssl" | "imaps" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            other => Err(Error::Config(format!("Unknown IMAP security mode: {other}"))),
        }
    }
}

/// Credentials and server settings for one mailbox.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: Security,
    /// Skip certificate verification (self-signed bridges, test servers).
    pub accept_invalid_certs: bool,
    pub folder: Folder,
}

impl AccountConfig {
    /// Load every configured account from environment variables.
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    /// - `IMAP_HOST`
    ///
    /// Optional (with defaults):
    /// - `IMAP_SECURITY` (default: `tls`)
    /// - `IMAP_PORT` (default: 993 for `tls`, 143 for `starttls`)
    /// - `IMAP_ACCEPT_INVALID_CERTS` (default: `false`)
    /// - `IMAP_FOLDER` (default: `INBOX`, any other name is used verbatim)
    ///
    /// The first account uses the plain variable names. Further
    /// accounts repeat them with a numeric suffix (`IMAP_USERNAME_2`,
    /// `IMAP_PASSWORD_2`, ...). Loading stops at the first suffix
    /// without a username.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any present account is incomplete.
    pub fn all_from_env() -> Result<Vec<Self>> {
        dotenvy::dotenv().ok();
        Self::all_from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn all_from_lookup<F>(lookup: F) -> Result<Vec<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut accounts = vec![Self::from_lookup("", &lookup)?];
        for n in 2.. {
            let suffix = format!("_{n}");
            if lookup(&format!("IMAP_USERNAME{suffix}")).is_none() {
                break;
            }
            accounts.push(Self::from_lookup(&suffix, &lookup)?);
        }
        Ok(accounts)
    }

    pub(crate) fn from_lookup<F>(suffix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{name}{suffix}"));
        let required = |name: &str| {
            var(name).ok_or_else(|| Error::Config(format!("{name}{suffix} not set")))
        };

        let security = var("IMAP_SECURITY")
            .map_or(Ok(Security::Tls), |s| s.parse())?;
        let port = match var("IMAP_PORT") {
            Some(p) => p
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT{suffix}: {e}")))?,
            None => security.default_port(),
        };
        let accept_invalid_certs = var("IMAP_ACCEPT_INVALID_CERTS")
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        Ok(Self {
            host: required("IMAP_HOST")?,
            port,
            username: required("IMAP_USERNAME")?,
            password: required("IMAP_PASSWORD")?,
            security,
            accept_invalid_certs,
            folder: var("IMAP_FOLDER").map_or(Folder::Inbox, Folder::from),
        })
    }
}

/// Outbound HTTP settings shared by image and link requests.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_redirects: usize,
}

/// A desktop browser identity sent with every outbound request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
        }
    }
}

impl HttpConfig {
    /// Load HTTP settings from `HTTP_TIMEOUT_SECS`, `HTTP_USER_AGENT`
    /// and `HTTP_MAX_REDIRECTS`, falling back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a numeric value cannot be parsed.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout = match lookup("HTTP_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .map_err(|e| Error::Config(format!("Invalid HTTP_TIMEOUT_SECS: {e}")))?,
            ),
            None => defaults.timeout,
        };
        let max_redirects = match lookup("HTTP_MAX_REDIRECTS") {
            Some(v) => v
                .parse()
                .map_err(|e| Error::Config(format!("Invalid HTTP_MAX_REDIRECTS: {e}")))?,
            None => defaults.max_redirects,
        };
        Ok(Self {
            timeout,
            user_agent: lookup("HTTP_USER_AGENT").unwrap_or(defaults.user_agent),
            max_redirects,
        })
    }
}
