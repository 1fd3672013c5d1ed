//! MIME parsing into a decoded message
//!
//! A fetched message is flattened into its leaf parts in document
//! order. Text parts are decoded with [`decode_text`], so a bad byte
//! in one part never prevents the rest of the message from being
//! shown.

use crate::decode::decode_text;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use mailparse::{MailHeaderMap, ParsedMail};
use serde::Serialize;
use tracing::warn;

/// One leaf MIME part.
#[derive(Debug, Clone)]
pub struct MessagePart {
    /// Lower-cased `type/subtype`.
    pub content_type: String,
    /// `Content-ID` without surrounding angle brackets.
    pub content_id: Option<String>,
    /// Charset from the `Content-Type` parameters, if any.
    pub charset: Option<String>,
    /// Body bytes after transfer decoding (base64, quoted-printable).
    pub raw: Vec<u8>,
    /// Decoded text for `text/*` parts.
    pub text: Option<String>,
}

impl MessagePart {
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type == "text/html"
    }
}

/// A fetched message with decoded headers and flattened parts.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub uid: u32,
    pub subject: String,
    pub from: String,
    pub date: Option<DateTime<Utc>>,
    pub parts: Vec<MessagePart>,
}

/// Header-level view of a message, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct MessageSummary {
    pub uid: u32,
    pub date: Option<DateTime<Utc>>,
    pub from: String,
    pub subject: String,
}

impl DecodedMessage {
    /// Parse a raw RFC 5322 message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the MIME structure cannot be parsed
    /// at all. Undecodable text never produces an error.
    pub fn parse(uid: u32, raw: &[u8]) -> Result<Self> {
        let mail = mailparse::parse_mail(raw).map_err(|e| Error::Parse(e.to_string()))?;
        let headers = mail.get_headers();

        let mut parts = Vec::new();
        collect_leaves(&mail, &mut parts);

        Ok(Self {
            uid,
            subject: headers.get_first_value("Subject").unwrap_or_default(),
            from: headers.get_first_value("From").unwrap_or_default(),
            date: headers
                .get_first_value("Date")
                .and_then(|d| mailparse::dateparse(&d).ok())
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            parts,
        })
    }

    /// The first `text/html` part.
    #[must_use]
    pub fn html_body(&self) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.is_html())
            .and_then(|p| p.text.as_deref())
    }

    /// The first `text/plain` part.
    #[must_use]
    pub fn text_body(&self) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.content_type == "text/plain")
            .and_then(|p| p.text.as_deref())
    }

    /// Find the part a `cid:` reference points at.
    ///
    /// Exact matches win; otherwise the comparison ignores ASCII case.
    #[must_use]
    pub fn part_by_content_id(&self, cid: &str) -> Option<&MessagePart> {
        let cid = strip_angle_brackets(cid);
        self.parts
            .iter()
            .find(|p| p.content_id.as_deref() == Some(cid))
            .or_else(|| {
                self.parts.iter().find(|p| {
                    p.content_id
                        .as_deref()
                        .is_some_and(|id| id.eq_ignore_ascii_case(cid))
                })
            })
    }

    /// Domain of the sender address, lower-cased.
    #[must_use]
    pub fn sender_domain(&self) -> Option<String> {
        sender_domain(&self.from)
    }

    #[must_use]
    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            uid: self.uid,
            date: self.date,
            from: self.from.clone(),
            subject: self.subject.clone(),
        }
    }
}

fn collect_leaves(mail: &ParsedMail<'_>, out: &mut Vec<MessagePart>) {
    if !mail.subparts.is_empty() {
        for sub in &mail.subparts {
            collect_leaves(sub, out);
        }
        return;
    }

    let content_type = mail.ctype.mimetype.to_ascii_lowercase();
    if content_type.starts_with("multipart/") {
        return;
    }

    let raw = match mail.get_body_raw() {
        Ok(raw) => raw,
        Err(e) => {
            warn!(content_type, error = %e, "Skipping undecodable MIME part");
            return;
        }
    };
    let charset = mail.ctype.params.get("charset").cloned();
    let text = content_type
        .starts_with("text/")
        .then(|| decode_text(&raw, charset.as_deref()));
    let content_id = mail
        .get_headers()
        .get_first_value("Content-ID")
        .map(|id| strip_angle_brackets(&id).to_string())
        .filter(|id| !id.is_empty());

    out.push(MessagePart {
        content_type,
        content_id,
        charset,
        raw,
        text,
    });
}

fn strip_angle_brackets(id: &str) -> &str {
    let id = id.trim();
    id.strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(id)
}

/// Extract the domain of the first address in a `From` value.
fn sender_domain(from: &str) -> Option<String> {
    let address = match mailparse::addrparse(from) {
        Ok(list) => list.extract_single_info().map(|info| info.addr),
        Err(_) => None,
    }
    .or_else(|| {
        from.split(|c: char| c.is_whitespace() || c == '<' || c == '>')
            .find(|token| token.contains('@'))
            .map(str::to_string)
    })?;

    let domain = address.rsplit_once('@')?.1.trim().to_ascii_lowercase();
    (!domain.is_empty()).then_some(domain)
}

/// Decode only the Subject of a raw header block.
#[must_use]
pub fn header_subject(raw_header: &[u8]) -> Option<String> {
    match mailparse::parse_headers(raw_header) {
        Ok((headers, _)) => headers.get_first_value("Subject"),
        Err(_) => {
            let text = String::from_utf8_lossy(raw_header);
            text.lines()
                .find_map(|line| {
                    line.get(..8)
                        .filter(|name| name.eq_ignore_ascii_case("subject:"))
                        .map(|_| line[8..].trim().to_string())
                })
        }
    }
}
