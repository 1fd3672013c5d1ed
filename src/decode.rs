//! Charset resolution and text decoding
//!
//! Decoding never fails: a part whose bytes do not fit the resolved
//! charset still yields a string, with U+FFFD at each malformed
//! sequence.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use tracing::{debug, warn};

/// How many leading bytes are scanned for an HTML charset declaration.
const META_SNIFF_LIMIT: usize = 1024;

/// Decode `bytes` using the declared charset, or a detected one when
/// none is declared or the label is unknown.
#[must_use]
pub fn decode_text(bytes: &[u8], declared: Option<&str>) -> String {
    let encoding = resolve_charset(bytes, declared);
    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(
            charset = actual.name(),
            "Replaced malformed byte sequences while decoding"
        );
    }
    text.into_owned()
}

/// Pick the encoding for a part.
#[must_use]
pub fn resolve_charset(bytes: &[u8], declared: Option<&str>) -> &'static Encoding {
    if let Some(label) = declared {
        if let Some(encoding) = Encoding::for_label(label.trim().as_bytes()) {
            return encoding;
        }
        warn!(charset = label, "Unknown declared charset, detecting instead");
    }
    detect_charset(bytes)
}

/// Guess the charset of undeclared bytes.
///
/// Checks a byte-order mark, then UTF-8 validity, then an HTML
/// `charset=` declaration near the top of the document. Anything
/// else is treated as Windows-1252, which maps every byte.
#[must_use]
pub fn detect_charset(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _bom_len)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    if let Some(encoding) = sniff_meta_charset(bytes) {
        return encoding;
    }
    WINDOWS_1252
}

/// Find `charset=...` in the first kilobyte, as written by
/// `<meta charset="...">` or `<meta http-equiv ... content="...; charset=...">`.
fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SNIFF_LIMIT)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    Encoding::for_label(label.as_bytes())
}
