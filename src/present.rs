//! Where rewritten pages end up

use crate::error::Result;
use crate::message::DecodedMessage;
use crate::rewrite::Rewritten;
use std::path::PathBuf;
use tracing::{debug, info};

/// Hands rewritten pages to the user.
///
/// With an output directory every page is written to
/// `<dir>/<account>-<uid>.html`; without one the page is only logged.
#[derive(Debug, Clone, Default)]
pub struct Presenter {
    output_dir: Option<PathBuf>,
}

impl Presenter {
    #[must_use]
    pub const fn new(output_dir: Option<PathBuf>) -> Self {
        Self { output_dir }
    }

    /// Present one page. Returns the file written, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the page cannot be written.
    pub async fn present(
        &self,
        account: &str,
        message: &DecodedMessage,
        page: &Rewritten,
    ) -> Result<Option<PathBuf>> {
        info!(
            account,
            uid = message.uid,
            subject = %message.subject,
            from = %message.from,
            images = page.stats.images_inlined,
            links = page.stats.links_resolved,
            "Opened message"
        );

        let Some(dir) = &self.output_dir else {
            debug!(uid = message.uid, bytes = page.html.len(), "No output directory, page not saved");
            return Ok(None);
        };

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(page_file_name(account, message.uid));
        tokio::fs::write(&path, page.html.as_bytes()).await?;
        debug!(path = %path.display(), "Page written");
        Ok(Some(path))
    }
}

/// `<account>-<uid>.html` with anything outside `[A-Za-z0-9._-]`
/// replaced by `_`.
fn page_file_name(account: &str, uid: u32) -> String {
    let account: String = account
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{account}-{uid}.html")
}
