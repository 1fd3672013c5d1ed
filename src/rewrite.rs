//! Standalone rendering of a message's HTML body
//!
//! Images become data URIs (embedded parts by content-id, remote ones
//! by download) and links are replaced by the target their redirect
//! chain ends at. The document is parsed once: targets are collected
//! by node id, the network requests run, and the new values are
//! written into the same tree before it is serialized.

use crate::fetch::Fetcher;
use crate::html::{set_attr, to_html};
use crate::message::DecodedMessage;
use crate::sampling::pick_link;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ego_tree::NodeId;
use percent_encoding::percent_decode_str;
use rand::Rng;
use scraper::node::Text;
use scraper::{ElementRef, Html, Node};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Inline style given to `<body>` so every page renders alike.
pub const BODY_STYLE: &str =
    "max-width: 800px; margin: 0 auto; padding: 16px; font-family: Arial, Helvetica, sans-serif;";

/// Which anchors get their redirects resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkPolicy {
    /// Every qualifying anchor.
    #[default]
    All,
    /// One anchor drawn uniformly from the first ten qualifying ones.
    SingleRandom,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteOptions {
    /// When false no link requests are made for this message.
    pub resolve_links: bool,
    pub link_policy: LinkPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteStats {
    pub images_inlined: usize,
    pub images_failed: usize,
    pub links_resolved: usize,
    pub links_failed: usize,
}

#[derive(Debug, Clone)]
pub struct Rewritten {
    pub html: String,
    pub stats: RewriteStats,
}

/// Attribute targets found in the parsed document.
#[derive(Debug, Default)]
struct Plan {
    origin: Option<Url>,
    images: Vec<(NodeId, String)>,
    links: Vec<(NodeId, String)>,
    charset_metas: Vec<(NodeId, &'static str, &'static str)>,
    body: Option<NodeId>,
}

impl Plan {
    fn build(doc: &Html, message: &DecodedMessage) -> Self {
        let mut plan = Self::default();
        let mut base_href = None;

        for element in doc.tree.root().descendants().filter_map(ElementRef::wrap) {
            let id = element.id();
            let el = element.value();
            match el.name() {
                "img" => {
                    if let Some(src) = el.attr("src") {
                        plan.images.push((id, src.to_string()));
                    }
                }
                "a" => {
                    if let Some(href) = el.attr("href") {
                        plan.links.push((id, href.to_string()));
                    }
                }
                "base" if base_href.is_none() => {
                    base_href = el.attr("href").and_then(|h| Url::parse(h.trim()).ok());
                }
                "meta" => {
                    if el.attr("charset").is_some() {
                        plan.charset_metas.push((id, "charset", "utf-8"));
                    } else if el
                        .attr("http-equiv")
                        .is_some_and(|v| v.eq_ignore_ascii_case("content-type"))
                    {
                        plan.charset_metas
                            .push((id, "content", "text/html; charset=utf-8"));
                    }
                }
                "body" if plan.body.is_none() => plan.body = Some(id),
                _ => {}
            }
        }

        plan.origin = base_href.or_else(|| {
            message
                .sender_domain()
                .and_then(|domain| Url::parse(&format!("https://{domain}/")).ok())
        });
        plan
    }
}

/// Resolve `reference` against `origin`, keeping only web URLs.
fn resolve_web_url(origin: Option<&Url>, reference: &str) -> Option<Url> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }
    let url = match (Url::parse(reference), origin) {
        (Ok(url), _) => url,
        (Err(url::ParseError::RelativeUrlWithoutBase), Some(origin)) => {
            origin.join(reference).ok()?
        }
        (Err(url::ParseError::RelativeUrlWithoutBase), None) if reference.starts_with("//") => {
            Url::parse(&format!("https:{reference}")).ok()?
        }
        _ => return None,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// The content-id named by a `cid:` URL, percent-decoded (RFC 2392).
fn cid_reference(src: &str) -> Option<String> {
    let scheme = src.get(..4)?;
    if !scheme.eq_ignore_ascii_case("cid:") {
        return None;
    }
    Some(percent_decode_str(&src[4..]).decode_utf8_lossy().into_owned())
}

fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Wrap a plain-text body so it can be rendered like an HTML one.
#[must_use]
pub fn text_page(text: &str) -> String {
    let mut doc = Html::parse_document(
        "<html><head><meta charset=\"utf-8\"></head><body>\
         <pre style=\"white-space: pre-wrap\"></pre></body></html>",
    );
    let pre = doc
        .tree
        .root()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "pre")
        .map(|el| el.id());
    if let Some(mut pre) = pre.and_then(|id| doc.tree.get_mut(id)) {
        pre.append(Node::Text(Text { text: text.into() }));
    }
    to_html(&doc)
}

/// Render `message` standalone: its HTML body if it has one,
/// otherwise its text body.
pub async fn rewrite_message<F, R>(
    message: &DecodedMessage,
    fetcher: &F,
    options: &RewriteOptions,
    rng: &mut R,
) -> Rewritten
where
    F: Fetcher,
    R: Rng + ?Sized,
{
    match message.html_body() {
        Some(html) => rewrite_html(html, message, fetcher, options, rng).await,
        None => {
            let page = text_page(message.text_body().unwrap_or_default());
            rewrite_html(&page, message, fetcher, options, rng).await
        }
    }
}

/// Rewrite image sources and link targets of `html`.
///
/// Failures are per element: an image that cannot be fetched or a
/// link that cannot be resolved keeps its original attribute.
pub async fn rewrite_html<F, R>(
    html: &str,
    message: &DecodedMessage,
    fetcher: &F,
    options: &RewriteOptions,
    rng: &mut R,
) -> Rewritten
where
    F: Fetcher,
    R: Rng + ?Sized,
{
    let mut doc = Html::parse_document(html);
    let plan = Plan::build(&doc, message);
    let origin = plan.origin.as_ref();
    let mut stats = RewriteStats::default();

    for (id, src) in &plan.images {
        let trimmed = src.trim();
        if let Some(cid) = cid_reference(trimmed) {
            match message.part_by_content_id(&cid) {
                Some(part) => {
                    set_attr(&mut doc, *id, "src", &data_uri(&part.content_type, &part.raw));
                    stats.images_inlined += 1;
                }
                None => debug!(cid = %cid, "No MIME part for content-id, leaving image as is"),
            }
            continue;
        }

        let Some(url) = resolve_web_url(origin, trimmed) else {
            continue;
        };
        match fetcher.fetch_image(&url, origin).await {
            Ok(image) => {
                set_attr(&mut doc, *id, "src", &data_uri(&image.mime_type(&url), &image.bytes));
                stats.images_inlined += 1;
            }
            Err(e) => {
                warn!(%url, error = %e, "Image fetch failed, keeping remote source");
                stats.images_failed += 1;
            }
        }
    }

    if options.resolve_links {
        let qualifying: Vec<(NodeId, Url)> = plan
            .links
            .iter()
            .filter_map(|(id, href)| resolve_web_url(origin, href).map(|u| (*id, u)))
            .collect();

        let chosen: Vec<&(NodeId, Url)> = match options.link_policy {
            LinkPolicy::All => qualifying.iter().collect(),
            LinkPolicy::SingleRandom => pick_link(qualifying.len(), rng)
                .map(|i| &qualifying[i])
                .into_iter()
                .collect(),
        };

        for (id, url) in chosen {
            match fetcher.resolve_link(url, origin).await {
                Ok(final_url) => {
                    set_attr(&mut doc, *id, "href", final_url.as_str());
                    stats.links_resolved += 1;
                }
                Err(e) => {
                    warn!(%url, error = %e, "Link resolution failed, keeping original target");
                    stats.links_failed += 1;
                }
            }
        }
    }

    for (id, attr, value) in &plan.charset_metas {
        set_attr(&mut doc, *id, attr, value);
    }
    if let Some(body) = plan.body {
        set_attr(&mut doc, body, "style", BODY_STYLE);
    }

    Rewritten {
        html: to_html(&doc),
        stats,
    }
}
