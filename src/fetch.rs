//! Outbound HTTP: remote images and link redirect resolution

use crate::config::HttpConfig;
use crate::error::Result;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, redirect};
use tracing::debug;
use url::Url;

/// Used when neither the bytes, the response nor the URL reveal an
/// image type.
pub const FALLBACK_IMAGE_MIME: &str = "image/jpeg";

/// How a link's final destination is discovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectMethod {
    /// Full GET, as a browser click would do.
    #[default]
    Get,
    /// HEAD only; cheaper but some trackers only redirect on GET.
    Head,
}

/// Bytes of a downloaded image plus the server's `Content-Type`.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedImage {
    /// Best-effort MIME type: magic bytes, then the response header,
    /// then the URL extension, then [`FALLBACK_IMAGE_MIME`].
    #[must_use]
    pub fn mime_type(&self, url: &Url) -> String {
        if let Some(sniffed) = sniff_image_mime(&self.bytes) {
            return sniffed.to_string();
        }
        if let Some(ct) = self
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| ct.starts_with("image/"))
        {
            return ct;
        }
        mime_guess::from_path(url.path())
            .first()
            .filter(|m| m.type_() == mime_guess::mime::IMAGE)
            .map_or_else(|| FALLBACK_IMAGE_MIME.to_string(), |m| m.essence_str().to_string())
    }
}

/// Recognize common image formats from their leading bytes.
#[must_use]
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
        (b"\x00\x00\x01\x00", "image/x-icon"),
    ];
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, mime)| *mime)
}

/// The network side of the content rewriter.
///
/// [`HttpFetcher`] is the real implementation; tests substitute
/// their own.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    /// Download an image.
    async fn fetch_image(&self, url: &Url, referer: Option<&Url>) -> Result<FetchedImage>;

    /// Follow redirects from `url` and return where they end.
    async fn resolve_link(&self, url: &Url, referer: Option<&Url>) -> Result<Url>;
}

/// [`Fetcher`] backed by a reqwest client with browser-like headers.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    redirect_method: RedirectMethod,
}

impl HttpFetcher {
    /// # Errors
    ///
    /// Returns [`crate::Error::Http`] if the client cannot be built.
    pub fn new(config: &HttpConfig, redirect_method: RedirectMethod) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(config.max_redirects))
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(browser_headers())
            .build()?;
        Ok(Self {
            client,
            redirect_method,
        })
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("pl-PL,pl;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

fn with_referer(
    request: reqwest::RequestBuilder,
    referer: Option<&Url>,
) -> reqwest::RequestBuilder {
    match referer {
        Some(r) => request.header(header::REFERER, r.as_str()),
        None => request,
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch_image(&self, url: &Url, referer: Option<&Url>) -> Result<FetchedImage> {
        let request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "image/avif,image/webp,image/apng,image/*,*/*;q=0.8");
        let response = with_referer(request, referer)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        debug!(%url, size = bytes.len(), "Fetched image");

        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }

    async fn resolve_link(&self, url: &Url, referer: Option<&Url>) -> Result<Url> {
        let request = match self.redirect_method {
            RedirectMethod::Get => self.client.get(url.clone()),
            RedirectMethod::Head => self.client.head(url.clone()),
        };
        let response = with_referer(request, referer).send().await?;
        let final_url = response.url().clone();
        debug!(%url, %final_url, status = %response.status(), "Resolved link");
        Ok(final_url)
    }
}
