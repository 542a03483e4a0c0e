//! Request handlers for the interstitial, proxy and image endpoints
//!
//! Handlers return render-ready values ([`Rendered`]) or a [`ProxyError`];
//! turning either into bytes on the wire is the server's job.

use crate::error::ProxyError;
use crate::fetch::FetchClient;
use crate::minify::Minifier;
use crate::resolve::parse_target;
use crate::rewrite::{rewrite_body, ContentKind, RewriteContext};
use crate::signer::Signer;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::form_urlencoded;

/// Branding shown around proxied content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Brand {
    pub name: String,
    pub tagline: String,
}

/// Which page template the response layer should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// "You are leaving" confirmation
    ProxyHeader,
    /// Proxied page viewed at top level
    Proxy,
    /// Proxied page loaded into a frame
    ProxyIframe,
    /// Proxied stylesheet
    ProxyCss,
}

/// A successful handler result: `{status, template, data}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered<T> {
    pub status: u16,
    pub template: Template,
    pub data: T,
}

/// Data for the interstitial page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterstitialPage {
    pub brand: Brand,
    pub url: String,
}

/// Rewritten HTML or CSS with the target it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxiedPage {
    pub brand: Brand,
    pub content: String,
    pub url: String,
}

/// An image fetched through the image route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxiedImage {
    pub content_type: String,
    pub body: Bytes,
}

/// Query parameters of a `/proxy` request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyRequest {
    pub u: Option<String>,
    pub key: Option<String>,
    pub css: Option<String>,
    pub iframe: Option<String>,
}

impl ProxyRequest {
    pub fn from_query(query: &str) -> Self {
        let mut request = Self::default();
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match &*name {
                "u" => &mut request.u,
                "key" => &mut request.key,
                "css" => &mut request.css,
                "iframe" => &mut request.iframe,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        request
    }

    /// The URL to fetch: `u`, or the `css` value when it carries the URL itself
    pub fn target(&self) -> Option<&str> {
        non_empty(&self.u).or_else(|| {
            non_empty(&self.css).filter(|css| !is_truthy(css) && !is_falsy(css))
        })
    }

    /// Treat the body as a stylesheet
    pub fn wants_css(&self) -> bool {
        non_empty(&self.css).map(|css| !is_falsy(css)).unwrap_or(false)
    }

    /// Serve the page as frameable content
    pub fn frameable(&self) -> bool {
        non_empty(&self.iframe).map(is_truthy).unwrap_or(false)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "on" | "yes")
}

fn is_falsy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "false" | "0" | "off" | "no")
}

/// Path (and query) of an `/image/<token>/<absolute-url>` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub token: String,
    pub url: String,
}

impl ImageRequest {
    /// Split a request path into token and target. The request's own query
    /// string belongs to the target URL and is re-attached to it.
    pub fn from_path(path: &str, query: Option<&str>) -> Option<Self> {
        let rest = path.strip_prefix("/image/")?;
        let (token, url) = rest.split_once('/')?;
        if token.is_empty() || url.is_empty() {
            return None;
        }

        let url = match query {
            Some(q) => format!("{url}?{q}"),
            None => url.to_string(),
        };

        Some(Self {
            token: token.to_string(),
            url,
        })
    }
}

/// The request handlers, shared by every connection
pub struct Frontend {
    brand: Brand,
    signer: Signer,
    fetcher: Arc<dyn FetchClient>,
    minifier: Arc<dyn Minifier>,
}

impl Frontend {
    pub fn new(
        brand: Brand,
        signer: Signer,
        fetcher: Arc<dyn FetchClient>,
        minifier: Arc<dyn Minifier>,
    ) -> Self {
        Self {
            brand,
            signer,
            fetcher,
            minifier,
        }
    }

    /// Confirmation page shown before leaving for `target`. Nothing is fetched.
    pub fn interstitial(&self, target: &str) -> Rendered<InterstitialPage> {
        Rendered {
            status: 200,
            template: Template::ProxyHeader,
            data: InterstitialPage {
                brand: self.brand.clone(),
                url: target.to_string(),
            },
        }
    }

    /// Verify, fetch, rewrite and minify a proxied page or stylesheet
    pub async fn proxy(&self, request: &ProxyRequest) -> Result<Rendered<ProxiedPage>, ProxyError> {
        let target = request.target().ok_or(ProxyError::MissingParameter("u"))?;
        let key = non_empty(&request.key).ok_or(ProxyError::MissingParameter("key"))?;

        if !self.signer.verify_link(target, key) {
            warn!("Rejected proxy request for {}: signature mismatch", target);
            return Err(ProxyError::InvalidSignature);
        }

        let url = parse_target(target)?;
        let fetched = self.fetcher.fetch(&url).await?;
        if !fetched.is_success() {
            return Err(ProxyError::UpstreamStatus {
                url: url.to_string(),
                status: fetched.status,
            });
        }

        let (kind, template) = if request.wants_css() {
            (ContentKind::Css, Template::ProxyCss)
        } else if request.frameable() {
            (ContentKind::Html, Template::ProxyIframe)
        } else {
            (ContentKind::Html, Template::Proxy)
        };

        let ctx = RewriteContext::new(fetched.url.clone(), kind);
        let rewritten = rewrite_body(&fetched.text(), &ctx, &self.signer)?;
        let content = self.minifier.minify(kind.media_type(), &rewritten)?;

        debug!("Proxied {} as {:?} ({} bytes)", url, template, content.len());

        Ok(Rendered {
            status: 200,
            template,
            data: ProxiedPage {
                brand: self.brand.clone(),
                content,
                url: target.to_string(),
            },
        })
    }

    /// Verify and fetch an image referenced through the image route
    pub async fn image(&self, request: &ImageRequest) -> Result<ProxiedImage, ProxyError> {
        if !self.signer.verify_image(&request.url, &request.token) {
            warn!("Rejected image request for {}: signature mismatch", request.url);
            return Err(ProxyError::InvalidSignature);
        }

        let url = parse_target(&request.url)?;
        let fetched = self.fetcher.fetch(&url).await?;
        if !fetched.is_success() {
            return Err(ProxyError::UpstreamStatus {
                url: url.to_string(),
                status: fetched.status,
            });
        }

        let content_type = fetched.content_type.unwrap_or_default();
        if !content_type.trim_start().to_ascii_lowercase().starts_with("image/") {
            return Err(ProxyError::NotAnImage {
                url: url.to_string(),
                content_type,
            });
        }

        Ok(ProxiedImage {
            content_type,
            body: fetched.body,
        })
    }
}
