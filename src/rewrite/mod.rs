//! Rewriting of fetched page content
//!
//! A rewrite pass runs over one fetched body with a [`RewriteContext`]: the
//! URL the body was fetched from (to resolve relative references) and the kind
//! of content it is. HTML goes through [`document::rewrite_html`], stylesheets
//! through [`style::rewrite_css`].

pub mod document;
pub mod links;
pub mod policy;
pub mod style;

pub use document::rewrite_html;
pub use links::LinkRewriter;
pub use policy::NodePolicy;
pub use style::rewrite_css;

use crate::error::ProxyError;
use crate::signer::Signer;
use url::Url;

/// The kind of content a rewrite pass is working on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    Image,
}

impl ContentKind {
    pub fn media_type(self) -> &'static str {
        match self {
            ContentKind::Html => "text/html",
            ContentKind::Css => "text/css",
            ContentKind::Image => "image/*",
        }
    }
}

/// Base URL and content kind shared by every node of one rewrite pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    pub base: Url,
    pub kind: ContentKind,
}

impl RewriteContext {
    pub fn new(base: Url, kind: ContentKind) -> Self {
        Self { base, kind }
    }

    pub fn html(base: Url) -> Self {
        Self::new(base, ContentKind::Html)
    }

    pub fn css(base: Url) -> Self {
        Self::new(base, ContentKind::Css)
    }
}

/// Rewrite a textual body according to the context's content kind.
///
/// Images carry no references and are returned as they are.
pub fn rewrite_body(body: &str, ctx: &RewriteContext, signer: &Signer) -> Result<String, ProxyError> {
    match ctx.kind {
        ContentKind::Html => rewrite_html(body, ctx, signer),
        ContentKind::Css => Ok(rewrite_css(body, ctx, signer).into_owned()),
        ContentKind::Image => Ok(body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::StaticSecret;
    use std::sync::Arc;

    fn signer() -> Signer {
        Signer::new(Arc::new(StaticSecret::new("my_secret")))
    }

    #[test]
    fn test_rewrite_body_dispatches_on_kind() {
        let base = Url::parse("https://example.com").unwrap();
        let css = "body { background: url(bg.png) }";

        let as_css = rewrite_body(css, &RewriteContext::css(base.clone()), &signer()).unwrap();
        assert!(as_css.contains("/image/,s"));
        assert!(as_css.contains("https://example.com/bg.png"));

        let html = "<p>plain</p>";
        let as_html = rewrite_body(html, &RewriteContext::html(base.clone()), &signer()).unwrap();
        assert_eq!(as_html, html);

        let as_image = rewrite_body(css, &RewriteContext::new(base, ContentKind::Image), &signer()).unwrap();
        assert_eq!(as_image, css);
    }

    #[test]
    fn test_media_types() {
        assert_eq!(ContentKind::Html.media_type(), "text/html");
        assert_eq!(ContentKind::Css.media_type(), "text/css");
    }
}
