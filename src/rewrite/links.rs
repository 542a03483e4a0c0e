//! Builders for the signed references written back into rewritten pages

use crate::resolve::{is_data_uri, resolve, target_form};
use crate::rewrite::RewriteContext;
use crate::signer::Signer;
use tracing::debug;
use url::{form_urlencoded, Url};

/// `/proxy?key=<token>&u=<url>`
pub fn page_link(signer: &Signer, target: impl AsRef<str>) -> String {
    let target = target.as_ref();
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("key", &signer.sign_link(target))
        .append_pair("u", target)
        .finish();
    format!("/proxy?{query}")
}

/// `/proxy?iframe=true&key=<token>&u=<url>`
pub fn frame_link(signer: &Signer, target: impl AsRef<str>) -> String {
    let target = target.as_ref();
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("iframe", "true")
        .append_pair("key", &signer.sign_link(target))
        .append_pair("u", target)
        .finish();
    format!("/proxy?{query}")
}

/// `/proxy?css=<url>&key=<token>`
pub fn stylesheet_link(signer: &Signer, target: impl AsRef<str>) -> String {
    let target = without_fragment(target.as_ref());
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("css", target)
        .append_pair("key", &signer.sign_link(target))
        .finish();
    format!("/proxy?{query}")
}

/// `/image/<token>/<url>`, with the URL left unescaped in the path
pub fn image_link(signer: &Signer, target: impl AsRef<str>) -> String {
    let target = without_fragment(target.as_ref());
    format!("/image/{}/{}", signer.sign_image(target), target)
}

// Serialized URLs only carry a literal `#` as the fragment delimiter
fn without_fragment(target: &str) -> &str {
    target.split_once('#').map_or(target, |(before, _)| before)
}

/// Cut a `data:` URI down to its media-type header, dropping the payload.
///
/// `data:image/png;base64, iVBOR...` becomes `data:image/png;base64`.
pub fn truncate_data_uri(reference: &str) -> &str {
    let reference = reference.trim();
    match reference.split_once(',') {
        Some((header, _)) => header.trim_end(),
        None => reference,
    }
}

/// Resolves references found in one page and turns them into signed links
#[derive(Debug, Clone, Copy)]
pub struct LinkRewriter<'a> {
    ctx: &'a RewriteContext,
    signer: &'a Signer,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(ctx: &'a RewriteContext, signer: &'a Signer) -> Self {
        Self { ctx, signer }
    }

    /// Resolve a reference, or `None` when it cannot be parsed as a URL
    pub fn resolve(&self, reference: &str) -> Option<Url> {
        match resolve(&self.ctx.base, reference) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("Leaving unparseable reference {:?} untouched: {}", reference, e);
                None
            }
        }
    }

    /// Resolve a reference into the target string its link is signed over
    fn target(&self, reference: &str) -> Option<String> {
        self.resolve(reference).map(|url| target_form(reference, &url))
    }

    pub fn anchor(&self, reference: &str) -> Option<String> {
        self.target(reference).map(|target| page_link(self.signer, target))
    }

    pub fn frame(&self, reference: &str) -> Option<String> {
        self.target(reference).map(|target| frame_link(self.signer, target))
    }

    pub fn stylesheet(&self, reference: &str) -> Option<String> {
        self.target(reference).map(|target| stylesheet_link(self.signer, target))
    }

    pub fn image(&self, reference: &str) -> Option<String> {
        self.target(reference).map(|target| image_link(self.signer, target))
    }

    /// Rewrite an `<img src>`: data URIs are truncated, anything else proxied
    pub fn image_source(&self, reference: &str) -> Option<String> {
        if is_data_uri(reference) {
            Some(truncate_data_uri(reference).to_string())
        } else {
            self.image(reference)
        }
    }
}
