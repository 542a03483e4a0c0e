//! Per-element rewrite policies
//!
//! Every element of a fetched page is classified into exactly one
//! [`NodePolicy`]. A policy only reads and writes the element's own
//! attributes, so the outcome never depends on sibling or ancestor state.

use crate::rewrite::links::LinkRewriter;
use lol_html::html_content::Element;
use std::error::Error;

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Action written into neutralized forms
pub const NOOP_ACTION: &str = "javascript:void(0);";

/// What to do with one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePolicy {
    /// `<script>`: dropped with its content
    Remove,
    /// `<form>`: kept, disabled, action replaced with a no-op
    Neutralize,
    /// `<button>`, `<input>`: an existing `formaction` replaced with a no-op
    FormControl,
    /// `<a href>`: proxied link that navigates the top-level window
    Anchor,
    /// `<iframe src>`: proxied as frameable content
    Frame,
    /// `<link rel="stylesheet" href>`: proxied through the stylesheet route
    Stylesheet,
    /// `<style>`: contents go through the style rewriter
    StyleBlock,
    /// `<img src>`: proxied through the image route, data URIs truncated
    Image,
    /// Everything else, `style=` attributes included
    PassThrough,
}

impl NodePolicy {
    /// Classify by lowercase tag name and, for `<link>`, the `rel` attribute
    pub fn classify(tag: &str, rel: Option<&str>) -> Self {
        match tag {
            "script" => NodePolicy::Remove,
            "form" => NodePolicy::Neutralize,
            "button" | "input" => NodePolicy::FormControl,
            "a" => NodePolicy::Anchor,
            "iframe" => NodePolicy::Frame,
            "link" if rel.map(is_stylesheet).unwrap_or(false) => NodePolicy::Stylesheet,
            "style" => NodePolicy::StyleBlock,
            "img" => NodePolicy::Image,
            _ => NodePolicy::PassThrough,
        }
    }

    pub fn of(el: &Element<'_, '_>) -> Self {
        let tag = el.tag_name();
        let rel = if tag == "link" { el.get_attribute("rel") } else { None };
        Self::classify(&tag, rel.as_deref())
    }

    /// Apply the policy to `el`
    pub fn apply(self, el: &mut Element<'_, '_>, links: &LinkRewriter<'_>) -> HandlerResult {
        match self {
            NodePolicy::Remove => el.remove(),
            NodePolicy::Neutralize => {
                el.set_attribute("disabled", "")?;
                el.set_attribute("action", NOOP_ACTION)?;
            }
            NodePolicy::FormControl => {
                if el.has_attribute("formaction") {
                    el.set_attribute("formaction", NOOP_ACTION)?;
                }
            }
            NodePolicy::Anchor => {
                if rewrite_attribute(el, "href", |r| links.anchor(r))? {
                    el.set_attribute("target", "_top")?;
                }
            }
            NodePolicy::Frame => {
                rewrite_attribute(el, "src", |r| links.frame(r))?;
            }
            NodePolicy::Stylesheet => {
                rewrite_attribute(el, "href", |r| links.stylesheet(r))?;
            }
            NodePolicy::Image => {
                rewrite_attribute(el, "src", |r| links.image_source(r))?;
            }
            // Text content is rewritten by the document's text handler
            NodePolicy::StyleBlock | NodePolicy::PassThrough => {}
        }
        Ok(())
    }
}

fn is_stylesheet(rel: &str) -> bool {
    rel.split_ascii_whitespace()
        .any(|token| token.eq_ignore_ascii_case("stylesheet"))
}

/// Replace attribute `name` with `rewrite(value)`. Returns whether the value
/// was replaced; a missing or unparseable value stays as it was.
fn rewrite_attribute<F>(el: &mut Element<'_, '_>, name: &str, rewrite: F) -> Result<bool, Box<dyn Error + Send + Sync>>
where
    F: FnOnce(&str) -> Option<String>,
{
    let Some(raw) = el.get_attribute(name) else {
        return Ok(false);
    };

    let value = html_escape::decode_html_entities(&raw);
    match rewrite(value.as_ref()) {
        Some(rewritten) => {
            el.set_attribute(name, &rewritten)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_handled_tags() {
        assert_eq!(NodePolicy::classify("script", None), NodePolicy::Remove);
        assert_eq!(NodePolicy::classify("form", None), NodePolicy::Neutralize);
        assert_eq!(NodePolicy::classify("button", None), NodePolicy::FormControl);
        assert_eq!(NodePolicy::classify("input", None), NodePolicy::FormControl);
        assert_eq!(NodePolicy::classify("a", None), NodePolicy::Anchor);
        assert_eq!(NodePolicy::classify("iframe", None), NodePolicy::Frame);
        assert_eq!(NodePolicy::classify("style", None), NodePolicy::StyleBlock);
        assert_eq!(NodePolicy::classify("img", None), NodePolicy::Image);
    }

    #[test]
    fn test_classify_link_by_rel() {
        assert_eq!(
            NodePolicy::classify("link", Some("stylesheet")),
            NodePolicy::Stylesheet
        );
        assert_eq!(
            NodePolicy::classify("link", Some("alternate StyleSheet")),
            NodePolicy::Stylesheet
        );
        assert_eq!(NodePolicy::classify("link", Some("icon")), NodePolicy::PassThrough);
        assert_eq!(NodePolicy::classify("link", None), NodePolicy::PassThrough);
    }

    #[test]
    fn test_classify_everything_else_passes_through() {
        for tag in ["div", "p", "span", "noscript", "video", "body"] {
            assert_eq!(NodePolicy::classify(tag, None), NodePolicy::PassThrough);
        }
    }
}
