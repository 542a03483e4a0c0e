//! Rewriting of `url(...)` references in CSS text

use crate::resolve::is_data_uri;
use crate::rewrite::links::LinkRewriter;
use crate::rewrite::RewriteContext;
use crate::signer::Signer;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

/// `url("...")`, `url('...')` and `url(...)`, case-insensitive
static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^"'()\s]+))\s*\)"#)
        .expect("css url pattern is valid")
});

/// Point every `url()` reference in `css` at the image route.
///
/// References are resolved against the context base. Empty, `data:` and
/// fragment-only references (`url(#clip)`) are left alone, as is anything
/// that does not parse. Rewritten references are always double-quoted; the
/// URL serializer percent-encodes `"`, so the quoting cannot be broken out of.
pub fn rewrite_css<'t>(css: &'t str, ctx: &RewriteContext, signer: &Signer) -> Cow<'t, str> {
    let links = LinkRewriter::new(ctx, signer);

    CSS_URL.replace_all(css, |caps: &Captures| {
        let reference = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or("");

        match rewrite_reference(reference, &links) {
            Some(rewritten) => format!("url(\"{rewritten}\")"),
            None => caps[0].to_string(),
        }
    })
}

fn rewrite_reference(reference: &str, links: &LinkRewriter<'_>) -> Option<String> {
    let trimmed = reference.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || is_data_uri(trimmed) {
        return None;
    }
    links.image(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::StaticSecret;
    use std::sync::Arc;
    use url::Url;

    fn signer() -> Signer {
        Signer::new(Arc::new(StaticSecret::new("my_secret")))
    }

    fn ctx() -> RewriteContext {
        RewriteContext::css(Url::parse("https://example.com").unwrap())
    }

    #[test]
    fn test_quoted_url_is_proxied() {
        let css = r#"#mydiv {background: lightblue url("img_tree.gif") no-repeat fixed center}"#;
        let rewritten = rewrite_css(css, &ctx(), &signer());
        assert_eq!(
            rewritten,
            r#"#mydiv {background: lightblue url("/image/,sUKGG_QlTynjPRkhces2ykv26GkZbya3NOhrjgMZCWXY=/https://example.com/img_tree.gif") no-repeat fixed center}"#
        );
    }

    #[test]
    fn test_single_quoted_and_unquoted_forms() {
        let single = rewrite_css("a{background:url('img_tree.gif')}", &ctx(), &signer());
        let bare = rewrite_css("a{background:url( img_tree.gif )}", &ctx(), &signer());
        let upper = rewrite_css("a{background:URL(img_tree.gif)}", &ctx(), &signer());

        let expected = r#"a{background:url("/image/,sUKGG_QlTynjPRkhces2ykv26GkZbya3NOhrjgMZCWXY=/https://example.com/img_tree.gif")}"#;
        assert_eq!(single, expected);
        assert_eq!(bare, expected);
        assert_eq!(upper, expected);
    }

    #[test]
    fn test_multiple_references() {
        let css = "a{background:url(a.png)} b{background:url(https://cdn.example.org/b.png)}";
        let rewritten = rewrite_css(css, &ctx(), &signer());
        assert!(rewritten.contains("/https://example.com/a.png\")"));
        assert!(rewritten.contains("/https://cdn.example.org/b.png\")"));
        assert_eq!(rewritten.matches("/image/,s").count(), 2);
    }

    #[test]
    fn test_skipped_references_are_untouched() {
        let css = r#"a{mask:url(#clip)} b{background:url("data:image/png;base64,AAAA")} c{background:url("")}"#;
        let rewritten = rewrite_css(css, &ctx(), &signer());
        assert_eq!(rewritten, css);
    }

    #[test]
    fn test_css_without_urls_is_borrowed() {
        let css = ".body {margin:0}";
        assert!(matches!(rewrite_css(css, &ctx(), &signer()), Cow::Borrowed(_)));
    }

    #[test]
    fn test_stylesheet_relative_references_use_its_own_base() {
        let ctx = RewriteContext::css(Url::parse("https://example.com/static/css/site.css").unwrap());
        let rewritten = rewrite_css("a{background:url(../img/bg.png)}", &ctx, &signer());
        assert!(rewritten.contains("/https://example.com/static/img/bg.png\")"));
    }
}
