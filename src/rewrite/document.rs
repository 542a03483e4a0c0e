//! HTML document rewriting
//! Streams the fetched page through lol_html, applying one [`NodePolicy`] per element

use crate::error::ProxyError;
use crate::rewrite::links::LinkRewriter;
use crate::rewrite::policy::NodePolicy;
use crate::rewrite::style::rewrite_css;
use crate::rewrite::RewriteContext;
use crate::signer::Signer;
use lol_html::html_content::ContentType;
use lol_html::{element, text, HtmlRewriter, Settings};

/// Rewrite every outbound reference in `html` and drop scripts.
///
/// Markup problems are tolerated the way browsers tolerate them; only a hard
/// rewriter failure is reported, as [`ProxyError::Parse`].
pub fn rewrite_html(html: &str, ctx: &RewriteContext, signer: &Signer) -> Result<String, ProxyError> {
    let links = LinkRewriter::new(ctx, signer);
    let mut output = Vec::with_capacity(html.len());

    // <style> text can arrive in several chunks; hold them back until the
    // last one so url() references are never split.
    let mut style_text = String::new();

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("*", |el| NodePolicy::of(el).apply(el, &links)),
                text!("style", |chunk| {
                    style_text.push_str(chunk.as_str());
                    if chunk.last_in_text_node() {
                        let rewritten = rewrite_css(&style_text, ctx, signer);
                        chunk.replace(&rewritten, ContentType::Html);
                        style_text.clear();
                    } else {
                        chunk.remove();
                    }
                    Ok(())
                }),
            ],
            strict: false,
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter.write(html.as_bytes()).map_err(parse_error)?;
    rewriter.end().map_err(parse_error)?;

    String::from_utf8(output).map_err(|e| ProxyError::Parse {
        kind: "html",
        reason: e.to_string(),
    })
}

fn parse_error(e: lol_html::errors::RewritingError) -> ProxyError {
    ProxyError::Parse {
        kind: "html",
        reason: e.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::rewrite::policy::NOOP_ACTION;
    use crate::secret::StaticSecret;
    use std::sync::Arc;
    use url::Url;

    pub(crate) const PAGE: &str = r#"<html>
        <head>
            <link rel="stylesheet" type="text/css" href="mystyle.css">
            <style>
                .body {margin:0}
                #mydiv {background: lightblue url("img_tree.gif") no-repeat fixed center}
            </style>
            <script>alert("this is dangerous!")</script>
        </head>
        <body>
            <form id="form"></form>
            <a href="https://www.example.com">A link</a>
            <a href="/relative/link">A relative link</a>
            <iframe src="https://example.com/iframe/stuff"></iframe>
            <img src="nice.jpg" alt="nice image">
            <img src="data:image/png;base64, iVBORw0KGgoAAAANSUhEUgAAAggg==" alt="Red dot" />
            <div style="background-image: url("paper.gif");">Cool div you got there. Would be a shame if we proxied the url.</div>
        </body>
    </html>"#;

    /// Attribute values of every element matching `selector`, entities decoded
    pub(crate) fn attributes(html: &str, selector: &str, name: &str) -> Vec<Option<String>> {
        let mut found = Vec::new();
        lol_html::rewrite_str(
            html,
            lol_html::RewriteStrSettings {
                element_content_handlers: vec![element!(selector, |el| {
                    found.push(
                        el.get_attribute(name)
                            .map(|v| html_escape::decode_html_entities(&v).into_owned()),
                    );
                    Ok(())
                })],
                ..lol_html::RewriteStrSettings::default()
            },
        )
        .unwrap();
        found
    }

    fn signer() -> Signer {
        Signer::new(Arc::new(StaticSecret::new("my_secret")))
    }

    fn rewrite(html: &str) -> String {
        let ctx = RewriteContext::html(Url::parse("https://example.com").unwrap());
        rewrite_html(html, &ctx, &signer()).unwrap()
    }

    #[test]
    fn test_scripts_are_removed() {
        let out = rewrite(PAGE);
        assert!(!out.contains("<script"));
        assert!(!out.contains("this is dangerous"));
    }

    #[test]
    fn test_script_with_src_is_removed() {
        let out = rewrite(r#"<p>a</p><script src="https://evil.example/x.js"></script><p>b</p>"#);
        assert_eq!(out, "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_form_is_neutralized() {
        let out = rewrite(PAGE);
        assert_eq!(attributes(&out, "form#form", "disabled"), vec![Some(String::new())]);
        assert_eq!(
            attributes(&out, "form#form", "action"),
            vec![Some(NOOP_ACTION.to_string())]
        );
    }

    #[test]
    fn test_form_action_is_replaced() {
        let out = rewrite(r#"<form action="https://example.com/login" method="post"></form>"#);
        assert_eq!(attributes(&out, "form", "action"), vec![Some(NOOP_ACTION.to_string())]);
        assert_eq!(attributes(&out, "form", "method"), vec![Some("post".to_string())]);
    }

    #[test]
    fn test_formaction_is_replaced() {
        let out = rewrite(
            r#"<form><button formaction="https://example.com/delete">Go</button><input type="submit" formaction="/save"><input name="q"></form>"#,
        );
        assert_eq!(attributes(&out, "button", "formaction"), vec![Some(NOOP_ACTION.to_string())]);
        assert_eq!(
            attributes(&out, "input", "formaction"),
            vec![Some(NOOP_ACTION.to_string()), None]
        );
    }

    #[test]
    fn test_unparseable_anchor_is_left_alone() {
        let html = r#"<a href="http://[::1">broken</a>"#;
        let out = rewrite(html);
        assert_eq!(out, html);
        assert_eq!(attributes(&out, "a", "target"), vec![None]);
    }

    #[test]
    fn test_anchors_are_proxied_at_top_level() {
        let out = rewrite(PAGE);

        assert_eq!(
            attributes(&out, "a", "href"),
            vec![
                Some("/proxy?key=_Zbla8JTucVtfb7n-QIGsrKozkTGaGsuKlxppnXb6xM%3D&u=https%3A%2F%2Fwww.example.com".to_string()),
                Some("/proxy?key=j_gIsLDElFG1Qnp3TAYn1KD5dwvJ0gB_KqvUjXvM64g%3D&u=https%3A%2F%2Fexample.com%2Frelative%2Flink".to_string()),
            ]
        );
        assert_eq!(
            attributes(&out, "a", "target"),
            vec![Some("_top".to_string()), Some("_top".to_string())]
        );
    }

    #[test]
    fn test_iframe_is_proxied_as_frame() {
        let out = rewrite(PAGE);
        assert_eq!(
            attributes(&out, "iframe", "src"),
            vec![Some("/proxy?iframe=true&key=QtzD41Rkf5VUsmVPv9kSn4VHfUqf2jMljGktkjYVOVc%3D&u=https%3A%2F%2Fexample.com%2Fiframe%2Fstuff".to_string())]
        );
    }

    #[test]
    fn test_stylesheet_link_is_proxied() {
        let out = rewrite(PAGE);
        assert_eq!(
            attributes(&out, "link", "href"),
            vec![Some("/proxy?css=https%3A%2F%2Fexample.com%2Fmystyle.css&key=3jUnkmdp2GQ0a9mmkFWYaTq6pg9rxGdVlic5t4fvfKc%3D".to_string())]
        );
    }

    #[test]
    fn test_non_stylesheet_link_is_untouched() {
        let html = r#"<link rel="icon" href="/favicon.ico">"#;
        assert_eq!(rewrite(html), html);
    }

    #[test]
    fn test_style_block_is_rewritten() {
        let out = rewrite(PAGE);
        assert!(out.contains(".body {margin:0}"));
        assert!(out.contains(
            r#"url("/image/,sUKGG_QlTynjPRkhces2ykv26GkZbya3NOhrjgMZCWXY=/https://example.com/img_tree.gif")"#
        ));
        assert!(!out.contains(r#"url("img_tree.gif")"#));
    }

    #[test]
    fn test_style_block_keeps_child_combinators() {
        let out = rewrite("<style>ul > li { color: red }</style>");
        assert_eq!(out, "<style>ul > li { color: red }</style>");
    }

    #[test]
    fn test_images_are_proxied_and_alt_preserved() {
        let out = rewrite(PAGE);
        assert_eq!(
            attributes(&out, "img", "src"),
            vec![
                Some("/image/,sypKZuwtHssDFg_bLaExLhx4rYNnbr0KkzPeekQYRlGA=/https://example.com/nice.jpg".to_string()),
                Some("data:image/png;base64".to_string()),
            ]
        );
        assert_eq!(
            attributes(&out, "img", "alt"),
            vec![Some("nice image".to_string()), Some("Red dot".to_string())]
        );
    }

    #[test]
    fn test_inline_style_attribute_is_untouched() {
        let out = rewrite(PAGE);
        assert!(out.contains(r#"<div style="background-image: url("paper.gif");">"#));
    }

    #[test]
    fn test_unparseable_reference_is_left_alone() {
        let out = rewrite(r#"<a href="http://[::1">broken</a><img src="http://[::1">"#);
        assert_eq!(attributes(&out, "a", "href"), vec![Some("http://[::1".to_string())]);
        assert_eq!(attributes(&out, "img", "src"), vec![Some("http://[::1".to_string())]);
    }

    #[test]
    fn test_entities_are_decoded_before_resolution() {
        let out = rewrite(r#"<a href="/search?a=1&amp;b=2">s</a>"#);
        let href = attributes(&out, "a", "href").remove(0).unwrap();
        assert!(href.ends_with("&u=https%3A%2F%2Fexample.com%2Fsearch%3Fa%3D1%26b%3D2"));
    }

    #[test]
    fn test_rewrite_is_independent_of_surrounding_nodes() {
        let alone = rewrite(r#"<img src="nice.jpg">"#);
        let within = rewrite(PAGE);
        assert_eq!(
            attributes(&alone, "img", "src")[0],
            attributes(&within, "img", "src")[0]
        );
    }

    #[test]
    fn test_malformed_markup_is_tolerated() {
        let out = rewrite(r#"<div><a href="x.html">unclosed <img src="a.png"><p></div></span>"#);
        assert!(out.contains("/image/,s"));
        assert!(out.contains("/proxy?key="));
    }
}
