//! Serialization of handler results for the response layer

use crate::handler::{InterstitialPage, Rendered};
use crate::resolve::parse_target;
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Serialize;

/// `{status, template, data}` as JSON, for clients that render templates themselves
pub fn to_json<T: Serialize>(rendered: &Rendered<T>) -> serde_json::Result<String> {
    serde_json::to_string(rendered)
}

/// The "you are leaving" confirmation page.
///
/// The target is only linked when it is an http(s) URL; anything else is
/// shown as text so the page can never carry a `javascript:` link.
pub fn interstitial_html(page: &Rendered<InterstitialPage>) -> String {
    let data = &page.data;
    let name = encode_text(&data.brand.name);
    let tagline = encode_text(&data.brand.tagline);
    let shown = encode_text(&data.url);

    let destination = match parse_target(&data.url) {
        Ok(url) => format!(
            r#"<a href="{}" rel="noopener noreferrer">{}</a>"#,
            encode_double_quoted_attribute(url.as_str()),
            shown
        ),
        Err(_) => format!("<code>{shown}</code>"),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Leaving {name}</title>
</head>
<body>
<header><h1>{name}</h1><p>{tagline}</p></header>
<main>
<p>You are leaving {name}. Continue to:</p>
<p>{destination}</p>
</main>
</body>
</html>
"#
    )
}
