//! Output normalization of rewritten HTML and CSS

use crate::error::ProxyError;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use minify_html::Cfg;

/// Formats the final payload before it is handed to the response layer
pub trait Minifier: Send + Sync {
    fn minify(&self, media_type: &str, text: &str) -> Result<String, ProxyError>;
}

/// minify-html for documents, lightningcss for stylesheets
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupMinifier;

impl Minifier for MarkupMinifier {
    fn minify(&self, media_type: &str, text: &str) -> Result<String, ProxyError> {
        let minified = match media_type {
            "text/html" => minify_html(text)?,
            "text/css" => minify_css(text)?,
            other => return Err(minify_error(other, "unsupported media type")),
        };

        if minified.trim().is_empty() && !text.trim().is_empty() {
            return Err(minify_error(media_type, "minifier produced no output"));
        }

        Ok(minified)
    }
}

fn minify_html(text: &str) -> Result<String, ProxyError> {
    let cfg = Cfg {
        keep_closing_tags: true,
        keep_html_and_head_opening_tags: true,
        minify_css: true,
        ..Cfg::default()
    };

    let minified = minify_html::minify(text.as_bytes(), &cfg);
    String::from_utf8(minified).map_err(|e| minify_error("text/html", e))
}

fn minify_css(text: &str) -> Result<String, ProxyError> {
    let options = ParserOptions {
        error_recovery: true,
        ..ParserOptions::default()
    };
    let stylesheet = StyleSheet::parse(text, options).map_err(|e| minify_error("text/css", e))?;

    let printed = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| minify_error("text/css", e))?;

    Ok(printed.code)
}

fn minify_error(media_type: &str, reason: impl ToString) -> ProxyError {
    ProxyError::Minify {
        content_type: media_type.to_string(),
        reason: reason.to_string(),
    }
}
