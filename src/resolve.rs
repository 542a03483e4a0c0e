//! Resolution of page references into absolute, canonical URLs

use crate::error::ProxyError;
use url::{ParseError, Position, Url};

/// Resolve `reference` against the page it appeared on.
///
/// Absolute references pass through (canonicalized by the parser), relative
/// ones are joined onto `base`. Surrounding whitespace is ignored the way
/// browsers ignore it in attribute values.
pub fn resolve(base: &Url, reference: &str) -> Result<Url, ParseError> {
    base.join(reference.trim())
}

/// The string a resolved reference is signed and emitted as.
///
/// This is the parser's serialization, except that an absolute reference
/// written without a path (`https://www.example.com`) keeps its empty path
/// rather than gaining the root `/`.
pub fn target_form(reference: &str, resolved: &Url) -> String {
    if resolved.path() == "/" && has_empty_path(reference.trim()) {
        format!(
            "{}{}",
            &resolved[..Position::BeforePath],
            &resolved[Position::AfterPath..]
        )
    } else {
        resolved.to_string()
    }
}

/// True when `reference` names an authority and nothing follows it but an
/// optional query or fragment
fn has_empty_path(reference: &str) -> bool {
    let after_authority_marker = match reference.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        _ => match reference.strip_prefix("//") {
            Some(rest) => rest,
            None => return false,
        },
    };

    let delimiter = after_authority_marker
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '?' | '#'));
    !matches!(delimiter, Some('/') | Some('\\'))
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Parse a page-level target such as the `u` parameter of a proxy request.
///
/// Unlike attribute references, a bad target rejects the whole request.
pub fn parse_target(raw: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(raw.trim()).map_err(|e| ProxyError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProxyError::UnsupportedScheme(other.to_string())),
    }
}

/// True for `data:` references, compared case-insensitively
pub fn is_data_uri(reference: &str) -> bool {
    reference
        .trim_start()
        .get(..5)
        .map(|prefix| prefix.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    #[test]
    fn test_relative_link_resolves_against_host() {
        let resolved = resolve(&base(), "/relative/link").unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/relative/link");
    }

    #[test]
    fn test_document_relative_reference() {
        let base = Url::parse("https://example.com/docs/index.html").unwrap();
        assert_eq!(
            resolve(&base, "mystyle.css").unwrap().as_str(),
            "https://example.com/docs/mystyle.css"
        );
        assert_eq!(
            resolve(&base, "../img/a.png").unwrap().as_str(),
            "https://example.com/img/a.png"
        );
    }

    #[test]
    fn test_absolute_reference_passes_through() {
        let resolved = resolve(&base(), "https://www.example.com").unwrap();
        assert_eq!(resolved.as_str(), "https://www.example.com/");

        let resolved = resolve(&base(), "//cdn.example.org/x.js").unwrap();
        assert_eq!(resolved.as_str(), "https://cdn.example.org/x.js");
    }

    #[test]
    fn test_target_form_keeps_empty_path() {
        let target = |reference: &str| target_form(reference, &resolve(&base(), reference).unwrap());

        assert_eq!(target("https://www.example.com"), "https://www.example.com");
        assert_eq!(target(" https://www.example.com "), "https://www.example.com");
        assert_eq!(target("https://www.example.com?q=/a"), "https://www.example.com?q=/a");
        assert_eq!(target("//cdn.example.org"), "https://cdn.example.org");
        assert_eq!(target("https://www.example.com/"), "https://www.example.com/");
        assert_eq!(target("/"), "https://example.com/");
        assert_eq!(target("?page=2"), "https://example.com/?page=2");
        assert_eq!(target("nice.jpg"), "https://example.com/nice.jpg");
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let resolved = resolve(&base(), "  nice.jpg\n").unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/nice.jpg");
    }

    #[test]
    fn test_malformed_reference_is_an_error() {
        assert!(resolve(&base(), "http://[::1").is_err());
        assert!(resolve(&base(), "https://exa mple.com/").is_err());
    }

    #[test]
    fn test_parse_target() {
        assert!(parse_target("https://example.com/page").is_ok());
        assert!(matches!(
            parse_target("not a url"),
            Err(ProxyError::InvalidUrl { .. })
        ));
        assert_eq!(
            parse_target("file:///etc/passwd"),
            Err(ProxyError::UnsupportedScheme("file".to_string()))
        );
    }

    #[test]
    fn test_is_data_uri() {
        assert!(is_data_uri("data:image/png;base64,AAAA"));
        assert!(is_data_uri(" DATA:text/plain,hi"));
        assert!(!is_data_uri("nice.jpg"));
        assert!(!is_data_uri("dat"));
    }
}
