//! Keyed URL signatures
//!
//! Both token families are the same HMAC-SHA256 over the absolute target URL,
//! keyed with the current secret. They differ only in how the tag is written:
//!
//! - [`TokenEncoding::Query`] (link token): URL-safe base64 with padding. It
//!   travels in the `key=` query parameter and is percent-escaped by the query
//!   serializer when the link is built.
//! - [`TokenEncoding::Path`] (image token): `,s` followed by the same base64
//!   text. Every character is legal in a path segment, so `/image/<token>/<url>`
//!   needs no escaping and path-keyed caches can key on it.
//!
//! Signing is a pure function of `(url, secret)`. Verification decodes the
//! token and checks it with `ring::hmac::verify`, which compares in constant
//! time.

use crate::secret::SecretProvider;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use ring::hmac;
use std::fmt;
use std::sync::Arc;

/// Prefix of a path-encoded (image) token
pub const PATH_TOKEN_PREFIX: &str = ",s";

/// Wire form of a signature token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEncoding {
    /// Link token, carried in a query string
    Query,
    /// Image token, carried as a path segment
    Path,
}

fn key(secret: &str) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes())
}

/// Sign `url` under `secret`
pub fn sign(url: &str, secret: &str, encoding: TokenEncoding) -> String {
    let tag = hmac::sign(&key(secret), url.as_bytes());
    let encoded = URL_SAFE.encode(tag.as_ref());

    match encoding {
        TokenEncoding::Query => encoded,
        TokenEncoding::Path => format!("{PATH_TOKEN_PREFIX}{encoded}"),
    }
}

/// Check that `token` is the signature of `url` under `secret`
pub fn verify(url: &str, token: &str, secret: &str, encoding: TokenEncoding) -> bool {
    let encoded = match encoding {
        TokenEncoding::Query => token,
        TokenEncoding::Path => match token.strip_prefix(PATH_TOKEN_PREFIX) {
            Some(rest) => rest,
            None => return false,
        },
    };

    // The decoder only accepts canonical padding and zeroed trailing bits, so
    // exactly one token string maps to each tag.
    let Ok(tag) = URL_SAFE.decode(encoded) else {
        return false;
    };

    hmac::verify(&key(secret), url.as_bytes(), &tag).is_ok()
}

/// Signs and verifies with whatever secret the provider currently holds
#[derive(Clone)]
pub struct Signer {
    secrets: Arc<dyn SecretProvider>,
}

impl Signer {
    pub fn new(secrets: Arc<dyn SecretProvider>) -> Self {
        Self { secrets }
    }

    pub fn sign(&self, url: &str, encoding: TokenEncoding) -> String {
        sign(url, &self.secrets.current(), encoding)
    }

    pub fn verify(&self, url: &str, token: &str, encoding: TokenEncoding) -> bool {
        let secret = self.secrets.current();
        verify(url, token, &secret, encoding)
    }

    /// Token for the `key=` parameter of a `/proxy` link
    pub fn sign_link(&self, url: &str) -> String {
        self.sign(url, TokenEncoding::Query)
    }

    /// Token for the first path segment of an `/image` reference
    pub fn sign_image(&self, url: &str) -> String {
        self.sign(url, TokenEncoding::Path)
    }

    pub fn verify_link(&self, url: &str, token: &str) -> bool {
        self.verify(url, token, TokenEncoding::Query)
    }

    pub fn verify_image(&self, url: &str, token: &str) -> bool {
        self.verify(url, token, TokenEncoding::Path)
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}
