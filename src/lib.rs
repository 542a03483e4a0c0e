//! Sealproxy - a content-rewriting web proxy
//!
//! Fetches remote pages on a visitor's behalf and serves a sanitized copy:
//! - Scripts removed, forms disabled
//! - Every link, frame, stylesheet and image routed back through the proxy
//! - Proxy URLs carry an HMAC token so only URLs the proxy emitted are served
//! - CSS `url()` references rewritten to the signed image route
//! - Output minified

pub mod error;
pub mod fetch;
pub mod handler;
pub mod minify;
pub mod render;
pub mod resolve;
pub mod rewrite;
pub mod secret;
pub mod server;
pub mod signer;

pub use error::ProxyError;
pub use fetch::{FetchClient, FetchConfig, FetchedResource, HttpFetcher};
pub use handler::{Brand, Frontend, ImageRequest, ProxyRequest, Rendered, Template};
pub use minify::{MarkupMinifier, Minifier};
pub use rewrite::{ContentKind, RewriteContext};
pub use secret::{generate_secret, read_secret_file, RotatingSecret, SecretProvider, StaticSecret};
pub use server::{ProxyServer, ServerConfig};
pub use signer::{Signer, TokenEncoding};
