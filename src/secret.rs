//! Signing secret providers
//! The signer asks a provider for the current secret on every operation

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::RwLock;
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;

/// Source of the process-wide signing secret
pub trait SecretProvider: Send + Sync {
    /// The secret to sign and verify with right now
    fn current(&self) -> Arc<str>;
}

/// A secret fixed at construction
#[derive(Debug, Clone)]
pub struct StaticSecret(Arc<str>);

impl StaticSecret {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self(secret.into())
    }
}

impl SecretProvider for StaticSecret {
    fn current(&self) -> Arc<str> {
        self.0.clone()
    }
}

/// A secret that can be swapped at runtime.
///
/// Readers clone the `Arc` under the read lock, so a verification always
/// sees one whole secret, old or new.
#[derive(Debug)]
pub struct RotatingSecret {
    inner: RwLock<Arc<str>>,
}

impl RotatingSecret {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            inner: RwLock::new(secret.into()),
        }
    }

    /// Replace the secret. Every token issued under the old one stops verifying.
    pub fn rotate(&self, secret: impl Into<Arc<str>>) {
        *self.inner.write() = secret.into();
    }
}

impl SecretProvider for RotatingSecret {
    fn current(&self) -> Arc<str> {
        self.inner.read().clone()
    }
}

/// Generate a random 256-bit secret, URL-safe base64 encoded
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Read a secret from a file, ignoring surrounding whitespace
pub fn read_secret_file(path: &Path) -> Result<String> {
    let secret = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read secret file {}", path.display()))?;
    let secret = secret.trim();
    if secret.is_empty() {
        bail!("Secret file {} is empty", path.display());
    }
    Ok(secret.to_string())
}
