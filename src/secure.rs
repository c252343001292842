//! In-memory holder for secrets that wipes its buffer on destruction.
//!
//! Use this for passwords and API keys so they do not linger in memory
//! after use. The wipe happens deterministically when the value is
//! destroyed or dropped, not at some later reclamation point.

use std::fmt;

use rand::RngCore;
use zeroize::Zeroize;

/// A secret held in a private buffer, wiped on destroy/drop.
///
/// `reveal` and `reveal_bytes` hand out copies; callers should discard
/// those copies as soon as the secret has been used.
pub struct SecureSecret {
    data: Option<Vec<u8>>,
}

impl SecureSecret {
    /// Copies the plaintext into a fresh buffer and wipes the input.
    pub fn new(plaintext: impl Into<String>) -> Self {
        let mut plaintext = plaintext.into();
        let data = plaintext.as_bytes().to_vec();
        plaintext.zeroize();
        Self { data: Some(data) }
    }

    /// An empty secret (never set).
    pub fn empty() -> Self {
        Self { data: None }
    }

    /// Returns a private copy of the secret as a string.
    pub fn reveal(&self) -> String {
        match &self.data {
            Some(data) => String::from_utf8_lossy(data).into_owned(),
            None => String::new(),
        }
    }

    /// Returns a private copy of the underlying bytes.
    pub fn reveal_bytes(&self) -> Vec<u8> {
        self.data.clone().unwrap_or_default()
    }

    /// Wipes the buffer: overwrite with random bytes, then zero, then release.
    ///
    /// Idempotent; calling it on an already-destroyed secret is a no-op.
    pub fn destroy(&mut self) {
        if let Some(mut data) = self.data.take() {
            rand::rng().fill_bytes(&mut data);
            data.zeroize();
        }
    }

    /// True if the secret was never set or has been destroyed.
    pub fn is_empty(&self) -> bool {
        self.data.as_ref().is_none_or(|d| d.is_empty())
    }
}

impl Drop for SecureSecret {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Clone for SecureSecret {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

// Redacted: secrets must never reach log output.
impl fmt::Debug for SecureSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureSecret(<redacted>)")
    }
}

impl From<&str> for SecureSecret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
