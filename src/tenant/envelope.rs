//! Encrypted payload envelope for tenant exchange.
//!
//! Wire format: `nonce (12 bytes) || ciphertext+tag`, sealed with
//! ChaCha20-Poly1305 under a 32-byte key provisioned by the tenant.
//! A fresh random nonce is generated for every seal; reusing a nonce
//! under the same key breaks confidentiality.

use chacha20poly1305::aead::{Aead, AeadCore, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce length for ChaCha20-Poly1305 (96 bits).
pub const NONCE_LEN: usize = 12;

/// Key length (256 bits).
pub const KEY_LEN: usize = 32;

/// Errors from sealing/opening an envelope or parsing a key.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("encryption key is not valid hex: {0}")]
    KeyEncoding(#[from] hex::FromHexError),

    #[error("encryption key must be 32 bytes (64 hex chars), got {0} bytes")]
    KeyLength(usize),

    #[error("encrypted payload too short ({0} bytes, need at least 12)")]
    TooShort(usize),

    #[error("failed to seal payload")]
    Seal,

    #[error("failed to open payload (wrong key or corrupted data)")]
    Open,
}

/// A 32-byte ChaCha20-Poly1305 key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EnvelopeKey {
    bytes: [u8; KEY_LEN],
}

impl EnvelopeKey {
    /// Parses a key from its hex-encoded configuration form.
    ///
    /// Wrong length or bad encoding is a configuration error raised here,
    /// before any network call uses the key.
    pub fn from_hex(hex_str: &str) -> Result<Self, EnvelopeError> {
        let decoded = hex::decode(hex_str.trim())?;
        if decoded.len() != KEY_LEN {
            return Err(EnvelopeError::KeyLength(decoded.len()));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.bytes))
    }
}

impl std::fmt::Debug for EnvelopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EnvelopeKey(<redacted>)")
    }
}

/// Seals a plaintext, prepending a freshly generated random nonce.
pub fn seal(key: &EnvelopeKey, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let cipher = key.cipher();
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| EnvelopeError::Seal)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Opens a sealed envelope, returning the plaintext.
///
/// Fails (without surfacing partial plaintext) if the envelope is
/// truncated, the key is wrong, or the ciphertext was tampered with.
pub fn open(key: &EnvelopeKey, envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if envelope.len() < NONCE_LEN {
        return Err(EnvelopeError::TooShort(envelope.len()));
    }
    let (nonce, ciphertext) = envelope.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EnvelopeError::Open)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn test_key() -> EnvelopeKey {
        EnvelopeKey::from_bytes([7u8; KEY_LEN])
    }

    #[test]
    fn test_seal_open_round_trip() {
        let key = test_key();
        let plaintext = br#"{"probe":"latency","value":12.5}"#;

        let sealed = seal(&key, plaintext).unwrap();
        assert!(sealed.len() > NONCE_LEN + plaintext.len());

        let opened = open(&key, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = seal(&test_key(), b"secret payload").unwrap();
        let wrong = EnvelopeKey::from_bytes([8u8; KEY_LEN]);

        assert!(matches!(open(&wrong, &sealed), Err(EnvelopeError::Open)));
    }

    #[test]
    fn test_open_rejects_tampered_ciphertext() {
        let key = test_key();
        let mut sealed = seal(&key, b"secret payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(matches!(open(&key, &sealed), Err(EnvelopeError::Open)));
    }

    #[test]
    fn test_open_rejects_truncated_envelope() {
        let err = open(&test_key(), &[0u8; 5]).unwrap_err();
        assert!(matches!(err, EnvelopeError::TooShort(5)));
    }

    #[test]
    fn test_nonces_do_not_repeat() {
        let key = test_key();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let sealed = seal(&key, b"x").unwrap();
            let nonce: [u8; NONCE_LEN] = sealed[..NONCE_LEN].try_into().unwrap();
            assert!(seen.insert(nonce), "nonce repeated under the same key");
        }
    }

    #[test]
    fn test_key_from_hex() {
        let hex_key = "0b".repeat(KEY_LEN);
        let key = EnvelopeKey::from_hex(&hex_key).unwrap();
        let sealed = seal(&key, b"payload").unwrap();
        assert_eq!(open(&key, &sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_key_from_hex_rejects_bad_input() {
        assert!(matches!(
            EnvelopeKey::from_hex("abcd"),
            Err(EnvelopeError::KeyLength(2))
        ));
        assert!(matches!(
            EnvelopeKey::from_hex("zz"),
            Err(EnvelopeError::KeyEncoding(_))
        ));
    }
}
