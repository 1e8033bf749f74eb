//! Signature-at-rest encryption.
//!
//! Signature blobs are sealed with AES-256-GCM before they reach SQLite. The
//! key is derived from a deployment passphrase with SHA-256; each blob gets a
//! fresh random 96-bit nonce, stored as the blob prefix. Encryption protects
//! the biometric vectors against casual database exfiltration; it is not a
//! substitute for filesystem permissions on the database itself.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// GCM standard nonce length in bytes.
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("sealed blob is too short ({0} bytes)")]
    TruncatedBlob(usize),
    #[error("decryption failed — wrong key or corrupted blob")]
    OpenFailed,
    #[error("encryption failed")]
    SealFailed,
}

/// AES-256-GCM cipher for signature blobs.
pub struct SignatureCipher {
    cipher: Aes256Gcm,
}

impl SignatureCipher {
    /// Derive the cipher key from a passphrase via SHA-256.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt a blob. Output layout: nonce (12 bytes) || ciphertext+tag.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::SealFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a blob produced by [`seal`](Self::seal).
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() <= NONCE_LEN {
            return Err(CryptoError::TruncatedBlob(blob.len()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::OpenFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = SignatureCipher::from_passphrase("kiosk-7");
        let plain = b"signature bytes".to_vec();
        let sealed = cipher.seal(&plain).unwrap();
        assert_ne!(sealed, plain);
        assert_eq!(cipher.open(&sealed).unwrap(), plain);
    }

    #[test]
    fn test_nonces_are_unique() {
        let cipher = SignatureCipher::from_passphrase("kiosk-7");
        let a = cipher.seal(b"same input").unwrap();
        let b = cipher.seal(b"same input").unwrap();
        assert_ne!(a, b, "fresh nonce per blob");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SignatureCipher::from_passphrase("right")
            .seal(b"data")
            .unwrap();
        let err = SignatureCipher::from_passphrase("wrong")
            .open(&sealed)
            .unwrap_err();
        assert!(matches!(err, CryptoError::OpenFailed));
    }

    #[test]
    fn test_tampered_blob_fails() {
        let cipher = SignatureCipher::from_passphrase("kiosk-7");
        let mut sealed = cipher.seal(b"data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(matches!(cipher.open(&sealed), Err(CryptoError::OpenFailed)));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let cipher = SignatureCipher::from_passphrase("kiosk-7");
        assert!(matches!(
            cipher.open(&[0u8; 5]),
            Err(CryptoError::TruncatedBlob(5))
        ));
    }
}
