use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use thiserror::Error;

use crate::keys::{generate_key, generate_nonce};

#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD authentication failed: wrong key, or ciphertext/nonce tampered
    /// with. GCM never yields unauthenticated plaintext.
    #[error("message failed authentication (wrong key or tampered ciphertext)")]
    Authentication,
}

/// Result of sealing a message. When encryption is disabled the content is
/// passed through unchanged and `key`/`nonce` are `None` — callers must
/// branch on their presence before attempting a decrypt.
#[derive(Debug, Clone)]
pub struct SealedMessage {
    pub content: Vec<u8>,
    pub key: Option<[u8; 32]>,
    pub nonce: Option<[u8; 12]>,
}

impl SealedMessage {
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }
}

/// Encrypt a plaintext with AES-256-GCM under a fresh random key and nonce.
pub fn encrypt(plaintext: &[u8]) -> Result<SealedMessage, CryptoError> {
    let key = generate_key();
    let nonce_bytes = generate_nonce();

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::Authentication)?;

    Ok(SealedMessage {
        content: ciphertext,
        key: Some(key),
        nonce: Some(nonce_bytes),
    })
}

/// Decrypt an AES-256-GCM ciphertext. Fails closed on any tampering.
pub fn decrypt(ciphertext: &[u8], key: &[u8; 32], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != 12 {
        return Err(CryptoError::Authentication);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

/// Deployment-level encryption policy. Constructed once from config and
/// shared; `seal` is a no-op passthrough when the toggle is off.
#[derive(Debug, Clone, Copy)]
pub struct MessageCipher {
    enabled: bool,
}

impl MessageCipher {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn seal(&self, plaintext: &str) -> Result<SealedMessage, CryptoError> {
        if self.enabled {
            encrypt(plaintext.as_bytes())
        } else {
            Ok(SealedMessage {
                content: plaintext.as_bytes().to_vec(),
                key: None,
                nonce: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let message = b"meet at the quad at noon";

        let sealed = encrypt(message).unwrap();
        assert_ne!(sealed.content.as_slice(), message.as_slice());

        let decrypted = decrypt(
            &sealed.content,
            &sealed.key.unwrap(),
            &sealed.nonce.unwrap(),
        )
        .unwrap();
        assert_eq!(decrypted, message);
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = encrypt(b"secret").unwrap();
        let other_key = generate_key();

        let result = decrypt(&sealed.content, &other_key, &sealed.nonce.unwrap());
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let sealed = encrypt(b"untouchable").unwrap();
        let mut mangled = sealed.content.clone();
        mangled[0] ^= 0x01;

        let result = decrypt(&mangled, &sealed.key.unwrap(), &sealed.nonce.unwrap());
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn tampered_nonce_fails() {
        let sealed = encrypt(b"untouchable").unwrap();
        let mut nonce = sealed.nonce.unwrap();
        nonce[3] ^= 0xff;

        let result = decrypt(&sealed.content, &sealed.key.unwrap(), &nonce);
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn disabled_cipher_passes_through() {
        let cipher = MessageCipher::new(false);
        let sealed = cipher.seal("plain as day").unwrap();

        assert!(!sealed.is_encrypted());
        assert_eq!(sealed.content, b"plain as day");
        assert!(sealed.key.is_none() && sealed.nonce.is_none());
    }

    #[test]
    fn enabled_cipher_seals() {
        let cipher = MessageCipher::new(true);
        let sealed = cipher.seal("hush").unwrap();

        assert!(sealed.is_encrypted());
        assert_ne!(sealed.content, b"hush");
    }

    #[test]
    fn nonces_are_unique() {
        // Random 96-bit nonces; a collision here would mean a broken RNG.
        let a = encrypt(b"x").unwrap();
        let b = encrypt(b"x").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.key, b.key);
    }
}
