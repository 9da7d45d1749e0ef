//! Message encryption for quad.
//!
//! Per-message AES-256-GCM with a fresh random key and 96-bit nonce. The key
//! is transmitted alongside the ciphertext in broadcast payloads, so this
//! protects stored rows rather than the transport — a documented limitation,
//! not a security boundary.

pub mod cipher;
pub mod keys;

pub use cipher::{decrypt, encrypt, CryptoError, MessageCipher, SealedMessage};
pub use keys::{generate_key, generate_nonce, key_to_base64};
