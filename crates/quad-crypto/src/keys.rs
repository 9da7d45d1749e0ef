use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Generate a random 256-bit key for AES-256-GCM.
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random 96-bit nonce.
///
/// Always random, never derived: reusing a nonce under the same key breaks
/// both confidentiality and integrity of GCM.
pub fn generate_nonce() -> [u8; 12] {
    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encode key material to base64 for the wire envelope.
pub fn key_to_base64(key: &[u8]) -> String {
    BASE64.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_key_decodes_to_the_same_bytes() {
        let key = generate_key();
        let decoded = BASE64.decode(key_to_base64(&key)).unwrap();
        assert_eq!(decoded, key);
    }
}
