//! Build client-facing payloads from database rows.
//!
//! Stored rows hold ciphertext when encryption is on; read paths decrypt
//! with the stored key/nonce before returning content. A row that fails
//! AEAD authentication is surfaced as corrupted — never as plausible
//! plaintext.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use tracing::warn;
use uuid::Uuid;

use quad_db::models::{parse_timestamp, DirectMessageRow, MessageRow};
use quad_types::models::{Author, DirectMessageView, EncryptionEnvelope, MessageView};

/// Placeholder shown when a stored ciphertext fails authentication.
pub const CORRUPTED: &str = "[message corrupted]";

pub(crate) fn parse_uuid(s: &str, what: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, s, e);
        Uuid::default()
    })
}

/// Wire envelope for a freshly sealed message, if it was encrypted.
pub fn envelope(sealed: &quad_crypto::SealedMessage) -> Option<EncryptionEnvelope> {
    match (&sealed.key, &sealed.nonce) {
        (Some(key), Some(nonce)) => Some(EncryptionEnvelope {
            key: quad_crypto::key_to_base64(key),
            nonce: B64.encode(nonce),
        }),
        _ => None,
    }
}

/// Recover the plaintext and wire envelope for a stored row.
fn open_content(
    content: &str,
    is_encrypted: bool,
    enc_key: &Option<Vec<u8>>,
    nonce: &Option<Vec<u8>>,
) -> (String, Option<EncryptionEnvelope>) {
    if !is_encrypted {
        return (content.to_string(), None);
    }

    let (Some(key), Some(nonce)) = (enc_key, nonce) else {
        // Encrypted flag without key material: unreadable row.
        warn!("Encrypted row is missing its key material");
        return (CORRUPTED.to_string(), None);
    };

    let envelope = EncryptionEnvelope {
        key: quad_crypto::key_to_base64(key),
        nonce: B64.encode(nonce),
    };

    let plaintext = B64
        .decode(content)
        .ok()
        .and_then(|ciphertext| {
            let key: [u8; 32] = key.as_slice().try_into().ok()?;
            quad_crypto::decrypt(&ciphertext, &key, nonce).ok()
        })
        .and_then(|bytes| String::from_utf8(bytes).ok());

    match plaintext {
        Some(text) => (text, Some(envelope)),
        None => {
            warn!("Stored ciphertext failed authentication");
            (CORRUPTED.to_string(), Some(envelope))
        }
    }
}

pub fn message_view(row: &MessageRow, reactions: HashMap<String, i64>) -> MessageView {
    let (content, encryption) =
        open_content(&row.content, row.is_encrypted, &row.enc_key, &row.nonce);

    MessageView {
        id: parse_uuid(&row.id, "message id"),
        content,
        timestamp: parse_timestamp(&row.created_at),
        author: Author {
            id: parse_uuid(&row.author_id, "author id"),
            alias: row.author_alias.clone(),
            avatar_color: row.author_color.clone(),
            avatar_face: row.author_face.clone(),
        },
        channel_id: parse_uuid(&row.channel_id, "channel id"),
        is_encrypted: row.is_encrypted,
        reactions,
        encryption,
    }
}

pub fn direct_message_view(row: &DirectMessageRow) -> DirectMessageView {
    let (content, encryption) =
        open_content(&row.content, row.is_encrypted, &row.enc_key, &row.nonce);

    DirectMessageView {
        id: parse_uuid(&row.id, "dm id"),
        content,
        timestamp: parse_timestamp(&row.created_at),
        sender: Author {
            id: parse_uuid(&row.sender_id, "sender id"),
            alias: row.sender_alias.clone(),
            avatar_color: row.sender_color.clone(),
            avatar_face: row.sender_face.clone(),
        },
        recipient_id: parse_uuid(&row.recipient_id, "recipient id"),
        is_read: row.is_read,
        is_encrypted: row.is_encrypted,
        encryption,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quad_crypto::MessageCipher;

    fn encrypted_row(content: &str) -> MessageRow {
        let sealed = MessageCipher::new(true).seal(content).unwrap();
        MessageRow {
            id: Uuid::new_v4().to_string(),
            channel_id: Uuid::new_v4().to_string(),
            author_id: Uuid::new_v4().to_string(),
            author_alias: "SableSkink1".into(),
            author_color: "teal".into(),
            author_face: "grin".into(),
            content: B64.encode(&sealed.content),
            is_encrypted: true,
            enc_key: sealed.key.map(|k| k.to_vec()),
            nonce: sealed.nonce.map(|n| n.to_vec()),
            created_at: "2025-03-14 09:26:53".into(),
        }
    }

    #[test]
    fn encrypted_row_is_opened_for_display() {
        let row = encrypted_row("the quad at dusk");
        let view = message_view(&row, HashMap::new());

        assert_eq!(view.content, "the quad at dusk");
        assert!(view.is_encrypted);
        assert!(view.encryption.is_some());
    }

    #[test]
    fn tampered_row_surfaces_as_corrupted() {
        let mut row = encrypted_row("original");
        // Flip a ciphertext byte
        let mut bytes = B64.decode(&row.content).unwrap();
        bytes[0] ^= 0xff;
        row.content = B64.encode(&bytes);

        let view = message_view(&row, HashMap::new());
        assert_eq!(view.content, CORRUPTED);
    }

    #[test]
    fn plaintext_row_has_no_envelope() {
        let mut row = encrypted_row("ignored");
        row.is_encrypted = false;
        row.content = "plain".into();
        row.enc_key = None;
        row.nonce = None;

        let view = message_view(&row, HashMap::new());
        assert_eq!(view.content, "plain");
        assert!(view.encryption.is_none());
    }
}
