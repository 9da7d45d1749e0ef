use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of a user. Only anonymized fields — durable credentials
/// (student id, email) never leave the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub alias: String,
    pub avatar_color: String,
    pub avatar_face: String,
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

/// Compact author block embedded in messages, posts, and comments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    pub alias: String,
    pub avatar_color: String,
    pub avatar_face: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Key + nonce that accompany an encrypted payload, base64-encoded.
///
/// The key travels on the same channel as the ciphertext, so this protects
/// the stored row, not the transport. Known limitation, not a boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    pub key: String,
    pub nonce: String,
}

/// A channel message as returned to clients. `content` is always the
/// plaintext; the persisted row holds ciphertext when `is_encrypted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub author: Author,
    pub channel_id: Uuid,
    pub is_encrypted: bool,
    pub reactions: HashMap<String, i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessageView {
    pub id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender: Author,
    pub recipient_id: Uuid,
    pub is_read: bool,
    pub is_encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: Author,
    pub like_count: i64,
    pub comment_count: i64,
    pub user_liked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: Author,
    pub like_count: i64,
    pub user_liked: bool,
}

/// What a reaction attaches to. Stored as a plain string column; the
/// `reactions` table has no real foreign key to any of these, so cascade
/// deletes are explicit application logic in quad-db.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Message,
    Post,
    Comment,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message" => Some(Self::Message),
            "post" => Some(Self::Post),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a reaction toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleOutcome {
    Added,
    Removed,
}

impl ToggleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}
