//! Database row types — these map directly to SQLite rows.
//! Distinct from the quad-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

pub struct UserRow {
    pub id: String,
    pub alias: String,
    pub avatar_color: String,
    pub avatar_face: String,
    pub student_id: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub settings: String,
    pub is_online: bool,
    pub last_seen: Option<String>,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

pub struct ChannelSummary {
    pub row: ChannelRow,
    pub last_activity: String,
}

/// Message row joined with its author. Authors are a non-owning reference:
/// a missing author (never the case today, users are not hard-deleted)
/// falls back to placeholder fields rather than dropping the message.
pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_alias: String,
    pub author_color: String,
    pub author_face: String,
    pub content: String,
    pub is_encrypted: bool,
    pub enc_key: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
    pub created_at: String,
}

pub struct DirectMessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_alias: String,
    pub sender_color: String,
    pub sender_face: String,
    pub recipient_id: String,
    pub content: String,
    pub is_read: bool,
    pub is_encrypted: bool,
    pub enc_key: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
    pub created_at: String,
}

pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub author_alias: String,
    pub author_color: String,
    pub author_face: String,
    pub content: String,
    pub created_at: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub user_liked: bool,
}

pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_alias: String,
    pub author_color: String,
    pub author_face: String,
    pub content: String,
    pub created_at: String,
    pub like_count: i64,
    pub user_liked: bool,
}

/// Parse a SQLite timestamp. SQLite's `datetime('now')` produces
/// "YYYY-MM-DD HH:MM:SS" without a timezone; RFC 3339 is accepted too for
/// rows written by tests or older builds.
pub fn parse_timestamp(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|_| {
            tracing::warn!("Corrupt timestamp '{}', substituting epoch", s);
            DateTime::default()
        })
}
