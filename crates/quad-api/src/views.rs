//! Row -> API model mapping for the REST-only surfaces (profiles, feed).
//! Channel and direct messages reuse the gateway's view builders so both
//! transports serve identical shapes.

use tracing::warn;
use uuid::Uuid;

use quad_db::models::{parse_timestamp, CommentRow, PostRow, UserRow};
use quad_types::models::{Author, CommentView, PostView, UserProfile};

pub(crate) fn parse_uuid(s: &str, what: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, s, e);
        Uuid::default()
    })
}

pub(crate) fn profile(row: &UserRow) -> UserProfile {
    UserProfile {
        id: parse_uuid(&row.id, "user id"),
        alias: row.alias.clone(),
        avatar_color: row.avatar_color.clone(),
        avatar_face: row.avatar_face.clone(),
        is_online: row.is_online,
        last_active: row.last_seen.as_deref().map(parse_timestamp),
    }
}

pub(crate) fn post_view(row: &PostRow) -> PostView {
    PostView {
        id: parse_uuid(&row.id, "post id"),
        content: row.content.clone(),
        created_at: parse_timestamp(&row.created_at),
        author: Author {
            id: parse_uuid(&row.author_id, "author id"),
            alias: row.author_alias.clone(),
            avatar_color: row.author_color.clone(),
            avatar_face: row.author_face.clone(),
        },
        like_count: row.like_count,
        comment_count: row.comment_count,
        user_liked: row.user_liked,
    }
}

pub(crate) fn comment_view(row: &CommentRow) -> CommentView {
    CommentView {
        id: parse_uuid(&row.id, "comment id"),
        content: row.content.clone(),
        created_at: parse_timestamp(&row.created_at),
        author: Author {
            id: parse_uuid(&row.author_id, "author id"),
            alias: row.author_alias.clone(),
            avatar_color: row.author_color.clone(),
            avatar_face: row.author_face.clone(),
        },
        like_count: row.like_count,
        user_liked: row.user_liked,
    }
}
