use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;
use uuid::Uuid;

use quad_db::models::parse_timestamp;
use quad_types::models::Channel;

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::views::parse_uuid;
use crate::{with_db, AppState};

#[derive(Debug, Serialize)]
pub struct ChannelListing {
    #[serde(flatten)]
    pub channel: Channel,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct ChannelDetail {
    #[serde(flatten)]
    pub channel: Channel,
    pub message_count: i64,
    pub active_users: Vec<ActiveUserView>,
}

#[derive(Debug, Serialize)]
pub struct ActiveUserView {
    pub id: Uuid,
    pub alias: String,
    pub avatar_color: String,
    pub is_online: bool,
}

/// GET /api/channels — all channels, most recently active first.
pub async fn list_channels(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let summaries = with_db(&state, |db| db.list_channels()).await?;

    let listings: Vec<ChannelListing> = summaries
        .iter()
        .map(|s| ChannelListing {
            channel: Channel {
                id: parse_uuid(&s.row.id, "channel id"),
                name: s.row.name.clone(),
                description: s.row.description.clone(),
                created_at: parse_timestamp(&s.row.created_at),
            },
            last_activity: parse_timestamp(&s.last_activity),
        })
        .collect();

    Ok(Json(listings))
}

/// GET /api/channels/{id} — detail view with message count and a sample
/// of users who have posted there.
pub async fn channel_detail(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = channel_id.to_string();
    let (channel, message_count, active) = with_db(&state, move |db| {
        let Some(channel) = db.get_channel(&cid)? else {
            return Ok(None);
        };
        let count = db.channel_message_count(&cid)?;
        let active = db.channel_active_users(&cid, 20)?;
        Ok(Some((channel, count, active)))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("channel not found".into()))?;

    Ok(Json(ChannelDetail {
        channel: Channel {
            id: parse_uuid(&channel.id, "channel id"),
            name: channel.name,
            description: channel.description,
            created_at: parse_timestamp(&channel.created_at),
        },
        message_count,
        active_users: active
            .into_iter()
            .map(|u| ActiveUserView {
                id: parse_uuid(&u.id, "user id"),
                alias: u.alias,
                avatar_color: u.avatar_color,
                is_online: u.is_online,
            })
            .collect(),
    }))
}
