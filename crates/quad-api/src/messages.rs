use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use uuid::Uuid;

use quad_gateway::dispatcher::RoomKey;
use quad_gateway::sanitize::sanitize_text;
use quad_gateway::views::message_view;
use quad_types::api::{PageQuery, SendMessageRequest};
use quad_types::events::GatewayEvent;
use quad_types::models::{Author, MessageView, TargetKind};

use crate::error::{check_delete, ApiError};
use crate::middleware::Claims;
use crate::pagination::paginated;
use crate::{with_db, AppState};

/// GET /api/channels/{id}/messages — chronological page of history.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = channel_id.to_string();
    let page = query.page;
    let per_page = query.per_page;

    let (rows, total, reactions) = with_db(&state, move |db| {
        if !db.channel_exists(&cid)? {
            return Ok(None);
        }
        let (rows, total) = db.list_messages(&cid, page, per_page)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let reactions = db.reaction_counts_for_targets(&ids, TargetKind::Message)?;
        Ok(Some((rows, total, reactions)))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("channel not found".into()))?;

    let messages: Vec<MessageView> = rows
        .iter()
        .map(|row| {
            let counts = reactions.get(&row.id).cloned().unwrap_or_default();
            message_view(row, counts)
        })
        .collect();

    Ok(Json(paginated(messages, &query, total)))
}

/// POST /api/channels/{id}/messages — persist, then broadcast to the
/// channel room so WebSocket clients see REST-sent messages too.
pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = sanitize_text(req.content.trim());
    if content.is_empty() {
        return Err(ApiError::Validation("message content required".into()));
    }

    let cid = channel_id.to_string();
    if !with_db(&state, move |db| db.channel_exists(&cid)).await? {
        return Err(ApiError::NotFound("channel not found".into()));
    }

    let uid = claims.sub.to_string();
    let author_row = with_db(&state, move |db| db.get_user(&uid))
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    let sealed = state
        .cipher
        .seal(&content)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("encryption failed: {}", e)))?;

    let message_id = Uuid::new_v4();
    let stored = if sealed.is_encrypted() {
        B64.encode(&sealed.content)
    } else {
        content.clone()
    };

    {
        let mid = message_id.to_string();
        let cid = channel_id.to_string();
        let uid = claims.sub.to_string();
        let is_encrypted = sealed.is_encrypted();
        let key = sealed.key.map(|k| k.to_vec());
        let nonce = sealed.nonce.map(|n| n.to_vec());
        with_db(&state, move |db| {
            db.insert_message(
                &mid,
                &cid,
                &uid,
                &stored,
                is_encrypted,
                key.as_deref(),
                nonce.as_deref(),
            )
        })
        .await?;
    }

    let view = MessageView {
        id: message_id,
        content,
        timestamp: chrono::Utc::now(),
        author: Author {
            id: claims.sub,
            alias: author_row.alias,
            avatar_color: author_row.avatar_color,
            avatar_face: author_row.avatar_face,
        },
        channel_id,
        is_encrypted: sealed.is_encrypted(),
        reactions: HashMap::new(),
        encryption: quad_gateway::views::envelope(&sealed),
    };

    state
        .dispatcher
        .send_to_room(
            RoomKey::Channel(channel_id),
            GatewayEvent::NewMessage(view.clone()),
            None,
        )
        .await;

    Ok((StatusCode::CREATED, Json(view)))
}

/// DELETE /api/channels/{channel_id}/messages/{message_id} — author only.
pub async fn delete_message(
    State(state): State<AppState>,
    Path((_channel_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let mid = message_id.to_string();
    let uid = claims.sub.to_string();
    let result = with_db(&state, move |db| db.delete_message(&mid, &uid)).await?;
    check_delete(result, "message")?;

    Ok(Json(serde_json::json!({ "status": "deleted" })))
}
