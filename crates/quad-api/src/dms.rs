use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use uuid::Uuid;

use quad_gateway::dispatcher::RoomKey;
use quad_gateway::sanitize::sanitize_text;
use quad_gateway::views::direct_message_view;
use quad_types::api::{DirectMessageQuery, SendDirectMessageRequest};
use quad_types::events::GatewayEvent;
use quad_types::models::{Author, DirectMessageView};

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::{with_db, AppState};

/// GET /api/direct-messages?recipient_id= — the full conversation with one user,
/// chronological. Fetching a conversation marks its inbound half read.
pub async fn conversation(
    State(state): State<AppState>,
    Query(query): Query<DirectMessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub.to_string();
    let other = query.recipient_id.to_string();

    let rows = with_db(&state, move |db| {
        if !db.user_exists(&other)? {
            return Ok(None);
        }
        let rows = db.conversation(&me, &other)?;
        db.mark_conversation_read(&me, &other)?;
        Ok(Some(rows))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let messages: Vec<DirectMessageView> = rows.iter().map(direct_message_view).collect();
    Ok(Json(messages))
}

/// POST /api/direct-messages — persist, then deliver to the DM room and nudge the
/// recipient's private room if they're online.
pub async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendDirectMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = sanitize_text(req.content.trim());
    if content.is_empty() {
        return Err(ApiError::Validation("message content required".into()));
    }

    let rid = req.recipient_id.to_string();
    if !with_db(&state, move |db| db.user_exists(&rid)).await? {
        return Err(ApiError::NotFound("recipient not found".into()));
    }

    let uid = claims.sub.to_string();
    let sender_row = with_db(&state, move |db| db.get_user(&uid))
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    let sealed = state
        .cipher
        .seal(&content)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("encryption failed: {}", e)))?;

    let dm_id = Uuid::new_v4();
    let stored = if sealed.is_encrypted() {
        B64.encode(&sealed.content)
    } else {
        content.clone()
    };

    {
        let id = dm_id.to_string();
        let sid = claims.sub.to_string();
        let rid = req.recipient_id.to_string();
        let is_encrypted = sealed.is_encrypted();
        let key = sealed.key.map(|k| k.to_vec());
        let nonce = sealed.nonce.map(|n| n.to_vec());
        with_db(&state, move |db| {
            db.insert_direct_message(
                &id,
                &sid,
                &rid,
                &stored,
                is_encrypted,
                key.as_deref(),
                nonce.as_deref(),
            )
        })
        .await?;
    }

    let room = RoomKey::dm(claims.sub, req.recipient_id);
    state
        .dispatcher
        .merge_room(RoomKey::User(claims.sub), room)
        .await;
    state
        .dispatcher
        .merge_room(RoomKey::User(req.recipient_id), room)
        .await;

    let timestamp = chrono::Utc::now();
    let view = DirectMessageView {
        id: dm_id,
        content,
        timestamp,
        sender: Author {
            id: claims.sub,
            alias: sender_row.alias,
            avatar_color: sender_row.avatar_color,
            avatar_face: sender_row.avatar_face,
        },
        recipient_id: req.recipient_id,
        is_read: false,
        is_encrypted: sealed.is_encrypted(),
        encryption: quad_gateway::views::envelope(&sealed),
    };

    state
        .dispatcher
        .send_to_room(room, GatewayEvent::NewDirectMessage(view.clone()), None)
        .await;

    if state.dispatcher.is_online(req.recipient_id).await {
        state
            .dispatcher
            .send_to_room(
                RoomKey::User(req.recipient_id),
                GatewayEvent::DmNotification {
                    dm_id,
                    sender_id: claims.sub,
                    sender_alias: claims.alias.clone(),
                    timestamp,
                },
                None,
            )
            .await;
    }

    Ok((StatusCode::CREATED, Json(view)))
}
