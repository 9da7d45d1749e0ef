use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use quad_gateway::dispatcher::RoomKey;
use quad_types::api::{GenericReactionRequest, ToggleReactionRequest};
use quad_types::events::GatewayEvent;
use quad_types::models::{TargetKind, ToggleOutcome};

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::views::parse_uuid;
use crate::{with_db, AppState};

/// POST /api/channels/{channel_id}/messages/{message_id}/reactions —
/// toggle a reaction on a channel message and push the new counts to the
/// channel room.
pub async fn toggle_message_reaction(
    State(state): State<AppState>,
    Path((_channel_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.reaction_type.trim().is_empty() {
        return Err(ApiError::Validation("reaction type required".into()));
    }

    let mid = message_id.to_string();
    let message = with_db(&state, move |db| db.get_message(&mid))
        .await?
        .ok_or_else(|| ApiError::NotFound("message not found".into()))?;

    let (outcome, counts) = toggle(&state, &claims, message_id, TargetKind::Message, &req.reaction_type).await?;

    let channel_id = parse_uuid(&message.channel_id, "channel id");
    state
        .dispatcher
        .send_to_room(
            RoomKey::Channel(channel_id),
            GatewayEvent::ReactionUpdate {
                message_id,
                reactions: counts.clone(),
                user_id: claims.sub,
                action: outcome.as_str().to_string(),
                reaction_type: req.reaction_type.clone(),
            },
            None,
        )
        .await;

    Ok(Json(serde_json::json!({
        "action": outcome.as_str(),
        "reactions": counts,
    })))
}

/// POST /api/reactions — toggle a reaction on any target kind. Feed
/// targets (posts, comments) are read over REST, so no broadcast here.
pub async fn toggle_generic_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GenericReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.reaction_type.trim().is_empty() {
        return Err(ApiError::Validation("reaction type required".into()));
    }

    {
        let tid = req.target_id.to_string();
        let kind = req.target_type;
        if !with_db(&state, move |db| db.target_exists(&tid, kind)).await? {
            return Err(ApiError::NotFound(format!("{} not found", req.target_type)));
        }
    }

    let (outcome, counts) =
        toggle(&state, &claims, req.target_id, req.target_type, &req.reaction_type).await?;

    Ok(Json(serde_json::json!({
        "action": outcome.as_str(),
        "reactions": counts,
    })))
}

async fn toggle(
    state: &AppState,
    claims: &Claims,
    target_id: Uuid,
    kind: TargetKind,
    reaction_type: &str,
) -> Result<(ToggleOutcome, std::collections::HashMap<String, i64>), ApiError> {
    let id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();
    let tid = target_id.to_string();
    let rtype = reaction_type.to_string();

    let outcome = with_db(state, move |db| {
        db.toggle_reaction(&id, &uid, &tid, kind, &rtype)
    })
    .await?;

    let tid = target_id.to_string();
    let counts = with_db(state, move |db| db.reaction_counts(&tid, kind)).await?;

    Ok((outcome, counts))
}
