use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::views::profile;
use crate::{with_db, AppState};

/// Settings keys clients may write. Anything else in the payload is
/// dropped, not rejected, so older clients can send newer keys harmlessly.
const SETTINGS_WHITELIST: &[&str] = &[
    "theme",
    "font_size",
    "chat_bubble_style",
    "online_status",
    "read_receipts",
    "typing_indicators",
    "sound_alerts",
    "message_retention",
];

/// GET /api/users/me
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let user = with_db(&state, move |db| db.get_user(&uid))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(Json(profile(&user)))
}

/// GET /api/users/{id} — public view of another user.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user_id.to_string();
    let user = with_db(&state, move |db| db.get_user(&uid))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(Json(profile(&user)))
}

/// GET /api/users/settings
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let raw = with_db(&state, move |db| db.get_settings(&uid))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let settings: serde_json::Value = serde_json::from_str(&raw).unwrap_or_else(|_| {
        tracing::warn!("Corrupt settings blob for {}, resetting to empty", claims.sub);
        serde_json::json!({})
    });

    Ok(Json(settings))
}

/// PUT /api/users/settings — merge whitelisted keys into the stored blob.
pub async fn put_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(incoming): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let incoming = incoming
        .as_object()
        .ok_or_else(|| ApiError::Validation("settings must be a JSON object".into()))?
        .clone();

    let uid = claims.sub.to_string();
    let raw = with_db(&state, move |db| db.get_settings(&uid))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let mut settings: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&raw).unwrap_or_default();

    for (key, value) in incoming {
        if SETTINGS_WHITELIST.contains(&key.as_str()) {
            settings.insert(key, value);
        }
    }

    let merged = serde_json::Value::Object(settings);
    let blob = merged.to_string();
    let uid = claims.sub.to_string();
    with_db(&state, move |db| db.set_settings(&uid, &blob)).await?;

    Ok(Json(merged))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAvatarRequest {
    pub avatar_color: Option<String>,
    pub avatar_face: Option<String>,
}

/// PUT /api/users/avatar — either field may be updated on its own.
pub async fn put_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateAvatarRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let palette = [
        "blue", "pink", "yellow", "green", "purple", "orange", "teal", "red",
    ];
    for selection in [&req.avatar_color, &req.avatar_face].into_iter().flatten() {
        if !palette.contains(&selection.as_str()) {
            return Err(ApiError::Validation("unknown avatar selection".into()));
        }
    }

    let uid = claims.sub.to_string();
    with_db(&state, move |db| {
        db.update_avatar(&uid, req.avatar_color.as_deref(), req.avatar_face.as_deref())
    })
    .await?;

    let uid = claims.sub.to_string();
    let user = with_db(&state, move |db| db.get_user(&uid))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(Json(profile(&user)))
}
