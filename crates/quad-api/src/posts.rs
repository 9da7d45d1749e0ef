use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use quad_gateway::sanitize::sanitize_text;
use quad_types::api::{CreateCommentRequest, CreatePostRequest, PageQuery};
use quad_types::models::{CommentView, PostView};

use crate::error::{check_delete, ApiError};
use crate::middleware::Claims;
use crate::pagination::paginated;
use crate::views::{comment_view, post_view};
use crate::{with_db, AppState};

/// Longest accepted post or comment body, after sanitization.
const MAX_CONTENT_LEN: usize = 2000;

fn validate_content(raw: &str) -> Result<String, ApiError> {
    let content = sanitize_text(raw.trim());
    if content.is_empty() {
        return Err(ApiError::Validation("content required".into()));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err(ApiError::Validation(format!(
            "content exceeds {} characters",
            MAX_CONTENT_LEN
        )));
    }
    Ok(content)
}

/// GET /api/posts — the feed, newest first.
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let page = query.page;
    let per_page = query.per_page;

    let (rows, total) =
        with_db(&state, move |db| db.list_posts(page, per_page, &viewer)).await?;

    let posts: Vec<PostView> = rows.iter().map(post_view).collect();
    Ok(Json(paginated(posts, &query, total)))
}

/// POST /api/posts
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = validate_content(&req.content)?;
    let post_id = Uuid::new_v4();

    let viewer = claims.sub.to_string();
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let row = with_db(&state, move |db| {
        db.insert_post(&pid, &uid, &content)?;
        db.get_post(&pid, &viewer)
    })
    .await?
    .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("post vanished after insert")))?;

    Ok((StatusCode::CREATED, Json(post_view(&row))))
}

/// DELETE /api/posts/{id} — author only; comments and reactions go with it.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let result = with_db(&state, move |db| db.delete_post(&pid, &uid)).await?;
    check_delete(result, "post")?;

    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

/// GET /api/posts/{id}/comments — chronological, unpaginated.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = post_id.to_string();
    let viewer = claims.sub.to_string();

    let rows = with_db(&state, move |db| {
        if !db.post_exists(&pid)? {
            return Ok(None);
        }
        db.list_comments(&pid, &viewer).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("post not found".into()))?;

    let comments: Vec<CommentView> = rows.iter().map(comment_view).collect();
    Ok(Json(comments))
}

/// POST /api/posts/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = validate_content(&req.content)?;
    let comment_id = Uuid::new_v4();

    let pid = post_id.to_string();
    let cid = comment_id.to_string();
    let uid = claims.sub.to_string();
    let viewer = claims.sub.to_string();
    let row = with_db(&state, move |db| {
        if !db.post_exists(&pid)? {
            return Ok(None);
        }
        db.insert_comment(&cid, &pid, &uid, &content)?;
        db.get_comment(&cid, &viewer)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("post not found".into()))?;

    Ok((StatusCode::CREATED, Json(comment_view(&row))))
}

/// DELETE /api/comments/{id} — author only.
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = comment_id.to_string();
    let uid = claims.sub.to_string();
    let result = with_db(&state, move |db| db.delete_comment(&cid, &uid)).await?;
    check_delete(result, "comment")?;

    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed_and_sanitized() {
        let out = validate_content("  hello <script>evil()</script>world  ").unwrap();
        assert!(!out.contains("script"));
        assert!(out.contains("hello"));
    }

    #[test]
    fn empty_content_rejected() {
        assert!(validate_content("   ").is_err());
        assert!(validate_content("<script>only</script>").is_err());
    }

    #[test]
    fn oversized_content_rejected() {
        let long = "a".repeat(MAX_CONTENT_LEN + 1);
        assert!(validate_content(&long).is_err());
    }
}
