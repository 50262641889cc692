use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    auth::CurrentUser,
    models::{NewPost, Post, PostId, PostPatch},
    Error, Result,
};

use super::{AppState, CreatePostPayload};

const TITLE_AND_CONTENT_REQUIRED: &str = "Title and content are required";

pub async fn list_posts(State(state): State<Arc<AppState>>) -> Json<Vec<Post>> {
    Json(state.repo.list().await)
}

pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Post>> {
    state
        .repo
        .get(&PostId::from(id))
        .await
        .map(Json)
        .ok_or(Error::NotFound)
}

pub async fn create_post(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    payload: std::result::Result<Json<CreatePostPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Post>)> {
    let Json(payload) = payload.map_err(|e| Error::Validation(e.body_text()))?;

    let (title, content) = match (payload.title, payload.content) {
        (Some(title), Some(content)) if !title.trim().is_empty() && !content.trim().is_empty() => {
            (title, content)
        }
        _ => return Err(Error::Validation(TITLE_AND_CONTENT_REQUIRED.into())),
    };

    let post = state
        .repo
        .create(NewPost {
            title,
            content,
            image_url: payload.image_url.filter(|url| !url.is_empty()),
            author_id: Some(user.user_id),
            author_name: Some(user.display_name),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_post(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    payload: std::result::Result<Json<PostPatch>, JsonRejection>,
) -> Result<Json<Post>> {
    let id = PostId::from(id);
    authorize(&state, &id, &user.user_id).await?;

    let Json(patch) = payload.map_err(|e| Error::Validation(e.body_text()))?;
    if matches!(&patch.title, Some(t) if t.trim().is_empty())
        || matches!(&patch.content, Some(c) if c.trim().is_empty())
    {
        return Err(Error::Validation(TITLE_AND_CONTENT_REQUIRED.into()));
    }

    // The post may have been deleted between the ownership check and the write.
    state
        .repo
        .update(&id, patch)
        .await?
        .map(Json)
        .ok_or(Error::NotFound)
}

pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id = PostId::from(id);
    authorize(&state, &id, &user.user_id).await?;

    if !state.repo.delete(&id).await? {
        return Err(Error::NotFound);
    }

    Ok(Json(json!({ "message": "Post deleted" })))
}

pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

async fn authorize(state: &AppState, id: &PostId, caller_id: &str) -> Result<()> {
    let post = state.repo.get(id).await.ok_or(Error::NotFound)?;

    if !post.is_editable_by(caller_id) {
        tracing::warn!(post_id = %id, caller = caller_id, "Rejected edit by non-author");
        return Err(Error::Forbidden);
    }

    Ok(())
}
