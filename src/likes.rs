use serde::Serialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::path_params::PathParams;
use crate::core::response::{ApiResponse, Request, Response};
use crate::models::models::UserSummary;
use crate::posts::load_post;
use crate::App;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LikeStatus {
    liked: bool,
    likes_count: usize,
}

/// Flips the caller's like on a post in one atomic update of the post.
pub fn toggle_post_like(
    app: &App,
    _req: &Request,
    params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let post = load_post(app, params)?;

    let mut liked = false;
    let post = app
        .db
        .update_post(&post.id, |post| {
            liked = !post.likes.remove(&auth.id);
            if liked {
                post.likes.insert(auth.id.clone());
            }
            true
        })?
        .ok_or_else(|| ApiError::not_found("post not found"))?;
    info!(post_id = %post.id, user_id = %auth.id, liked, "Like toggled");

    let message = if liked {
        "you liked the post"
    } else {
        "you unliked the post"
    };
    ApiResponse::created(message)
        .data(&LikeStatus {
            liked,
            likes_count: post.likes.len(),
        })?
        .build()
}

pub fn get_users_who_liked_post(
    app: &App,
    _req: &Request,
    params: &PathParams,
    _auth: &AuthUser,
) -> ApiResult<Response> {
    let post = load_post(app, params)?;

    let mut liked_users = Vec::with_capacity(post.likes.len());
    for user_id in &post.likes {
        if let Some(user) = app.db.get_user(user_id)? {
            liked_users.push(UserSummary::from(&user));
        }
    }

    ApiResponse::ok("liked users fetched successfully")
        .data(&liked_users)?
        .build()
}
