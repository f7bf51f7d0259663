use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::config::MAX_COMMENT_LENGTH;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{new_id, now, parse_json, sanitize_text, validate_uuid};
use crate::core::path_params::PathParams;
use crate::core::response::{ApiResponse, Request, Response};
use crate::models::models::Comment;
use crate::posts::load_post;
use crate::App;

#[derive(Deserialize)]
struct CreateCommentRequest {
    #[serde(default)]
    comment: String,
}

pub fn create_comment(
    app: &App,
    req: &Request,
    params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let body: CreateCommentRequest = parse_json(req)?;
    let text = sanitize_text(body.comment.trim());
    if text.is_empty() {
        return Err(ApiError::bad_request("comment is required"));
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ApiError::bad_request(format!(
            "comment too long (max {MAX_COMMENT_LENGTH} chars)"
        )));
    }

    let post = load_post(app, params)?;

    let created_at = now();
    let comment = Comment {
        id: new_id(),
        post: post.id.clone(),
        comment: text,
        commented_by: auth.id.clone(),
        created_at,
        updated_at: created_at,
    };
    app.db.save_comment(&comment)?;

    let attached = app.db.update_post(&post.id, |post| {
        post.comments.push(comment.id.clone());
        true
    })?;
    if attached.is_none() {
        // The post was deleted after it was loaded
        app.db.delete_comment(&comment.id)?;
        return Err(ApiError::not_found("post not found"));
    }
    info!(comment_id = %comment.id, post_id = %post.id, "Comment created");

    ApiResponse::created("comment created successfully")
        .data(&comment)?
        .build()
}

/// Comments attached to a post, in the order they were made. An unknown
/// post simply has none.
pub fn get_comments_by_post(
    app: &App,
    _req: &Request,
    params: &PathParams,
    _auth: &AuthUser,
) -> ApiResult<Response> {
    let post_id = params.require("postId")?;
    if !validate_uuid(post_id) {
        return Err(ApiError::bad_request("invalid post id"));
    }

    let mut comments = Vec::new();
    if let Some(post) = app.db.get_post(post_id)? {
        for comment_id in &post.comments {
            if let Some(comment) = app.db.get_comment(comment_id)? {
                if comment.post == post.id {
                    comments.push(comment);
                }
            }
        }
    }

    ApiResponse::ok("comments fetched successfully")
        .data(&comments)?
        .build()
}

pub fn delete_comment(
    app: &App,
    _req: &Request,
    params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let post = load_post(app, params)?;

    let comment_id = params.require("commentId")?;
    if !validate_uuid(comment_id) {
        return Err(ApiError::bad_request("invalid comment id"));
    }
    let comment = app
        .db
        .get_comment(comment_id)?
        .ok_or_else(|| ApiError::not_found("comment not found"))?;

    if comment.post != post.id {
        return Err(ApiError::bad_request("comment does not belong to this post"));
    }

    let is_post_owner = post.owner == auth.id;
    let is_comment_owner = comment.commented_by == auth.id;
    if !is_post_owner && !is_comment_owner {
        return Err(ApiError::unauthorized(
            "you are not authorized to perform this action",
        ));
    }

    app.db.delete_comment(&comment.id)?;
    app.db.update_post(&post.id, |post| {
        let before = post.comments.len();
        post.comments.retain(|id| id != &comment.id);
        post.comments.len() != before
    })?;
    info!(comment_id = %comment.id, post_id = %post.id, "Comment deleted");

    ApiResponse::ok("comment deleted successfully").build()
}
