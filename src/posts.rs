use ammonia::Builder;
use html_escape::encode_double_quoted_attribute;
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{is_valid_url, new_id, now, parse_json, url_regex, validate_uuid};
use crate::core::path_params::PathParams;
use crate::core::response::{ApiResponse, Request, Response};
use crate::feed::aggregate_posts;
use crate::models::models::Post;
use crate::App;

#[derive(Deserialize)]
struct CreatePostRequest {
    #[serde(default)]
    content: String,
    image: Option<String>,
}

#[derive(Deserialize)]
struct UpdatePostRequest {
    #[serde(default)]
    content: String,
}

fn validate_content(content: &str) -> ApiResult<()> {
    if content.trim().is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }
    if content.chars().count() > MAX_POST_LENGTH {
        return Err(ApiError::bad_request(format!(
            "content too long (max {MAX_POST_LENGTH} chars)"
        )));
    }
    Ok(())
}

/// Strips dangerous markup, then turns bare http(s) URLs into links. URLs
/// that already sit inside an attribute value (an existing `href`) are left alone.
pub fn filter_post_content(content: &str) -> String {
    let clean = Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(content)
        .to_string();

    let mut linked = String::with_capacity(clean.len());
    let mut last = 0;
    for found in url_regex().find_iter(&clean) {
        linked.push_str(&clean[last..found.start()]);
        let url = found.as_str();
        if clean[..found.start()].ends_with(['"', '\'']) {
            linked.push_str(url);
        } else {
            linked.push_str(&format!(
                r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
                encode_double_quoted_attribute(url),
                url
            ));
        }
        last = found.end();
    }
    linked.push_str(&clean[last..]);
    linked
}

/// Resolves the `postId` path parameter to a stored post.
pub fn load_post(app: &App, params: &PathParams) -> ApiResult<Post> {
    let post_id = params.require("postId")?;
    if !validate_uuid(post_id) {
        return Err(ApiError::bad_request("invalid post id"));
    }
    app.db
        .get_post(post_id)?
        .ok_or_else(|| ApiError::not_found("post not found"))
}

fn require_owner(post: &Post, auth: &AuthUser) -> ApiResult<()> {
    if post.owner != auth.id {
        return Err(ApiError::unauthorized(
            "you are not authorized to perform this action",
        ));
    }
    Ok(())
}

pub fn create_post(
    app: &App,
    req: &Request,
    _params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let body: CreatePostRequest = parse_json(req)?;
    validate_content(&body.content)?;
    if let Some(image) = &body.image {
        if !is_valid_url(image) {
            return Err(ApiError::bad_request("image must be an http(s) URL"));
        }
    }

    if app.db.get_user(&auth.id)?.is_none() {
        return Err(ApiError::not_found("user not found"));
    }

    let created_at = now();
    let post = Post {
        id: new_id(),
        content: filter_post_content(&body.content),
        image: body.image,
        owner: auth.id.clone(),
        comments: Vec::new(),
        likes: Default::default(),
        created_at,
        updated_at: created_at,
    };
    app.db.insert_post(&post)?;
    info!(post_id = %post.id, owner = %auth.id, "Post created");

    ApiResponse::created("post created successfully")
        .data(&post)?
        .build()
}

pub fn get_all_posts(
    app: &App,
    _req: &Request,
    _params: &PathParams,
    _auth: &AuthUser,
) -> ApiResult<Response> {
    let posts = aggregate_posts(&app.db, None)?;
    ApiResponse::ok("posts fetched successfully")
        .data(&posts)?
        .build()
}

pub fn get_user_posts(
    app: &App,
    _req: &Request,
    params: &PathParams,
    _auth: &AuthUser,
) -> ApiResult<Response> {
    let username = params.require("username")?;
    let user = app
        .db
        .find_user_by_username(username)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let posts = aggregate_posts(&app.db, Some(&user.id))?;
    ApiResponse::ok("user posts fetched successfully")
        .data(&posts)?
        .build()
}

pub fn update_post_content(
    app: &App,
    req: &Request,
    params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let post = load_post(app, params)?;
    require_owner(&post, auth)?;

    let body: UpdatePostRequest = parse_json(req)?;
    validate_content(&body.content)?;

    // Skip the write when nothing changed
    let filtered = filter_post_content(&body.content);
    let post = app
        .db
        .update_post(&post.id, |post| {
            if post.content == filtered {
                return false;
            }
            post.content = filtered.clone();
            post.updated_at = now();
            true
        })?
        .ok_or_else(|| ApiError::not_found("post not found"))?;

    ApiResponse::ok("post updated successfully")
        .data(&post)?
        .build()
}

pub fn delete_post(
    app: &App,
    _req: &Request,
    params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let post = load_post(app, params)?;
    require_owner(&post, auth)?;

    for comment_id in &post.comments {
        app.db.delete_comment(comment_id)?;
    }
    app.db.remove_post(&post.id)?;
    info!(post_id = %post.id, "Post deleted");

    ApiResponse::ok("post deleted successfully").build()
}
