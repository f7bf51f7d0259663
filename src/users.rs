use serde::Deserialize;
use tracing::info;

use crate::auth::{start_session, with_session_cookies, AuthUser};
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{
    hash_password, is_valid_email, is_valid_url, is_valid_username, new_id, now, parse_json,
    sanitize_text, verify_password,
};
use crate::core::path_params::PathParams;
use crate::core::response::{ApiResponse, Request, Response};
use crate::models::models::{ProfileView, PublicUser, User};
use crate::App;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    profile_image: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password: String,
}

#[derive(Deserialize)]
struct BioRequest {
    #[serde(default)]
    bio: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileImageRequest {
    #[serde(default)]
    profile_image: String,
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.is_empty() {
        return Err(ApiError::bad_request("password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_image_url(url: &str) -> ApiResult<()> {
    if !is_valid_url(url) {
        return Err(ApiError::bad_request("profile image must be an http(s) URL"));
    }
    Ok(())
}

/// Sanitized bio, or an error when it is too long.
fn clean_bio(bio: &str) -> ApiResult<String> {
    let bio = sanitize_text(bio.trim());
    if bio.chars().count() > MAX_BIO_LENGTH {
        return Err(ApiError::bad_request(format!(
            "bio too long (max {MAX_BIO_LENGTH} chars)"
        )));
    }
    Ok(bio)
}

fn load_user(app: &App, id: &str) -> ApiResult<User> {
    app.db
        .get_user(id)?
        .ok_or_else(|| ApiError::not_found("user not found"))
}

fn update_user(app: &App, id: &str, change: impl FnMut(&mut User) -> bool) -> ApiResult<User> {
    app.db
        .update_user(id, change)?
        .ok_or_else(|| ApiError::not_found("user not found"))
}

pub fn register_user(app: &App, req: &Request, _params: &PathParams) -> ApiResult<Response> {
    let body: RegisterRequest = parse_json(req)?;
    let username = body.username.trim();
    let email = body.email.trim();

    if username.is_empty() {
        return Err(ApiError::bad_request("username is required"));
    }
    let username_length = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&username_length) {
        return Err(ApiError::bad_request(format!(
            "username must be {MIN_USERNAME_LENGTH}-{MAX_USERNAME_LENGTH} characters"
        )));
    }
    if !is_valid_username(username) {
        return Err(ApiError::bad_request(
            "username may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    if email.is_empty() {
        return Err(ApiError::bad_request("email is required"));
    }
    if !is_valid_email(email) {
        return Err(ApiError::bad_request("invalid email"));
    }
    validate_password(&body.password)?;
    if let Some(url) = &body.profile_image {
        validate_image_url(url)?;
    }

    if app.db.find_user_by_username(username)?.is_some()
        || app.db.find_user_by_email(email)?.is_some()
    {
        return Err(ApiError::conflict(
            "User with this email or username already exists.",
        ));
    }

    let created_at = now();
    let user = User {
        id: new_id(),
        username: username.to_string(),
        email: email.to_lowercase(),
        password_hash: hash_password(&body.password)?,
        bio: None,
        profile_image: body.profile_image,
        followers: Default::default(),
        following: Default::default(),
        refresh_token: None,
        created_at,
        updated_at: created_at,
    };
    // The indexes are claimed atomically, so a racing registration that
    // slipped past the lookup above still ends here.
    if !app.db.insert_user(&user)? {
        return Err(ApiError::conflict(
            "User with this email or username already exists.",
        ));
    }

    let (pair, user) = start_session(app, &user)?;
    info!(user_id = %user.id, username = %user.username, "User registered");

    let resp = ApiResponse::created("User registered successfully").data(&serde_json::json!({
        "user": PublicUser::from(&user),
        "accessToken": pair.access_token,
        "refreshToken": pair.refresh_token,
    }))?;
    with_session_cookies(app, resp, &pair).build()
}

pub fn get_current_user(
    app: &App,
    _req: &Request,
    _params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let user = load_user(app, &auth.id)?;
    ApiResponse::ok("current user fetched successfully")
        .data(&PublicUser::from(&user))?
        .build()
}

pub fn change_password(
    app: &App,
    req: &Request,
    _params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let body: ChangePasswordRequest = parse_json(req)?;
    if body.old_password.is_empty() {
        return Err(ApiError::bad_request("old password is required"));
    }
    validate_password(&body.new_password)?;

    let user = load_user(app, &auth.id)?;
    if !verify_password(&body.old_password, &user.password_hash) {
        return Err(ApiError::bad_request("invalid old password"));
    }

    let password_hash = hash_password(&body.new_password)?;
    update_user(app, &auth.id, |user| {
        user.password_hash = password_hash.clone();
        user.updated_at = now();
        true
    })?;
    info!(user_id = %user.id, "Password changed");

    ApiResponse::ok("password changed successfully").build()
}

pub fn add_bio(
    app: &App,
    req: &Request,
    _params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let body: BioRequest = parse_json(req)?;
    let bio = clean_bio(&body.bio)?;
    if bio.is_empty() {
        return Err(ApiError::bad_request("bio is required"));
    }

    let mut had_bio = false;
    let user = update_user(app, &auth.id, |user| {
        had_bio = user.bio.is_some();
        if had_bio {
            return false;
        }
        user.bio = Some(bio.clone());
        user.updated_at = now();
        true
    })?;
    if had_bio {
        return Err(ApiError::conflict("bio already exists, update it instead"));
    }

    ApiResponse::ok("bio added successfully")
        .data(&PublicUser::from(&user))?
        .build()
}

pub fn update_bio(
    app: &App,
    req: &Request,
    _params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let body: BioRequest = parse_json(req)?;
    let bio = clean_bio(&body.bio)?;

    let bio = if bio.is_empty() { None } else { Some(bio) };
    let user = update_user(app, &auth.id, |user| {
        user.bio = bio.clone();
        user.updated_at = now();
        true
    })?;

    ApiResponse::ok("bio updated successfully")
        .data(&PublicUser::from(&user))?
        .build()
}

pub fn update_profile_image(
    app: &App,
    req: &Request,
    _params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let body: ProfileImageRequest = parse_json(req)?;
    let url = body.profile_image.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("profile image is required"));
    }
    validate_image_url(url)?;

    let user = update_user(app, &auth.id, |user| {
        user.profile_image = Some(url.to_string());
        user.updated_at = now();
        true
    })?;

    ApiResponse::ok("profile image updated successfully")
        .data(&PublicUser::from(&user))?
        .build()
}

pub fn get_user_profile_data(
    app: &App,
    _req: &Request,
    params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let username = params.require("username")?;
    let user = app
        .db
        .find_user_by_username(username)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let posts_count = app
        .db
        .all_posts()?
        .iter()
        .filter(|p| p.owner == user.id)
        .count();

    let profile = ProfileView {
        id: user.id.clone(),
        username: user.username.clone(),
        bio: user.bio.clone(),
        profile_image: user.profile_image.clone(),
        followers_count: user.followers.len(),
        following_count: user.following.len(),
        posts_count,
        is_following: user.followers.contains(&auth.id),
        created_at: user.created_at,
    };

    ApiResponse::ok("user profile fetched successfully")
        .data(&profile)?
        .build()
}
