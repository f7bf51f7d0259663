use http::header;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{now, parse_json, parse_json_or_default, verify_password};
use crate::core::path_params::PathParams;
use crate::core::response::{
    read_cookie, removal_cookie, session_cookie, ApiResponse, Request, Response,
};
use crate::models::models::{PublicUser, User};
use crate::tokens::TokenPair;
use crate::App;

/// Identity attached to a request once its access token checks out.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    username: Option<String>,
    email: Option<String>,
    password: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: Option<String>,
}

/// Access token from the `accessToken` cookie, falling back to a bearer header.
pub fn extract_token(req: &Request) -> Option<String> {
    if let Some(token) = read_cookie(req, ACCESS_TOKEN_COOKIE).filter(|t| !t.is_empty()) {
        return Some(token);
    }

    let auth_header = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Session check run in front of every protected route.
pub fn authenticate(app: &App, req: &Request) -> ApiResult<AuthUser> {
    let token = extract_token(req).ok_or_else(|| ApiError::unauthorized("unauthorized request"))?;

    let claims = app.tokens.verify_access(&token).map_err(|e| {
        debug!("Rejected access token: {e}");
        ApiError::unauthorized("invalid access token")
    })?;

    let user = app
        .db
        .get_user(&claims.id)?
        .ok_or_else(|| ApiError::unauthorized("invalid access token"))?;

    Ok(AuthUser {
        id: user.id,
        username: user.username,
        email: user.email,
    })
}

/// Mints a fresh token pair and stores the refresh half on the user,
/// replacing whatever session was active before. Returns the user as stored.
pub fn start_session(app: &App, user: &User) -> ApiResult<(TokenPair, User)> {
    let pair = app.tokens.issue_pair(user)?;
    let stored = app
        .db
        .update_user(&user.id, |stored| {
            stored.refresh_token = Some(pair.refresh_token.clone());
            stored.updated_at = now();
            true
        })?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok((pair, stored))
}

pub fn with_session_cookies(app: &App, resp: ApiResponse, pair: &TokenPair) -> ApiResponse {
    let secure = app.config.secure_cookies;
    resp.cookie(session_cookie(ACCESS_TOKEN_COOKIE, pair.access_token.clone(), secure))
        .cookie(session_cookie(REFRESH_TOKEN_COOKIE, pair.refresh_token.clone(), secure))
}

pub fn login_user(app: &App, req: &Request, _params: &PathParams) -> ApiResult<Response> {
    let body: LoginRequest = parse_json(req)?;

    let identifier = body
        .username
        .as_deref()
        .or(body.email.as_deref())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("username or email is required"))?;
    if body.password.is_empty() {
        return Err(ApiError::bad_request("password is required"));
    }

    let user = if identifier.contains('@') {
        app.db.find_user_by_email(identifier)?
    } else {
        app.db.find_user_by_username(identifier)?
    };
    let user = user.ok_or_else(|| ApiError::not_found("user does not exist"))?;

    if !verify_password(&body.password, &user.password_hash) {
        return Err(ApiError::unauthorized("invalid user credentials"));
    }

    let (pair, user) = start_session(app, &user)?;
    info!(user_id = %user.id, "User logged in");

    let resp = ApiResponse::ok("user logged in successfully").data(&serde_json::json!({
        "user": PublicUser::from(&user),
        "accessToken": pair.access_token,
        "refreshToken": pair.refresh_token,
    }))?;
    with_session_cookies(app, resp, &pair).build()
}

pub fn logout_user(
    app: &App,
    _req: &Request,
    _params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    app.db.update_user(&auth.id, |user| {
        user.refresh_token = None;
        user.updated_at = now();
        true
    })?;
    info!(user_id = %auth.id, "User logged out");

    let secure = app.config.secure_cookies;
    ApiResponse::ok("user logged out")
        .cookie(removal_cookie(ACCESS_TOKEN_COOKIE, secure))
        .cookie(removal_cookie(REFRESH_TOKEN_COOKIE, secure))
        .build()
}

pub fn refresh_access_token(app: &App, req: &Request, _params: &PathParams) -> ApiResult<Response> {
    let incoming = match read_cookie(req, REFRESH_TOKEN_COOKIE).filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => parse_json_or_default::<RefreshRequest>(req)?
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("unauthorized request"))?,
    };

    let claims = app.tokens.verify_refresh(&incoming).map_err(|e| {
        debug!("Rejected refresh token: {e}");
        ApiError::unauthorized("invalid refresh token")
    })?;

    let user = app
        .db
        .get_user(&claims.id)?
        .ok_or_else(|| ApiError::unauthorized("invalid refresh token"))?;

    // Compare and swap in one update so a refresh token is redeemed at most once
    let pair = app.tokens.issue_pair(&user)?;
    let mut redeemed = false;
    app.db.update_user(&user.id, |stored| {
        redeemed = stored.refresh_token.as_deref() == Some(incoming.as_str());
        if redeemed {
            stored.refresh_token = Some(pair.refresh_token.clone());
            stored.updated_at = now();
        }
        redeemed
    })?;
    if !redeemed {
        return Err(ApiError::unauthorized("refresh token is expired or used"));
    }
    debug!(user_id = %user.id, "Rotated refresh token");

    let resp = ApiResponse::ok("access token refreshed").data(&pair)?;
    with_session_cookies(app, resp, &pair).build()
}
