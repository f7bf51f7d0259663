use serde::Serialize;
use tracing::{error, info, warn};

use crate::auth::AuthUser;
use crate::core::db::Db;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::now;
use crate::core::path_params::PathParams;
use crate::core::response::{ApiResponse, Request, Response};
use crate::models::models::{User, UserSummary};
use crate::App;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EdgeChange {
    Add,
    Remove,
}

impl EdgeChange {
    fn inverse(self) -> Self {
        match self {
            EdgeChange::Add => EdgeChange::Remove,
            EdgeChange::Remove => EdgeChange::Add,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FollowStatus {
    username: String,
    is_following: bool,
    followers_count: usize,
}

#[derive(Clone, Copy)]
enum Side {
    Followers,
    Following,
}

/// Applies `change` to one side of `user`'s edges, bumping `updated_at` when
/// the set actually changed.
fn apply(user: &mut User, side: Side, id: &str, change: EdgeChange) -> bool {
    let set = match side {
        Side::Followers => &mut user.followers,
        Side::Following => &mut user.following,
    };
    let changed = match change {
        EdgeChange::Add => set.insert(id.to_string()),
        EdgeChange::Remove => set.remove(id),
    };
    if changed {
        user.updated_at = now();
    }
    changed
}

/// Updates both sides of a follow edge: `follower_id` in the target's
/// followers and `target_id` in the follower's following.
///
/// Each side is an atomic single-document update, so concurrent follows of
/// the same user never drop each other's edges. The store has no multi-key
/// transactions: the target is written first, and if the follower write
/// fails the target change is reverted before the error is returned.
/// Returns the target as stored.
pub fn update_follow_edge(
    db: &Db,
    follower_id: &str,
    target_id: &str,
    change: EdgeChange,
) -> ApiResult<User> {
    if db.get_user(follower_id)?.is_none() {
        return Err(ApiError::not_found("user not found"));
    }

    let mut target_changed = false;
    let target = db
        .update_user(target_id, |target| {
            target_changed = apply(target, Side::Followers, follower_id, change);
            target_changed
        })?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let outcome = db.update_user(follower_id, |follower| {
        apply(follower, Side::Following, target_id, change)
    });
    let failure = match outcome {
        Ok(Some(_)) => return Ok(target),
        Ok(None) => ApiError::not_found("user not found"),
        Err(err) => ApiError::from(err),
    };

    warn!(follower_id, target_id, ?change, "Second follow write failed, compensating");
    if target_changed {
        compensate(db, follower_id, target_id, change);
    }
    Err(failure)
}

fn compensate(db: &Db, follower_id: &str, target_id: &str, change: EdgeChange) {
    let result = db.update_user(target_id, |target| {
        apply(target, Side::Followers, follower_id, change.inverse())
    });

    if let Err(err) = result {
        error!(
            follower_id,
            target_id,
            "Compensation failed, follow edge left one-sided: {err:#}"
        );
    }
}

fn resolve_target(app: &App, params: &PathParams) -> ApiResult<User> {
    let username = params.require("username")?;
    app.db
        .find_user_by_username(username)?
        .ok_or_else(|| ApiError::not_found("user not found"))
}

pub fn handle_follow(
    app: &App,
    _req: &Request,
    params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let target = resolve_target(app, params)?;
    if target.id == auth.id {
        return Err(ApiError::bad_request("you cannot follow yourself"));
    }

    let target = update_follow_edge(&app.db, &auth.id, &target.id, EdgeChange::Add)?;
    info!(follower = %auth.id, target = %target.id, "Followed user");

    ApiResponse::ok(format!("you are now following {}", target.username))
        .data(&FollowStatus {
            username: target.username.clone(),
            is_following: true,
            followers_count: target.followers.len(),
        })?
        .build()
}

pub fn handle_unfollow(
    app: &App,
    _req: &Request,
    params: &PathParams,
    auth: &AuthUser,
) -> ApiResult<Response> {
    let target = resolve_target(app, params)?;
    if target.id == auth.id {
        return Err(ApiError::bad_request("you cannot unfollow yourself"));
    }

    let target = update_follow_edge(&app.db, &auth.id, &target.id, EdgeChange::Remove)?;
    info!(follower = %auth.id, target = %target.id, "Unfollowed user");

    ApiResponse::ok(format!("you unfollowed {}", target.username))
        .data(&FollowStatus {
            username: target.username.clone(),
            is_following: false,
            followers_count: target.followers.len(),
        })?
        .build()
}

fn summaries<'a>(db: &Db, ids: impl IntoIterator<Item = &'a String>) -> ApiResult<Vec<UserSummary>> {
    let mut users = Vec::new();
    for id in ids {
        if let Some(user) = db.get_user(id)? {
            users.push(UserSummary::from(&user));
        }
    }
    Ok(users)
}

pub fn get_followers_list(
    app: &App,
    _req: &Request,
    params: &PathParams,
    _auth: &AuthUser,
) -> ApiResult<Response> {
    let user = resolve_target(app, params)?;
    ApiResponse::ok("followers fetched successfully")
        .data(&summaries(&app.db, &user.followers)?)?
        .build()
}

pub fn get_following_list(
    app: &App,
    _req: &Request,
    params: &PathParams,
    _auth: &AuthUser,
) -> ApiResult<Response> {
    let user = resolve_target(app, params)?;
    ApiResponse::ok("following fetched successfully")
        .data(&summaries(&app.db, &user.following)?)?
        .build()
}
