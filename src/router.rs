use tracing::{debug, error, info};

use crate::auth::{authenticate, AuthUser};
use crate::config::API_PREFIX;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::path_params::{match_path, PathParams};
use crate::core::response::{ApiResponse, Request, Response};
use crate::core::static_server::serve_static;
use crate::{auth, comments, follow, likes, posts, users, App};

type PublicHandler = fn(&App, &Request, &PathParams) -> ApiResult<Response>;
type ProtectedHandler = fn(&App, &Request, &PathParams, &AuthUser) -> ApiResult<Response>;

#[derive(Clone, Copy)]
enum Handler {
    Public(PublicHandler),
    /// Runs only after the session check has resolved an identity.
    Protected(ProtectedHandler),
}

struct Route {
    method: &'static str,
    pattern: &'static str,
    handler: Handler,
}

const fn public(method: &'static str, pattern: &'static str, handler: PublicHandler) -> Route {
    Route {
        method,
        pattern,
        handler: Handler::Public(handler),
    }
}

const fn protected(
    method: &'static str,
    pattern: &'static str,
    handler: ProtectedHandler,
) -> Route {
    Route {
        method,
        pattern,
        handler: Handler::Protected(handler),
    }
}

static ROUTES: &[Route] = &[
    public("GET", "/test/test-api", health_check),
    // users
    public("POST", "/users/register", users::register_user),
    public("POST", "/users/login", auth::login_user),
    public("POST", "/users/refresh-token", auth::refresh_access_token),
    protected("GET", "/users/logout", auth::logout_user),
    protected("GET", "/users/current-user", users::get_current_user),
    protected("POST", "/users/change-password", users::change_password),
    protected("POST", "/users/add-bio", users::add_bio),
    protected("PATCH", "/users/update-bio", users::update_bio),
    protected("PATCH", "/users/update-profile-image", users::update_profile_image),
    protected("GET", "/users/get-user-profile-data/:username", users::get_user_profile_data),
    protected("POST", "/users/follow/:username", follow::handle_follow),
    protected("POST", "/users/unfollow/:username", follow::handle_unfollow),
    protected("GET", "/users/followers/:username", follow::get_followers_list),
    protected("GET", "/users/following/:username", follow::get_following_list),
    // posts
    protected("POST", "/posts/create-post", posts::create_post),
    protected("GET", "/posts/all-posts", posts::get_all_posts),
    protected("GET", "/posts/user-posts/:username", posts::get_user_posts),
    protected("PATCH", "/posts/update-post-content/:postId", posts::update_post_content),
    protected("DELETE", "/posts/delete-post/:postId", posts::delete_post),
    // comments
    protected("POST", "/comments/create-comment/:postId", comments::create_comment),
    protected("GET", "/comments/all/:postId", comments::get_comments_by_post),
    protected(
        "DELETE",
        "/comments/delete-comment/post/:postId/comment/:commentId",
        comments::delete_comment,
    ),
    // likes
    protected("POST", "/likes/post/:postId/toggle-like", likes::toggle_post_like),
    protected("GET", "/likes/post/:postId", likes::get_users_who_liked_post),
];

fn health_check(_app: &App, _req: &Request, _params: &PathParams) -> ApiResult<Response> {
    ApiResponse::ok("Api is working fine")
        .data(&serde_json::json!({}))?
        .build()
}

fn dispatch(app: &App, req: &Request, method: &str, api_path: &str) -> ApiResult<Response> {
    for route in ROUTES {
        if route.method != method {
            continue;
        }
        let Some(params) = match_path(route.pattern, api_path) else {
            continue;
        };

        return match route.handler {
            Handler::Public(handler) => handler(app, req, &params),
            Handler::Protected(handler) => {
                let user = authenticate(app, req)?;
                handler(app, req, &params, &user)
            }
        };
    }

    Err(ApiError::not_found("route not found"))
}

/// Single entry point shared by the Spin component and the native server.
/// Never fails: every error is rendered into the failure envelope.
pub fn handle_request(app: &App, req: &Request) -> Response {
    let method = req.method().as_str();
    let path = req.uri().path();

    let result = match path.strip_prefix(API_PREFIX) {
        Some(api_path) if api_path.is_empty() || api_path.starts_with('/') => {
            dispatch(app, req, method, api_path)
        }
        _ if method == "GET" => serve_static(path),
        _ => Err(ApiError::not_found("route not found")),
    };

    match result {
        Ok(resp) => {
            info!(%method, %path, status = resp.status().as_u16(), "Request handled");
            resp
        }
        Err(err) => {
            match &err {
                ApiError::Internal(cause) => {
                    error!(%method, %path, "Request failed: {cause:#}")
                }
                other => debug!(%method, %path, status = other.status().as_u16(), "{other}"),
            }
            err.into()
        }
    }
}
