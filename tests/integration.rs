use bord_social::config::{Config, TokenConfig, MAX_COMMENT_LENGTH};
use bord_social::core::db::Db;
use bord_social::router::handle_request;
use bord_social::App;
use http::header;
use serde_json::{json, Value};

struct Session {
    access_token: String,
    refresh_token: String,
    user_id: String,
}

fn app() -> App {
    App::new(Db::in_memory(), Config::default())
}

fn send(
    app: &App,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (u16, Value) {
    let (status, _, body) = send_raw(app, method, path, token, body);
    (status, body)
}

fn send_raw(
    app: &App,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (u16, Vec<String>, Value) {
    let mut builder = http::Request::builder()
        .method(method)
        .uri(format!("/api/v1{path}"))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = body.map(|b| b.to_string().into_bytes()).unwrap_or_default();
    let req = builder.body(body).unwrap();

    let resp = handle_request(app, &req);
    let cookies = resp
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    let json = serde_json::from_slice(resp.body()).unwrap_or(Value::Null);
    (resp.status().as_u16(), cookies, json)
}

fn register(app: &App, username: &str) -> Session {
    let (status, body) = send(
        app,
        "POST",
        "/users/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "secret123",
        })),
    );
    assert_eq!(status, 201, "register failed: {body}");
    Session {
        access_token: body["data"]["accessToken"].as_str().unwrap().to_string(),
        refresh_token: body["data"]["refreshToken"].as_str().unwrap().to_string(),
        user_id: body["data"]["user"]["id"].as_str().unwrap().to_string(),
    }
}

fn create_post(app: &App, session: &Session, content: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/posts/create-post",
        Some(&session.access_token),
        Some(json!({ "content": content })),
    );
    assert_eq!(status, 201, "create post failed: {body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

#[test]
fn test_register_and_login_flow() {
    let app = app();

    let (status, cookies, body) = send_raw(
        &app,
        "POST",
        "/users/register",
        None,
        Some(json!({
            "username": "flow_user",
            "email": "Flow@Example.com",
            "password": "secret123",
        })),
    );
    assert_eq!(status, 201);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "User registered successfully");
    assert_eq!(body["data"]["user"]["email"], "flow@example.com");
    assert!(body["data"]["user"].get("passwordHash").is_none());
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));

    // Same email with different casing is a duplicate
    let (status, body) = send(
        &app,
        "POST",
        "/users/register",
        None,
        Some(json!({
            "username": "another_user",
            "email": "FLOW@example.com",
            "password": "secret123",
        })),
    );
    assert_eq!(status, 409);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        &app,
        "POST",
        "/users/login",
        None,
        Some(json!({ "username": "flow_user", "password": "wrong-password" })),
    );
    assert_eq!(status, 401);
    assert_eq!(body["message"], "invalid user credentials");

    let (status, _) = send(
        &app,
        "POST",
        "/users/login",
        None,
        Some(json!({ "username": "nobody", "password": "secret123" })),
    );
    assert_eq!(status, 404);

    let (status, cookies, body) = send_raw(
        &app,
        "POST",
        "/users/login",
        None,
        Some(json!({ "email": "flow@example.com", "password": "secret123" })),
    );
    assert_eq!(status, 200);
    assert_eq!(cookies.len(), 2);
    let token = body["data"]["accessToken"].as_str().unwrap();

    let (status, body) = send(&app, "GET", "/users/current-user", Some(token), None);
    assert_eq!(status, 200);
    assert_eq!(body["data"]["username"], "flow_user");
}

#[test]
fn test_malformed_body_is_rejected() {
    let app = app();
    let req = http::Request::builder()
        .method("POST")
        .uri("/api/v1/users/register")
        .body(b"{not json".to_vec())
        .unwrap();

    let resp = handle_request(&app, &req);
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Malformed request body");
}

#[test]
fn test_session_cookie_authenticates() {
    let app = app();
    let session = register(&app, "cookie_user");

    let req = http::Request::builder()
        .method("GET")
        .uri("/api/v1/users/current-user")
        .header(header::COOKIE, format!("accessToken={}", session.access_token))
        .body(Vec::new())
        .unwrap();
    let resp = handle_request(&app, &req);
    assert_eq!(resp.status().as_u16(), 200);
}

#[test]
fn test_protected_routes_require_token() {
    let app = app();

    let (status, body) = send(&app, "GET", "/posts/all-posts", None, None);
    assert_eq!(status, 401);
    assert_eq!(body["message"], "unauthorized request");

    let (status, body) = send(&app, "GET", "/posts/all-posts", Some("garbage"), None);
    assert_eq!(status, 401);
    assert_eq!(body["message"], "invalid access token");
}

#[test]
fn test_refresh_token_rotation() {
    let app = app();
    let session = register(&app, "rotating_user");

    let (status, body) = send(
        &app,
        "POST",
        "/users/refresh-token",
        None,
        Some(json!({ "refreshToken": session.refresh_token })),
    );
    assert_eq!(status, 200);
    let rotated = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(rotated, session.refresh_token);

    // The superseded token must not work a second time
    let (status, body) = send(
        &app,
        "POST",
        "/users/refresh-token",
        None,
        Some(json!({ "refreshToken": session.refresh_token })),
    );
    assert_eq!(status, 401);
    assert_eq!(body["message"], "refresh token is expired or used");

    // Logout invalidates the current refresh token too
    let (status, cookies, _) = send_raw(&app, "GET", "/users/logout", Some(&session.access_token), None);
    assert_eq!(status, 200);
    assert_eq!(cookies.len(), 2);

    let (status, _) = send(
        &app,
        "POST",
        "/users/refresh-token",
        None,
        Some(json!({ "refreshToken": rotated })),
    );
    assert_eq!(status, 401);
}

#[test]
fn test_profile_updates() {
    let app = app();
    let session = register(&app, "profile_user");
    let token = Some(session.access_token.as_str());

    let (status, _) = send(&app, "POST", "/users/add-bio", token, Some(json!({ "bio": "hi there" })));
    assert_eq!(status, 200);
    let (status, _) = send(&app, "POST", "/users/add-bio", token, Some(json!({ "bio": "again" })));
    assert_eq!(status, 409);

    let (status, body) = send(&app, "PATCH", "/users/update-bio", token, Some(json!({ "bio": "updated" })));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["bio"], "updated");

    let (status, _) = send(
        &app,
        "PATCH",
        "/users/update-profile-image",
        token,
        Some(json!({ "profileImage": "not a url" })),
    );
    assert_eq!(status, 400);

    let (status, _) = send(
        &app,
        "POST",
        "/users/change-password",
        token,
        Some(json!({ "oldPassword": "nope", "newPassword": "another123" })),
    );
    assert_eq!(status, 400);

    let (status, _) = send(
        &app,
        "POST",
        "/users/change-password",
        token,
        Some(json!({ "oldPassword": "secret123", "newPassword": "another123" })),
    );
    assert_eq!(status, 200);

    let (status, _) = send(
        &app,
        "POST",
        "/users/login",
        None,
        Some(json!({ "username": "profile_user", "password": "another123" })),
    );
    assert_eq!(status, 200);
}

#[test]
fn test_follow_and_unfollow() {
    let app = app();
    let alice = register(&app, "alice");
    let bob = register(&app, "bob");

    let (status, body) = send(&app, "POST", "/users/follow/alice", Some(&alice.access_token), None);
    assert_eq!(status, 400);
    assert_eq!(body["message"], "you cannot follow yourself");

    let (status, body) = send(&app, "POST", "/users/follow/alice", Some(&bob.access_token), None);
    assert_eq!(status, 200);
    assert_eq!(body["data"]["followersCount"], 1);

    // Following twice keeps a single edge
    let (status, body) = send(&app, "POST", "/users/follow/alice", Some(&bob.access_token), None);
    assert_eq!(status, 200);
    assert_eq!(body["data"]["followersCount"], 1);

    let (_, body) = send(
        &app,
        "GET",
        "/users/get-user-profile-data/alice",
        Some(&bob.access_token),
        None,
    );
    assert_eq!(body["data"]["followersCount"], 1);
    assert_eq!(body["data"]["isFollowing"], true);

    let (_, body) = send(&app, "GET", "/users/following/bob", Some(&bob.access_token), None);
    assert_eq!(body["data"][0]["id"], alice.user_id);

    let (status, _) = send(&app, "POST", "/users/unfollow/alice", Some(&bob.access_token), None);
    assert_eq!(status, 200);

    let (_, body) = send(&app, "GET", "/users/followers/alice", Some(&alice.access_token), None);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    let (_, body) = send(&app, "GET", "/users/following/bob", Some(&bob.access_token), None);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, _) = send(&app, "POST", "/users/follow/ghost", Some(&bob.access_token), None);
    assert_eq!(status, 404);
}

#[test]
fn test_post_lifecycle() {
    let app = app();
    let owner = register(&app, "post_owner");
    let stranger = register(&app, "stranger");

    let post_id = create_post(&app, &owner, "first post");

    let (status, body) = send(&app, "GET", "/posts/all-posts", Some(&stranger.access_token), None);
    assert_eq!(status, 200);
    let feed = body["data"].as_array().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["commentsCount"], 0);
    assert_eq!(feed[0]["owner"]["username"], "post_owner");

    let path = format!("/posts/update-post-content/{post_id}");
    let (status, body) = send(
        &app,
        "PATCH",
        &path,
        Some(&stranger.access_token),
        Some(json!({ "content": "hijacked" })),
    );
    assert_eq!(status, 401);
    assert_eq!(body["message"], "you are not authorized to perform this action");

    let (status, body) = send(
        &app,
        "PATCH",
        &path,
        Some(&owner.access_token),
        Some(json!({ "content": "edited post" })),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["content"], "edited post");

    let (_, body) = send(
        &app,
        "GET",
        "/posts/user-posts/post_owner",
        Some(&stranger.access_token),
        None,
    );
    assert_eq!(body["data"][0]["content"], "edited post");

    let path = format!("/posts/delete-post/{post_id}");
    let (status, _) = send(&app, "DELETE", &path, Some(&stranger.access_token), None);
    assert_eq!(status, 401);
    let (status, _) = send(&app, "DELETE", &path, Some(&owner.access_token), None);
    assert_eq!(status, 200);
    let (status, _) = send(&app, "DELETE", &path, Some(&owner.access_token), None);
    assert_eq!(status, 404);
}

#[test]
fn test_comments() {
    let app = app();
    let owner = register(&app, "thread_owner");
    let commenter = register(&app, "commenter");
    let stranger = register(&app, "bystander");

    let post_id = create_post(&app, &owner, "discuss");
    let other_post_id = create_post(&app, &owner, "elsewhere");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/comments/create-comment/{post_id}"),
        Some(&commenter.access_token),
        Some(json!({ "comment": "   " })),
    );
    assert_eq!(status, 400);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/comments/create-comment/{post_id}"),
        Some(&commenter.access_token),
        Some(json!({ "comment": "nice <b>post</b>" })),
    );
    assert_eq!(status, 201);
    assert_eq!(body["data"]["comment"], "nice post");
    let comment_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, "GET", &format!("/comments/all/{post_id}"), Some(&stranger.access_token), None);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, "GET", "/posts/all-posts", Some(&stranger.access_token), None);
    let discussed = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == post_id.as_str())
        .unwrap()
        .clone();
    assert_eq!(discussed["commentsCount"], 1);
    assert_eq!(discussed["comments"][0]["commentedBy"]["username"], "commenter");

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/comments/delete-comment/post/{other_post_id}/comment/{comment_id}"),
        Some(&commenter.access_token),
        None,
    );
    assert_eq!(status, 400);
    assert_eq!(body["message"], "comment does not belong to this post");

    let delete_path = format!("/comments/delete-comment/post/{post_id}/comment/{comment_id}");
    let (status, _) = send(&app, "DELETE", &delete_path, Some(&stranger.access_token), None);
    assert_eq!(status, 401);

    // Post owners may moderate comments on their posts
    let (status, _) = send(&app, "DELETE", &delete_path, Some(&owner.access_token), None);
    assert_eq!(status, 200);

    let (_, body) = send(&app, "GET", &format!("/comments/all/{post_id}"), Some(&stranger.access_token), None);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[test]
fn test_like_toggle() {
    let app = app();
    let owner = register(&app, "liked_owner");
    let fan = register(&app, "fan");
    let post_id = create_post(&app, &owner, "like me");
    let toggle = format!("/likes/post/{post_id}/toggle-like");

    let (status, body) = send(&app, "POST", &toggle, Some(&fan.access_token), None);
    assert_eq!(status, 201);
    assert_eq!(body["data"]["liked"], true);
    assert_eq!(body["data"]["likesCount"], 1);

    let (_, body) = send(&app, "GET", &format!("/likes/post/{post_id}"), Some(&owner.access_token), None);
    assert_eq!(body["data"][0]["username"], "fan");

    let (_, body) = send(&app, "POST", &toggle, Some(&fan.access_token), None);
    assert_eq!(body["data"]["liked"], false);
    assert_eq!(body["data"]["likesCount"], 0);

    let (status, _) = send(&app, "POST", "/likes/post/not-a-uuid/toggle-like", Some(&fan.access_token), None);
    assert_eq!(status, 400);
}

#[test]
fn test_health_and_unknown_routes() {
    let app = app();

    let (status, body) = send(&app, "GET", "/test/test-api", None, None);
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let (status, body) = send(&app, "GET", "/no/such/route", None, None);
    assert_eq!(status, 404);
    assert_eq!(body["message"], "route not found");
}

#[test]
fn test_static_pages_are_served() {
    let app = app();
    let req = http::Request::builder()
        .method("GET")
        .uri("/register")
        .body(Vec::new())
        .unwrap();

    let resp = handle_request(&app, &req);
    assert_eq!(resp.status().as_u16(), 200);
    assert!(String::from_utf8_lossy(resp.body()).contains("<form"));
}

#[test]
fn test_duplicate_username_is_rejected() {
    let app = app();
    register(&app, "taken_name");

    let (status, body) = send(
        &app,
        "POST",
        "/users/register",
        None,
        Some(json!({
            "username": "Taken_Name",
            "email": "someone.else@example.com",
            "password": "secret123",
        })),
    );
    assert_eq!(status, 409);
    assert_eq!(body["message"], "User with this email or username already exists.");

    // The failed attempt must not have claimed the email either
    let (status, _) = send(
        &app,
        "POST",
        "/users/register",
        None,
        Some(json!({
            "username": "fresh_name",
            "email": "someone.else@example.com",
            "password": "secret123",
        })),
    );
    assert_eq!(status, 201);
}

#[test]
fn test_comment_author_deletes_own_comment() {
    let app = app();
    let owner = register(&app, "author_post_owner");
    let author = register(&app, "comment_author");
    let post_id = create_post(&app, &owner, "talk to me");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/comments/create-comment/{post_id}"),
        Some(&author.access_token),
        Some(json!({ "comment": "my own words" })),
    );
    assert_eq!(status, 201);
    let comment_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/comments/delete-comment/post/{post_id}/comment/{comment_id}"),
        Some(&author.access_token),
        None,
    );
    assert_eq!(status, 200);
    assert!(app.db.get_comment(&comment_id).unwrap().is_none());

    let (_, body) = send(&app, "GET", "/posts/all-posts", Some(&owner.access_token), None);
    assert_eq!(body["data"][0]["commentsCount"], 0);
}

#[test]
fn test_delete_post_removes_its_comments() {
    let app = app();
    let owner = register(&app, "cascade_owner");
    let commenter = register(&app, "cascade_commenter");
    let post_id = create_post(&app, &owner, "short lived");

    let mut comment_ids = Vec::new();
    for text in ["first", "second"] {
        let (status, body) = send(
            &app,
            "POST",
            &format!("/comments/create-comment/{post_id}"),
            Some(&commenter.access_token),
            Some(json!({ "comment": text })),
        );
        assert_eq!(status, 201);
        comment_ids.push(body["data"]["id"].as_str().unwrap().to_string());
    }

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/posts/delete-post/{post_id}"),
        Some(&owner.access_token),
        None,
    );
    assert_eq!(status, 200);

    for id in &comment_ids {
        assert!(app.db.get_comment(id).unwrap().is_none());
    }
    let (_, body) = send(&app, "GET", &format!("/comments/all/{post_id}"), Some(&owner.access_token), None);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    let (_, body) = send(&app, "GET", "/posts/all-posts", Some(&owner.access_token), None);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[test]
fn test_expired_access_token_is_rejected() {
    let config = Config {
        tokens: TokenConfig {
            access_expiry_secs: -120,
            ..TokenConfig::default()
        },
        ..Config::default()
    };
    let app = App::new(Db::in_memory(), config);
    let session = register(&app, "stale_user");

    let (status, body) = send(&app, "GET", "/users/current-user", Some(&session.access_token), None);
    assert_eq!(status, 401);
    assert_eq!(body["message"], "invalid access token");

    // The refresh token is still good, so the session can be renewed
    let (status, _) = send(
        &app,
        "POST",
        "/users/refresh-token",
        None,
        Some(json!({ "refreshToken": session.refresh_token })),
    );
    assert_eq!(status, 200);
}

#[test]
fn test_comment_text_is_stored_as_typed() {
    let app = app();
    let owner = register(&app, "literal_owner");
    let path = format!("/comments/create-comment/{}", create_post(&app, &owner, "math"));

    let (status, body) = send(
        &app,
        "POST",
        &path,
        Some(&owner.access_token),
        Some(json!({ "comment": "Tom & Jerry say 1 < 2" })),
    );
    assert_eq!(status, 201);
    assert_eq!(body["data"]["comment"], "Tom & Jerry say 1 < 2");

    // Ampersands count once toward the limit
    let at_limit = "&".repeat(MAX_COMMENT_LENGTH);
    let (status, body) = send(&app, "POST", &path, Some(&owner.access_token), Some(json!({ "comment": at_limit })));
    assert_eq!(status, 201, "at-limit comment rejected: {body}");
}

#[test]
fn test_concurrent_posts_all_reach_the_feed() {
    let app = app();
    let session = register(&app, "busy_poster");

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let (app, session) = (&app, &session);
            scope.spawn(move || {
                for n in 0..25 {
                    create_post(app, session, &format!("worker {worker} post {n}"));
                }
            });
        }
    });

    let (status, body) = send(&app, "GET", "/posts/all-posts", Some(&session.access_token), None);
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 200);
}
