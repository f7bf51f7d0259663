use std::collections::HashSet;
use std::sync::OnceLock;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use html_escape::decode_html_entities;
use rand::rngs::OsRng;
use regex::Regex;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::core::errors::{ApiError, ApiResult};
use crate::core::response::Request;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Strips every HTML tag and returns the remaining text unescaped, so
/// `Tom & Jerry` is stored as typed. The result is plain text: anything
/// rendering it as HTML must escape it.
pub fn sanitize_text(text: &str) -> String {
    let stripped = Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string();
    decode_html_entities(&stripped).into_owned()
}

pub fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("Regex should compile"))
}

pub fn is_valid_url(value: &str) -> bool {
    url_regex()
        .find(value)
        .is_some_and(|m| m.start() == 0 && m.end() == value.len())
}

pub fn is_valid_email(email: &str) -> bool {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX
        .get_or_init(|| {
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Regex should compile")
        })
        .is_match(email)
}

pub fn is_valid_username(username: &str) -> bool {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("Regex should compile"))
        .is_match(username)
}

pub fn parse_json<T: DeserializeOwned>(req: &Request) -> ApiResult<T> {
    serde_json::from_slice(req.body()).map_err(|e| ApiError::MalformedBody(e.to_string()))
}

/// Like [`parse_json`], but an empty body yields `T::default()`.
pub fn parse_json_or_default<T: DeserializeOwned + Default>(req: &Request) -> ApiResult<T> {
    if req.body().iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(req)
}
