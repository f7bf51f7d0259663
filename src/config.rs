use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 1000;

pub const API_PREFIX: &str = "/api/v1";

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

pub const FEED_KEY: &str = "feed";

const DEV_ACCESS_SECRET: &str = "bord-dev-access-secret";
const DEV_REFRESH_SECRET: &str = "bord-dev-refresh-secret";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username.to_lowercase())
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn comment_key(id: &str) -> String {
    format!("comment:{}", id)
}

/// Signing material and lifetimes for the two token kinds.
#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_expiry_secs: i64,
    pub refresh_secret: String,
    pub refresh_expiry_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_secret: DEV_ACCESS_SECRET.to_string(),
            access_expiry_secs: 15 * 60,
            refresh_secret: DEV_REFRESH_SECRET.to_string(),
            refresh_expiry_secs: 10 * 24 * 60 * 60,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub tokens: TokenConfig,
    pub secure_cookies: bool,
    pub bind_addr: String,
    pub seed_demo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tokens: TokenConfig::default(),
            secure_cookies: true,
            bind_addr: "0.0.0.0:80".to_string(),
            seed_demo: false,
        }
    }
}

impl Config {
    /// Reads the process environment once. Missing values fall back to
    /// development defaults; unparsable values are reported and replaced.
    pub fn load() -> Self {
        let defaults = Config::default();

        let tokens = TokenConfig {
            access_secret: load_secret("BORD_ACCESS_TOKEN_SECRET", &defaults.tokens.access_secret),
            access_expiry_secs: try_load(
                "BORD_ACCESS_TOKEN_EXPIRY_SECS",
                defaults.tokens.access_expiry_secs,
            ),
            refresh_secret: load_secret(
                "BORD_REFRESH_TOKEN_SECRET",
                &defaults.tokens.refresh_secret,
            ),
            refresh_expiry_secs: try_load(
                "BORD_REFRESH_TOKEN_EXPIRY_SECS",
                defaults.tokens.refresh_expiry_secs,
            ),
        };

        Self {
            tokens,
            secure_cookies: try_load("BORD_SECURE_COOKIES", defaults.secure_cookies),
            bind_addr: env::var("BORD_BIND_ADDR").unwrap_or(defaults.bind_addr),
            seed_demo: try_load("BORD_SEED_DEMO", defaults.seed_demo),
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn load_secret(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(secret) if !secret.trim().is_empty() => secret,
        _ => {
            warn!("{key} not set, falling back to an insecure development secret");
            default.to_string()
        }
    }
}
