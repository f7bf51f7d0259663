//! Access and refresh token issuing/verification.
//!
//! Access tokens carry the identity needed by handlers (`id`, `username`,
//! `email`) and live for minutes. Refresh tokens carry only the user id plus a
//! unique `jti`, live for days, and are only honoured while they match the
//! copy stored on the user record.

use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TokenConfig;
use crate::core::errors::ApiError;
use crate::core::helpers::{new_id, now};
use crate::models::models::User;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::unauthorized("token expired"),
            TokenError::Invalid => ApiError::unauthorized("invalid token"),
            TokenError::Signing(e) => ApiError::Internal(anyhow::Error::new(e)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessClaims {
    pub id: String,
    pub username: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshClaims {
    pub id: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Keys {
    fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_secs),
        }
    }
}

pub struct TokenService {
    access: Keys,
    refresh: Keys,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            access: Keys::new(&config.access_secret, config.access_expiry_secs),
            refresh: Keys::new(&config.refresh_secret, config.refresh_expiry_secs),
            validation,
        }
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String, TokenError> {
        let iat = now();
        let claims = AccessClaims {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            iat: iat.timestamp(),
            exp: (iat + self.access.ttl).timestamp(),
        };
        sign(&claims, &self.access.encoding)
    }

    pub fn issue_refresh_token(&self, user: &User) -> Result<String, TokenError> {
        let iat = now();
        let claims = RefreshClaims {
            id: user.id.clone(),
            jti: new_id(),
            iat: iat.timestamp(),
            exp: (iat + self.refresh.ttl).timestamp(),
        };
        sign(&claims, &self.refresh.encoding)
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(user)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, &self.access.decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, &self.refresh.decoding)
    }

    fn verify<T>(&self, token: &str, key: &DecodingKey) -> Result<T, TokenError>
    where
        T: DeserializeOwned + Clone,
    {
        decode::<T>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, TokenError> {
    encode(&Header::new(Algorithm::HS256), claims, key).map_err(TokenError::Signing)
}
