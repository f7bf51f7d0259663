use anyhow::Context;
use cookie::Cookie;
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;

use crate::core::errors::ApiResult;

pub type Request = http::Request<Vec<u8>>;
pub type Response = http::Response<Vec<u8>>;

#[derive(Serialize)]
struct Envelope<'a> {
    success: bool,
    message: &'a str,
    data: &'a serde_json::Value,
}

/// Success envelope: `{success: true, message, data}` plus any session cookies.
pub struct ApiResponse {
    status: StatusCode,
    message: String,
    data: serde_json::Value,
    cookies: Vec<Cookie<'static>>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, message)
    }

    pub fn created(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CREATED, message)
    }

    fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: serde_json::Value::Null,
            cookies: Vec::new(),
        }
    }

    pub fn data<T: Serialize>(mut self, data: &T) -> ApiResult<Self> {
        self.data = serde_json::to_value(data).context("serializing response data")?;
        Ok(self)
    }

    pub fn cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn build(self) -> ApiResult<Response> {
        let body = serde_json::to_vec(&Envelope {
            success: true,
            message: &self.message,
            data: &self.data,
        })
        .context("serializing response envelope")?;

        let mut builder = http::Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, "application/json");

        for cookie in &self.cookies {
            let value = HeaderValue::from_str(&cookie.to_string())
                .context("encoding Set-Cookie header")?;
            builder = builder.header(header::SET_COOKIE, value);
        }

        Ok(builder.body(body).context("building response")?)
    }
}

pub fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .build()
}

pub fn removal_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new(), secure);
    cookie.make_removal();
    cookie
}

/// First cookie named `name` across all `Cookie` headers.
pub fn read_cookie(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}
