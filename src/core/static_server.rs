use http::{header, StatusCode};
use mime_guess::from_path;
use rust_embed::RustEmbed;

use crate::core::errors::{ApiError, ApiResult};
use crate::core::response::Response;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

/// Maps the frontend's page routes onto embedded files.
fn asset_path(path: &str) -> &str {
    match path {
        "/" | "/index.html" | "/home" => "index.html",
        "/login" => "login.html",
        "/register" => "register.html",
        _ => path.trim_start_matches('/'),
    }
}

pub fn serve_static(path: &str) -> ApiResult<Response> {
    let file_path = asset_path(path);

    let file = Assets::get(file_path).ok_or_else(|| ApiError::not_found("page not found"))?;
    let mime = from_path(file_path).first_or_octet_stream();

    let resp = http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(file.data.to_vec())
        .map_err(anyhow::Error::from)?;
    Ok(resp)
}
