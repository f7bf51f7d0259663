//! Native HTTP server: actix-web in front of the shared router, backed by
//! the in-memory document store.

use actix_web::{web, App as ActixApp, HttpRequest, HttpResponse, HttpServer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::db::Db;
use crate::router::handle_request;
use crate::seed::seed_demo_data;
use crate::App;

mod adapter {
    use actix_web::{web, HttpRequest, HttpResponse};

    use crate::core::response::{Request, Response};

    pub fn actix_to_http_request(req: &HttpRequest, body: web::Bytes) -> anyhow::Result<Request> {
        let method = http::Method::from_bytes(req.method().as_str().as_bytes())?;

        let mut builder = http::Request::builder()
            .method(method)
            .uri(req.uri().to_string());

        // Copy headers
        for (name, value) in req.headers() {
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        Ok(builder.body(body.to_vec())?)
    }

    pub fn http_to_actix_response(resp: Response) -> HttpResponse {
        let status = actix_web::http::StatusCode::from_u16(resp.status().as_u16())
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = HttpResponse::build(status);
        for (name, value) in resp.headers() {
            if let Ok(value) = value.to_str() {
                response.append_header((name.as_str(), value));
            }
        }

        response.body(resp.into_body())
    }
}

async fn handle_all(state: web::Data<App>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let request = match adapter::actix_to_http_request(&req, body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Rejected unparsable request: {e:#}");
            return HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "message": "Invalid request",
                "errors": [],
            }));
        }
    };

    // Handlers block (password hashing, store access), so keep them off the reactor
    match web::block(move || handle_request(&state, &request)).await {
        Ok(resp) => adapter::http_to_actix_response(resp),
        Err(e) => {
            error!("Request handler panicked or was cancelled: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "message": "Internal Server Error",
                "errors": [],
            }))
        }
    }
}

pub async fn run() -> std::io::Result<()> {
    let config = Config::load();
    let db = Db::in_memory();

    if config.seed_demo {
        seed_demo_data(&db).map_err(std::io::Error::other)?;
    }

    let bind_addr = config.bind_addr.clone();
    let state = web::Data::new(App::new(db, config));

    info!("Server listening on http://{bind_addr}");

    HttpServer::new(move || {
        ActixApp::new()
            .app_data(state.clone())
            .default_service(web::route().to(handle_all))
    })
    .bind(bind_addr)?
    .run()
    .await
}
