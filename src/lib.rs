#[cfg(target_arch = "wasm32")]
use spin_sdk::http_component;
#[cfg(target_arch = "wasm32")]
use spin_sdk::key_value::Store;

pub mod auth;
pub mod comments;
pub mod config;
pub mod feed;
pub mod follow;
pub mod likes;
pub mod posts;
pub mod router;
pub mod seed;
pub mod tokens;
pub mod users;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod path_params;
    pub mod response;
    pub mod static_server;
}

pub mod models {
    #[allow(clippy::module_inception)]
    pub mod models;
}

use crate::config::Config;
use crate::core::db::Db;
use crate::tokens::TokenService;

/// Everything a request handler needs: the document store, the token
/// service and the loaded configuration.
pub struct App {
    pub db: Db,
    pub tokens: TokenService,
    pub config: Config,
}

impl App {
    pub fn new(db: Db, config: Config) -> Self {
        Self {
            tokens: TokenService::new(&config.tokens),
            db,
            config,
        }
    }
}

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[http_component]
fn handle(req: http::Request<Vec<u8>>) -> anyhow::Result<http::Response<Vec<u8>>> {
    let store = Store::open_default()?;
    let app = App::new(Db::new(store), Config::load());

    Ok(router::handle_request(&app, &req))
}
