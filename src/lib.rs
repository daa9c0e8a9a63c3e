use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use config::Config;
use middleware::{RateLimiter, log_errors, rate_limit};
use relay::Relay;
use store::Store;

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod relay;
pub mod routes;
pub mod store;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub relay: Arc<Relay>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            relay: Arc::new(Relay::new(config.relay_buffer)),
            store,
            config: Arc::new(config),
        }
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // 账号
        .route("/auth/signup", post(routes::user::signup))
        .route("/auth/login", post(routes::user::login))
        // 群组
        .route("/groups/create", post(routes::group::create_group))
        .route("/groups/join", post(routes::group::join_group))
        .route("/groups/members", get(routes::group::get_members))
        .route("/groups/created", get(routes::group::get_created))
        .route("/groups/delete", delete(routes::group::delete_group))
        .route("/groups/leave", delete(routes::group::leave_group))
        // 位置与聊天
        .route("/locations/update", post(routes::location::update_location))
        .route("/chat/messages", get(routes::message::get_messages))
        .route(
            "/notifications/register",
            post(routes::notification::register_token),
        )
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// REST 接口挂在 `api_base_uri` 下，`/socket` 与 `/health` 在根路径
pub fn build_router(state: AppState, rate_limiter: Option<Arc<RateLimiter>>) -> Router {
    let api = match rate_limiter {
        Some(limiter) => {
            api_routes().layer(axum::middleware::from_fn_with_state(limiter, rate_limit))
        }
        None => api_routes(),
    };

    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(base, api)
    };

    router
        .route("/socket", get(relay::socket::ws_handler))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(log_errors)),
        )
        .with_state(state)
}
