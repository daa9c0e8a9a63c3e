#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use family_tracker::{AppState, build_router, config::Config, store::MemoryStore};
use serde_json::Value;
use tower::ServiceExt;

pub fn state() -> AppState {
    let config = Config {
        bcrypt_cost: 4,
        ..Config::default()
    };
    AppState::new(Arc::new(MemoryStore::new()), config)
}

pub fn app(state: AppState) -> Router {
    build_router(state, None)
}

pub async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// 注册并返回 userId
pub async fn signup(app: &Router, email: &str, fullname: &str) -> i64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/auth/signup",
        Some(serde_json::json!({"email": email, "password": "secret1", "fullname": fullname})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["userId"].as_i64().unwrap()
}
