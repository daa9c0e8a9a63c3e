use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{AppState, error::AppError, extract::ApiJson, models::User};

use super::model::{AuthResponse, LoginRequest, SignupRequest};

#[axum::debug_handler]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::signup(state.store.as_ref(), state.config.bcrypt_cost, req).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse::from(user))))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = User::login(state.store.as_ref(), req).await?;
    Ok(Json(AuthResponse {
        message: Some("Login successful".into()),
        ..AuthResponse::from(user)
    }))
}
