use axum::{Json, extract::State};

use crate::{AppState, error::AppError, extract::ApiJson, routes::MessageResponse};

use super::model::{RegisterTokenRequest, register};

#[axum::debug_handler]
pub async fn register_token(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterTokenRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let token = req.fcm_token.as_deref().map(str::trim).unwrap_or_default();
    let Some(user_id) = req.user_id.filter(|_| !token.is_empty()) else {
        return Err(AppError::Validation("User ID and FCM token are required".into()));
    };

    register(state.store.as_ref(), user_id, token).await?;
    Ok(Json(MessageResponse::new("FCM token registered")))
}
