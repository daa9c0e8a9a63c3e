use axum::{Json, extract::State};

use crate::{AppState, error::AppError, extract::ApiQuery, models::ChatMessage};

use super::model::MessagesQuery;

#[axum::debug_handler]
pub async fn get_messages(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MessagesQuery>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let group_id = query
        .group_id
        .ok_or_else(|| AppError::Validation("Group ID is required".into()))?;
    Ok(Json(ChatMessage::history(state.store.as_ref(), group_id).await?))
}
