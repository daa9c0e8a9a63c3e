use axum::{Json, extract::State};

use crate::{AppState, error::AppError, extract::ApiJson, models::Location};

use super::model::{UpdateLocationRequest, UpdateLocationResponse};

#[axum::debug_handler]
pub async fn update_location(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UpdateLocationRequest>,
) -> Result<Json<UpdateLocationResponse>, AppError> {
    let (Some(user_id), Some(latitude), Some(longitude)) =
        (req.user_id, req.latitude, req.longitude)
    else {
        return Err(AppError::Validation(
            "User ID, latitude, and longitude are required".into(),
        ));
    };

    let location = Location::update(state.store.as_ref(), user_id, latitude, longitude).await?;
    Ok(Json(UpdateLocationResponse {
        message: "Location updated".into(),
        updated_at: location.updated_at,
    }))
}
