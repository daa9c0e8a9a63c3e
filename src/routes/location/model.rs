use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Location;
use crate::store::Store;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub user_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationResponse {
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// 覆盖写入用户的最后已知位置
    pub async fn update(
        store: &dyn Store,
        user_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<Self, AppError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::Validation("Latitude must be between -90 and 90".into()));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::Validation(
                "Longitude must be between -180 and 180".into(),
            ));
        }

        let location = store
            .upsert_location(user_id, latitude, longitude)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        tracing::debug!(user_id, "location updated");
        Ok(location)
    }
}
