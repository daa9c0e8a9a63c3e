use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::Store;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTokenRequest {
    pub user_id: Option<i64>,
    pub fcm_token: Option<String>,
}

/// 每个用户只保存最新的推送令牌
pub async fn register(store: &dyn Store, user_id: i64, token: &str) -> Result<(), AppError> {
    if !store.register_push_token(user_id, token).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    tracing::debug!(user_id, "push token registered");
    Ok(())
}
