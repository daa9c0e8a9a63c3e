use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 每个用户只保留一行，最后写入者生效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Location {
    pub user_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: DateTime<Utc>,
}
