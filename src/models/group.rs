use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: i64,
    pub join_code: String,
    pub group_name: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// `GET /groups/created` 的列表项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GroupSummary {
    pub id: i64,
    pub join_code: String,
    pub group_name: String,
}

impl From<Group> for GroupSummary {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            join_code: group.join_code,
            group_name: group.group_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemberLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// 成员及其最后已知位置，从未上报过位置时为 `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberView {
    pub id: i64,
    pub fullname: String,
    pub location: Option<MemberLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedGroup {
    pub id: i64,
    pub group_name: String,
    pub join_code: String,
    pub members: Vec<MemberView>,
}
