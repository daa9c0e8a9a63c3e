use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Group, GroupSummary, JoinedGroup};
use crate::store::{DeleteOutcome, JoinOutcome, LeaveOutcome, Store, StoreError};
use crate::utils::generate_join_code;

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Join code already in use")]
    CodeCollision,
    #[error("Invalid join code")]
    InvalidCode,
    #[error("Already a member of this group")]
    AlreadyMember,
    #[error("Group not found")]
    NotFound,
    #[error("You are not a member of this group")]
    NotAMember,
    #[error("Only the group creator can delete the group")]
    Forbidden,
    #[error("User not found")]
    UserNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MembershipError> for AppError {
    fn from(e: MembershipError) -> Self {
        let message = e.to_string();
        match e {
            MembershipError::CodeCollision | MembershipError::AlreadyMember => {
                AppError::Conflict(message)
            }
            MembershipError::InvalidCode
            | MembershipError::NotFound
            | MembershipError::UserNotFound => AppError::NotFound(message),
            MembershipError::NotAMember => AppError::Validation(message),
            MembershipError::Forbidden => AppError::Forbidden(message),
            MembershipError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub user_id: Option<i64>,
    /// 缺省时由服务端生成
    pub join_code: Option<String>,
    pub group_name: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupRequest {
    pub user_id: Option<i64>,
    pub join_code: Option<String>,
}

/// `DELETE /groups/delete` 与 `DELETE /groups/leave` 共用
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub user_id: Option<i64>,
    pub group_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupResponse {
    pub message: String,
    pub group_id: i64,
    pub join_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupResponse {
    pub message: String,
    pub group_id: i64,
    pub group_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveGroupResponse {
    pub message: String,
    /// 最后一名成员退出时群组被一并删除
    pub group_deleted: bool,
}

impl Group {
    /// 创建群组，创建者自动成为第一个成员。加入码冲突直接报错，不在内部重试
    pub async fn create(
        store: &dyn Store,
        creator_id: i64,
        group_name: &str,
        join_code: Option<String>,
    ) -> Result<Self, MembershipError> {
        if store.find_user(creator_id).await?.is_none() {
            return Err(MembershipError::UserNotFound);
        }

        let join_code = join_code.unwrap_or_else(generate_join_code);
        match store.create_group(creator_id, &join_code, group_name).await? {
            Some(group) => {
                tracing::info!(group_id = group.id, creator_id, "group created");
                Ok(group)
            }
            None => {
                tracing::warn!(creator_id, "join code collision");
                Err(MembershipError::CodeCollision)
            }
        }
    }

    pub async fn join(
        store: &dyn Store,
        user_id: i64,
        join_code: &str,
    ) -> Result<Self, MembershipError> {
        if store.find_user(user_id).await?.is_none() {
            return Err(MembershipError::UserNotFound);
        }

        match store.join_group(user_id, join_code).await? {
            JoinOutcome::Joined(group) => {
                tracing::info!(group_id = group.id, user_id, "member joined");
                Ok(group)
            }
            JoinOutcome::AlreadyMember(_) => Err(MembershipError::AlreadyMember),
            JoinOutcome::InvalidCode => Err(MembershipError::InvalidCode),
        }
    }

    /// 返回群组是否因为变空而被删除
    pub async fn leave(
        store: &dyn Store,
        user_id: i64,
        group_id: i64,
    ) -> Result<bool, MembershipError> {
        match store.leave_group(user_id, group_id).await? {
            LeaveOutcome::Left { group_deleted } => {
                tracing::info!(group_id, user_id, group_deleted, "member left");
                Ok(group_deleted)
            }
            LeaveOutcome::GroupNotFound => Err(MembershipError::NotFound),
            LeaveOutcome::NotAMember => Err(MembershipError::NotAMember),
        }
    }

    pub async fn delete(
        store: &dyn Store,
        user_id: i64,
        group_id: i64,
    ) -> Result<(), MembershipError> {
        match store.delete_group(user_id, group_id).await? {
            DeleteOutcome::Deleted { members_removed } => {
                tracing::info!(group_id, user_id, members_removed, "group deleted");
                Ok(())
            }
            DeleteOutcome::GroupNotFound => Err(MembershipError::NotFound),
            DeleteOutcome::Forbidden => Err(MembershipError::Forbidden),
        }
    }

    pub async fn list_joined(
        store: &dyn Store,
        user_id: i64,
    ) -> Result<Vec<JoinedGroup>, MembershipError> {
        Ok(store.list_joined(user_id).await?)
    }

    pub async fn list_created(
        store: &dyn Store,
        user_id: i64,
    ) -> Result<Vec<GroupSummary>, MembershipError> {
        Ok(store.list_created(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn users(store: &MemoryStore) -> (i64, i64) {
        let a = store.create_user("a@x.io", "A", "h").await.unwrap().unwrap();
        let b = store.create_user("b@x.io", "B", "h").await.unwrap().unwrap();
        (a.id, b.id)
    }

    #[tokio::test]
    async fn creator_becomes_member_and_code_is_six_digits() {
        let store = MemoryStore::new();
        let (a, _) = users(&store).await;
        let group = Group::create(&store, a, "Trip", None).await.unwrap();
        assert!(crate::utils::is_valid_join_code(&group.join_code));

        let joined = Group::list_joined(&store, a).await.unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].members[0].id, a);
    }

    #[tokio::test]
    async fn colliding_code_is_rejected() {
        let store = MemoryStore::new();
        let (a, b) = users(&store).await;
        Group::create(&store, a, "One", Some("111111".into())).await.unwrap();
        let err = Group::create(&store, b, "Two", Some("111111".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::CodeCollision));
        assert_eq!(Group::list_created(&store, b).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn join_errors() {
        let store = MemoryStore::new();
        let (a, b) = users(&store).await;
        let group = Group::create(&store, a, "Trip", None).await.unwrap();

        assert!(matches!(
            Group::join(&store, b, "000000").await,
            Err(MembershipError::InvalidCode)
        ));
        Group::join(&store, b, &group.join_code).await.unwrap();
        assert!(matches!(
            Group::join(&store, b, &group.join_code).await,
            Err(MembershipError::AlreadyMember)
        ));
        assert!(matches!(
            Group::join(&store, 999, &group.join_code).await,
            Err(MembershipError::UserNotFound)
        ));

        let members = &Group::list_joined(&store, a).await.unwrap()[0].members;
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn leave_reaps_empty_group() {
        let store = MemoryStore::new();
        let (a, b) = users(&store).await;
        let group = Group::create(&store, a, "Trip", None).await.unwrap();
        Group::join(&store, b, &group.join_code).await.unwrap();

        assert!(!Group::leave(&store, a, group.id).await.unwrap());
        assert!(matches!(
            Group::leave(&store, a, group.id).await,
            Err(MembershipError::NotAMember)
        ));
        assert!(Group::leave(&store, b, group.id).await.unwrap());
        assert!(matches!(
            Group::leave(&store, b, group.id).await,
            Err(MembershipError::NotFound)
        ));
    }

    #[tokio::test]
    async fn only_creator_deletes() {
        let store = MemoryStore::new();
        let (a, b) = users(&store).await;
        let group = Group::create(&store, a, "Trip", None).await.unwrap();
        Group::join(&store, b, &group.join_code).await.unwrap();

        assert!(matches!(
            Group::delete(&store, b, group.id).await,
            Err(MembershipError::Forbidden)
        ));
        Group::delete(&store, a, group.id).await.unwrap();
        assert!(Group::list_joined(&store, a).await.unwrap().is_empty());
        assert!(Group::list_joined(&store, b).await.unwrap().is_empty());
        assert!(matches!(
            Group::delete(&store, a, group.id).await,
            Err(MembershipError::NotFound)
        ));
    }

    #[test]
    fn errors_map_to_statuses() {
        use axum::http::StatusCode;
        let status = |e: MembershipError| AppError::from(e).status();
        assert_eq!(status(MembershipError::CodeCollision), StatusCode::CONFLICT);
        assert_eq!(status(MembershipError::InvalidCode), StatusCode::NOT_FOUND);
        assert_eq!(status(MembershipError::NotAMember), StatusCode::BAD_REQUEST);
        assert_eq!(status(MembershipError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            status(MembershipError::Store(StoreError::Busy)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
