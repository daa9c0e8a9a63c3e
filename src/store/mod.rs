// 存储层
// 所有"先检查再修改"的多语句操作都在实现内部的同一事务中完成

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::models::{ChatMessage, Group, GroupSummary, JoinedGroup, Location, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 连接池等待超时
    #[error("connection pool exhausted")]
    Busy,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => StoreError::Busy,
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Joined(Group),
    /// 成员关系已存在，`joined_at` 已刷新
    AlreadyMember(Group),
    InvalidCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left { group_deleted: bool },
    GroupNotFound,
    NotAMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { members_removed: u64 },
    GroupNotFound,
    Forbidden,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// 邮箱已被注册时返回 `None`
    async fn create_user(
        &self,
        email: &str,
        fullname: &str,
        password_hash: &str,
    ) -> StoreResult<Option<User>>;

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// 插入群组并把创建者加入成员；加入码冲突时返回 `None`
    async fn create_group(
        &self,
        creator_id: i64,
        join_code: &str,
        group_name: &str,
    ) -> StoreResult<Option<Group>>;

    async fn find_group(&self, group_id: i64) -> StoreResult<Option<Group>>;

    async fn join_group(&self, user_id: i64, join_code: &str) -> StoreResult<JoinOutcome>;

    /// 移除成员；群组因此变空时在同一事务内删除群组
    async fn leave_group(&self, user_id: i64, group_id: i64) -> StoreResult<LeaveOutcome>;

    async fn delete_group(&self, user_id: i64, group_id: i64) -> StoreResult<DeleteOutcome>;

    async fn list_joined(&self, user_id: i64) -> StoreResult<Vec<JoinedGroup>>;

    async fn list_created(&self, user_id: i64) -> StoreResult<Vec<GroupSummary>>;

    /// 用户不存在时返回 `None`
    async fn upsert_location(
        &self,
        user_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> StoreResult<Option<Location>>;

    /// 发送者不是该群成员（或群组不存在）时返回 `None`
    async fn insert_message(
        &self,
        group_id: i64,
        user_id: i64,
        content: &str,
    ) -> StoreResult<Option<ChatMessage>>;

    /// 按 `sent_at` 升序；群组不存在时返回 `None`
    async fn list_messages(&self, group_id: i64) -> StoreResult<Option<Vec<ChatMessage>>>;

    /// 用户不存在时返回 `false`
    async fn register_push_token(&self, user_id: i64, token: &str) -> StoreResult<bool>;
}
