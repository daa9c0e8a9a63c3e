use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use super::{DeleteOutcome, JoinOutcome, LeaveOutcome, Store, StoreResult};
use crate::models::{
    ChatMessage, Group, GroupSummary, JoinedGroup, Location, MemberLocation, MemberView, User,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[derive(Debug, FromRow)]
struct MemberRow {
    group_id: i64,
    id: i64,
    fullname: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

const GROUP_COLUMNS: &str = "id, join_code, group_name, created_by, created_at";

#[async_trait]
impl Store for PgStore {
    async fn create_user(
        &self,
        email: &str,
        fullname: &str,
        password_hash: &str,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, fullname, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, fullname, password_hash
            "#,
        )
        .bind(email)
        .bind(fullname)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, fullname, password_hash FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, fullname, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_group(
        &self,
        creator_id: i64,
        join_code: &str,
        group_name: &str,
    ) -> StoreResult<Option<Group>> {
        let mut tx = self.pool.begin().await?;

        // 唯一约束兜底：并发创建同一加入码时只有一个成功
        let group = sqlx::query_as::<_, Group>(&format!(
            r#"
            INSERT INTO groups (join_code, group_name, created_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (join_code) DO NOTHING
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(join_code)
        .bind(group_name)
        .bind(creator_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(group) = group else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES ($1, $2)")
            .bind(group.id)
            .bind(creator_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(group))
    }

    async fn find_group(&self, group_id: i64) -> StoreResult<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1"
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn join_group(&self, user_id: i64, join_code: &str) -> StoreResult<JoinOutcome> {
        let mut tx = self.pool.begin().await?;

        // FOR SHARE 阻止并发删除，直到本事务提交
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE join_code = $1 FOR SHARE"
        ))
        .bind(join_code)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(group) = group else {
            tx.rollback().await?;
            return Ok(JoinOutcome::InvalidCode);
        };

        // xmax = 0 表示本次为新插入的行
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO group_members (group_id, user_id, joined_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (group_id, user_id) DO UPDATE SET joined_at = NOW()
            RETURNING (xmax = 0)
            "#,
        )
        .bind(group.id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(if inserted {
            JoinOutcome::Joined(group)
        } else {
            JoinOutcome::AlreadyMember(group)
        })
    }

    async fn leave_group(&self, user_id: i64, group_id: i64) -> StoreResult<LeaveOutcome> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM groups WHERE id = $1 FOR UPDATE")
                .bind(group_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            tx.rollback().await?;
            return Ok(LeaveOutcome::GroupNotFound);
        }

        let removed = sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            tx.rollback().await?;
            return Ok(LeaveOutcome::NotAMember);
        }

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM group_members WHERE group_id = $1")
                .bind(group_id)
                .fetch_one(&mut *tx)
                .await?;

        let group_deleted = remaining == 0;
        if group_deleted {
            sqlx::query("DELETE FROM groups WHERE id = $1")
                .bind(group_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(LeaveOutcome::Left { group_deleted })
    }

    async fn delete_group(&self, user_id: i64, group_id: i64) -> StoreResult<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;

        let created_by: Option<i64> =
            sqlx::query_scalar("SELECT created_by FROM groups WHERE id = $1 FOR UPDATE")
                .bind(group_id)
                .fetch_optional(&mut *tx)
                .await?;

        match created_by {
            None => {
                tx.rollback().await?;
                return Ok(DeleteOutcome::GroupNotFound);
            }
            Some(creator) if creator != user_id => {
                tx.rollback().await?;
                return Ok(DeleteOutcome::Forbidden);
            }
            Some(_) => {}
        }

        let members_removed = sqlx::query("DELETE FROM group_members WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DeleteOutcome::Deleted { members_removed })
    }

    async fn list_joined(&self, user_id: i64) -> StoreResult<Vec<JoinedGroup>> {
        let groups = sqlx::query_as::<_, GroupSummary>(
            r#"
            SELECT g.id, g.join_code, g.group_name
            FROM groups g
            JOIN group_members gm ON g.id = gm.group_id
            WHERE gm.user_id = $1
            ORDER BY gm.joined_at, g.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let group_ids: Vec<i64> = groups.iter().map(|g| g.id).collect();
        // LEFT JOIN：从未上报位置的成员也要返回
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT gm.group_id, u.id, u.fullname, l.latitude, l.longitude
            FROM group_members gm
            JOIN users u ON gm.user_id = u.id
            LEFT JOIN locations l ON u.id = l.user_id
            WHERE gm.group_id = ANY($1)
            ORDER BY gm.group_id, gm.joined_at, u.id
            "#,
        )
        .bind(&group_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut members: HashMap<i64, Vec<MemberView>> = HashMap::new();
        for row in rows {
            let location = match (row.latitude, row.longitude) {
                (Some(latitude), Some(longitude)) => Some(MemberLocation {
                    latitude,
                    longitude,
                }),
                _ => None,
            };
            members.entry(row.group_id).or_default().push(MemberView {
                id: row.id,
                fullname: row.fullname,
                location,
            });
        }

        Ok(groups
            .into_iter()
            .map(|g| JoinedGroup {
                members: members.remove(&g.id).unwrap_or_default(),
                id: g.id,
                group_name: g.group_name,
                join_code: g.join_code,
            })
            .collect())
    }

    async fn list_created(&self, user_id: i64) -> StoreResult<Vec<GroupSummary>> {
        let groups = sqlx::query_as::<_, GroupSummary>(
            "SELECT id, join_code, group_name FROM groups WHERE created_by = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    async fn upsert_location(
        &self,
        user_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> StoreResult<Option<Location>> {
        let location = sqlx::query_as::<_, Location>(
            r#"
            INSERT INTO locations (user_id, latitude, longitude, updated_at)
            SELECT $1::BIGINT, $2::DOUBLE PRECISION, $3::DOUBLE PRECISION, NOW()
            WHERE EXISTS (SELECT 1 FROM users WHERE id = $1)
            ON CONFLICT (user_id) DO UPDATE
                SET latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    updated_at = NOW()
            RETURNING user_id, latitude, longitude, updated_at
            "#,
        )
        .bind(user_id)
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(&self.pool)
        .await?;

        Ok(location)
    }

    async fn insert_message(
        &self,
        group_id: i64,
        user_id: i64,
        content: &str,
    ) -> StoreResult<Option<ChatMessage>> {
        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            WITH inserted AS (
                INSERT INTO messages (group_id, user_id, content)
                SELECT $1::BIGINT, $2::BIGINT, $3::TEXT
                WHERE EXISTS (
                    SELECT 1 FROM group_members
                    WHERE group_id = $1 AND user_id = $2
                )
                RETURNING id, group_id, user_id, content, sent_at
            )
            SELECT i.id, i.group_id, i.user_id, i.content, i.sent_at, u.fullname
            FROM inserted i
            JOIN users u ON i.user_id = u.id
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn list_messages(&self, group_id: i64) -> StoreResult<Option<Vec<ChatMessage>>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM groups WHERE id = $1)")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Ok(None);
        }

        let messages = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT m.id, m.group_id, m.user_id, m.content, m.sent_at, u.fullname
            FROM messages m
            JOIN users u ON m.user_id = u.id
            WHERE m.group_id = $1
            ORDER BY m.sent_at ASC, m.id ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(messages))
    }

    async fn register_push_token(&self, user_id: i64, token: &str) -> StoreResult<bool> {
        let affected = sqlx::query(
            r#"
            INSERT INTO fcm_tokens (user_id, token, updated_at)
            SELECT $1::BIGINT, $2::TEXT, NOW()
            WHERE EXISTS (SELECT 1 FROM users WHERE id = $1)
            ON CONFLICT (user_id) DO UPDATE
                SET token = EXCLUDED.token,
                    updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }
}
