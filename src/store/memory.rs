use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{DeleteOutcome, JoinOutcome, LeaveOutcome, Store, StoreResult};
use crate::models::{
    ChatMessage, Group, GroupSummary, JoinedGroup, Location, MemberLocation, MemberView, User,
};

/// 进程内存储：一把锁覆盖全部表，每个方法即一个事务
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    next_group_id: i64,
    next_message_id: i64,
    users: BTreeMap<i64, User>,
    groups: BTreeMap<i64, Group>,
    // (group_id, user_id) -> joined_at
    members: HashMap<(i64, i64), DateTime<Utc>>,
    locations: HashMap<i64, Location>,
    messages: Vec<ChatMessage>,
    push_tokens: HashMap<i64, String>,
}

impl Tables {
    fn remove_group(&mut self, group_id: i64) {
        self.groups.remove(&group_id);
        self.members.retain(|(g, _), _| *g != group_id);
        self.messages.retain(|m| m.group_id != group_id);
    }

    fn members_of(&self, group_id: i64) -> Vec<MemberView> {
        let mut rows: Vec<(DateTime<Utc>, i64)> = self
            .members
            .iter()
            .filter(|((g, _), _)| *g == group_id)
            .map(|((_, u), joined_at)| (*joined_at, *u))
            .collect();
        rows.sort();

        rows.into_iter()
            .filter_map(|(_, user_id)| {
                let user = self.users.get(&user_id)?;
                Some(MemberView {
                    id: user.id,
                    fullname: user.fullname.clone(),
                    location: self.locations.get(&user_id).map(|l| MemberLocation {
                        latitude: l.latitude,
                        longitude: l.longitude,
                    }),
                })
            })
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(
        &self,
        email: &str,
        fullname: &str,
        password_hash: &str,
    ) -> StoreResult<Option<User>> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.email == email) {
            return Ok(None);
        }

        t.next_user_id += 1;
        let user = User {
            id: t.next_user_id,
            email: email.to_string(),
            fullname: fullname.to_string(),
            password_hash: password_hash.to_string(),
        };
        t.users.insert(user.id, user.clone());
        Ok(Some(user))
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_group(
        &self,
        creator_id: i64,
        join_code: &str,
        group_name: &str,
    ) -> StoreResult<Option<Group>> {
        let mut t = self.tables.lock().await;
        if t.groups.values().any(|g| g.join_code == join_code) {
            return Ok(None);
        }

        t.next_group_id += 1;
        let now = Utc::now();
        let group = Group {
            id: t.next_group_id,
            join_code: join_code.to_string(),
            group_name: group_name.to_string(),
            created_by: creator_id,
            created_at: now,
        };
        t.groups.insert(group.id, group.clone());
        t.members.insert((group.id, creator_id), now);
        Ok(Some(group))
    }

    async fn find_group(&self, group_id: i64) -> StoreResult<Option<Group>> {
        Ok(self.tables.lock().await.groups.get(&group_id).cloned())
    }

    async fn join_group(&self, user_id: i64, join_code: &str) -> StoreResult<JoinOutcome> {
        let mut t = self.tables.lock().await;
        let Some(group) = t.groups.values().find(|g| g.join_code == join_code).cloned() else {
            return Ok(JoinOutcome::InvalidCode);
        };

        let previous = t.members.insert((group.id, user_id), Utc::now());
        Ok(match previous {
            None => JoinOutcome::Joined(group),
            Some(_) => JoinOutcome::AlreadyMember(group),
        })
    }

    async fn leave_group(&self, user_id: i64, group_id: i64) -> StoreResult<LeaveOutcome> {
        let mut t = self.tables.lock().await;
        if !t.groups.contains_key(&group_id) {
            return Ok(LeaveOutcome::GroupNotFound);
        }
        if t.members.remove(&(group_id, user_id)).is_none() {
            return Ok(LeaveOutcome::NotAMember);
        }

        let group_deleted = !t.members.keys().any(|(g, _)| *g == group_id);
        if group_deleted {
            t.remove_group(group_id);
        }
        Ok(LeaveOutcome::Left { group_deleted })
    }

    async fn delete_group(&self, user_id: i64, group_id: i64) -> StoreResult<DeleteOutcome> {
        let mut t = self.tables.lock().await;
        let Some(group) = t.groups.get(&group_id) else {
            return Ok(DeleteOutcome::GroupNotFound);
        };
        if group.created_by != user_id {
            return Ok(DeleteOutcome::Forbidden);
        }

        let members_removed = t.members.keys().filter(|(g, _)| *g == group_id).count() as u64;
        t.remove_group(group_id);
        Ok(DeleteOutcome::Deleted { members_removed })
    }

    async fn list_joined(&self, user_id: i64) -> StoreResult<Vec<JoinedGroup>> {
        let t = self.tables.lock().await;
        let mut joined: Vec<(DateTime<Utc>, &Group)> = t
            .members
            .iter()
            .filter(|((_, u), _)| *u == user_id)
            .filter_map(|((g, _), joined_at)| t.groups.get(g).map(|group| (*joined_at, group)))
            .collect();
        joined.sort_by_key(|(joined_at, group)| (*joined_at, group.id));

        Ok(joined
            .into_iter()
            .map(|(_, group)| JoinedGroup {
                id: group.id,
                group_name: group.group_name.clone(),
                join_code: group.join_code.clone(),
                members: t.members_of(group.id),
            })
            .collect())
    }

    async fn list_created(&self, user_id: i64) -> StoreResult<Vec<GroupSummary>> {
        let t = self.tables.lock().await;
        Ok(t.groups
            .values()
            .filter(|g| g.created_by == user_id)
            .cloned()
            .map(GroupSummary::from)
            .collect())
    }

    async fn upsert_location(
        &self,
        user_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> StoreResult<Option<Location>> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&user_id) {
            return Ok(None);
        }

        let location = Location {
            user_id,
            latitude,
            longitude,
            updated_at: Utc::now(),
        };
        t.locations.insert(user_id, location.clone());
        Ok(Some(location))
    }

    async fn insert_message(
        &self,
        group_id: i64,
        user_id: i64,
        content: &str,
    ) -> StoreResult<Option<ChatMessage>> {
        let mut t = self.tables.lock().await;
        if !t.members.contains_key(&(group_id, user_id)) {
            return Ok(None);
        }
        let Some(fullname) = t.users.get(&user_id).map(|u| u.fullname.clone()) else {
            return Ok(None);
        };

        t.next_message_id += 1;
        let message = ChatMessage {
            id: t.next_message_id,
            group_id,
            user_id,
            content: content.to_string(),
            sent_at: Utc::now(),
            fullname,
        };
        t.messages.push(message.clone());
        Ok(Some(message))
    }

    async fn list_messages(&self, group_id: i64) -> StoreResult<Option<Vec<ChatMessage>>> {
        let t = self.tables.lock().await;
        if !t.groups.contains_key(&group_id) {
            return Ok(None);
        }

        let mut messages: Vec<ChatMessage> = t
            .messages
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.sent_at, m.id));
        Ok(Some(messages))
    }

    async fn register_push_token(&self, user_id: i64, token: &str) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&user_id) {
            return Ok(false);
        }
        t.push_tokens.insert(user_id, token.to_string());
        Ok(true)
    }
}
