use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use uuid::Uuid;

use circles_shared::errors::{AppError, AppResult, ErrorCode};

use super::{CircleStore, CircleTx, RecordRef};
use crate::models::{
    Circle, Concern, ConcernKind, MemberRole, Membership, MembershipStatus, ModerationAction, Post,
    PostModerationStatus,
};

#[derive(Debug, Clone)]
struct CircleState {
    circle: Circle,
    memberships: Vec<Membership>,
    posts: Vec<Post>,
    concerns: Vec<Concern>,
    actions: Vec<ModerationAction>,
}

/// In-process store. Each circle sits behind its own mutex; a transaction
/// works on a copy of the circle's state and swaps it in on success, so a
/// failed command leaves nothing behind.
#[derive(Default)]
pub struct MemoryStore {
    circles: RwLock<HashMap<Uuid, Arc<Mutex<CircleState>>>>,
    /// record id -> owning circle id
    records: RwLock<HashMap<Uuid, Uuid>>,
}

fn poisoned<T>(_: T) -> AppError {
    AppError::internal("memory store lock poisoned")
}

impl CircleStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn ping(&self) -> AppResult<()> {
        drop(self.circles.read().map_err(poisoned)?);
        Ok(())
    }

    fn create_circle(&self, circle: &Circle, founder: &Membership) -> AppResult<()> {
        let state = CircleState {
            circle: circle.clone(),
            memberships: vec![founder.clone()],
            posts: Vec::new(),
            concerns: Vec::new(),
            actions: Vec::new(),
        };

        let mut circles = self.circles.write().map_err(poisoned)?;
        if circles.contains_key(&circle.id) {
            return Err(AppError::internal(format!("circle {} already exists", circle.id)));
        }
        circles.insert(circle.id, Arc::new(Mutex::new(state)));
        self.records.write().map_err(poisoned)?.insert(founder.id, circle.id);
        Ok(())
    }

    fn locate(&self, record: RecordRef) -> AppResult<Option<Uuid>> {
        let id = match record {
            RecordRef::Membership(id) | RecordRef::Post(id) | RecordRef::Concern(id) => id,
        };
        Ok(self.records.read().map_err(poisoned)?.get(&id).copied())
    }

    fn transaction<T, F>(&self, circle_id: Uuid, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut dyn CircleTx) -> AppResult<T>,
    {
        let slot = self
            .circles
            .read()
            .map_err(poisoned)?
            .get(&circle_id)
            .cloned()
            .ok_or_else(|| AppError::new(ErrorCode::CircleNotFound, "circle not found"))?;

        let mut guard = slot.lock().map_err(poisoned)?;
        let mut tx = MemoryTx {
            state: guard.clone(),
            inserted: Vec::new(),
            deleted: Vec::new(),
        };

        let value = f(&mut tx)?;

        let MemoryTx { state, inserted, deleted } = tx;
        *guard = state;
        let mut records = self.records.write().map_err(poisoned)?;
        for id in inserted {
            records.insert(id, circle_id);
        }
        for id in deleted {
            records.remove(&id);
        }
        Ok(value)
    }
}

struct MemoryTx {
    state: CircleState,
    inserted: Vec<Uuid>,
    deleted: Vec<Uuid>,
}

fn missing(what: &str, id: Uuid) -> AppError {
    AppError::internal(format!("{what} {id} vanished inside its transaction"))
}

fn window<T: Clone>(items: impl Iterator<Item = T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

impl CircleTx for MemoryTx {
    fn circle(&self) -> &Circle {
        &self.state.circle
    }

    fn membership(&mut self, id: Uuid) -> AppResult<Option<Membership>> {
        Ok(self.state.memberships.iter().find(|m| m.id == id).cloned())
    }

    fn membership_of(&mut self, user_id: Uuid) -> AppResult<Option<Membership>> {
        Ok(self.state.memberships.iter().find(|m| m.user_id == user_id).cloned())
    }

    fn memberships(&mut self) -> AppResult<Vec<Membership>> {
        let mut all = self.state.memberships.clone();
        all.sort_by_key(|m| m.joined_at);
        Ok(all)
    }

    fn count_memberships(&mut self, status: MembershipStatus) -> AppResult<i64> {
        Ok(self.state.memberships.iter().filter(|m| m.status == status).count() as i64)
    }

    fn count_active_admins(&mut self) -> AppResult<i64> {
        Ok(self
            .state
            .memberships
            .iter()
            .filter(|m| m.role == MemberRole::Admin && m.status == MembershipStatus::Active)
            .count() as i64)
    }

    fn insert_membership(&mut self, membership: &Membership) -> AppResult<()> {
        if self.state.memberships.iter().any(|m| m.user_id == membership.user_id) {
            return Err(AppError::internal("duplicate (circle, user) membership"));
        }
        self.state.memberships.push(membership.clone());
        self.inserted.push(membership.id);
        Ok(())
    }

    fn update_membership(&mut self, membership: &Membership) -> AppResult<()> {
        let slot = self
            .state
            .memberships
            .iter_mut()
            .find(|m| m.id == membership.id)
            .ok_or_else(|| missing("membership", membership.id))?;
        *slot = membership.clone();
        Ok(())
    }

    fn delete_membership(&mut self, id: Uuid) -> AppResult<()> {
        let before = self.state.memberships.len();
        self.state.memberships.retain(|m| m.id != id);
        if self.state.memberships.len() == before {
            return Err(missing("membership", id));
        }
        self.deleted.push(id);
        Ok(())
    }

    fn post(&mut self, id: Uuid) -> AppResult<Option<Post>> {
        Ok(self.state.posts.iter().find(|p| p.id == id).cloned())
    }

    fn posts(&mut self, status: PostModerationStatus, offset: i64, limit: i64) -> AppResult<Vec<Post>> {
        let mut matching: Vec<&Post> = self
            .state
            .posts
            .iter()
            .filter(|p| p.moderation_status == status)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(window(matching.into_iter().cloned(), offset, limit))
    }

    fn count_posts(&mut self, status: PostModerationStatus) -> AppResult<i64> {
        Ok(self.state.posts.iter().filter(|p| p.moderation_status == status).count() as i64)
    }

    fn insert_post(&mut self, post: &Post) -> AppResult<()> {
        self.state.posts.push(post.clone());
        self.inserted.push(post.id);
        Ok(())
    }

    fn update_post(&mut self, post: &Post) -> AppResult<()> {
        let slot = self
            .state
            .posts
            .iter_mut()
            .find(|p| p.id == post.id)
            .ok_or_else(|| missing("post", post.id))?;
        *slot = post.clone();
        Ok(())
    }

    fn delete_post(&mut self, id: Uuid) -> AppResult<()> {
        let before = self.state.posts.len();
        self.state.posts.retain(|p| p.id != id);
        if self.state.posts.len() == before {
            return Err(missing("post", id));
        }
        self.deleted.push(id);
        Ok(())
    }

    fn concern(&mut self, id: Uuid) -> AppResult<Option<Concern>> {
        Ok(self.state.concerns.iter().find(|c| c.id == id).cloned())
    }

    fn concerns_for_post(&mut self, post_id: Uuid) -> AppResult<Vec<Concern>> {
        Ok(self
            .state
            .concerns
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect())
    }

    fn open_concerns(&mut self, kind: ConcernKind, limit: i64) -> AppResult<Vec<Concern>> {
        let open = self
            .state
            .concerns
            .iter()
            .filter(|c| c.kind == kind && c.is_open())
            .cloned();
        Ok(window(open, 0, limit))
    }

    fn count_open_concerns(&mut self, kind: ConcernKind) -> AppResult<i64> {
        Ok(self
            .state
            .concerns
            .iter()
            .filter(|c| c.kind == kind && c.is_open())
            .count() as i64)
    }

    fn insert_concern(&mut self, concern: &Concern) -> AppResult<()> {
        self.state.concerns.push(concern.clone());
        self.inserted.push(concern.id);
        Ok(())
    }

    fn update_concern(&mut self, concern: &Concern) -> AppResult<()> {
        let slot = self
            .state
            .concerns
            .iter_mut()
            .find(|c| c.id == concern.id)
            .ok_or_else(|| missing("concern", concern.id))?;
        *slot = concern.clone();
        Ok(())
    }

    fn record_action(&mut self, action: &ModerationAction) -> AppResult<()> {
        self.state.actions.push(action.clone());
        Ok(())
    }

    fn actions(&mut self, offset: i64, limit: i64) -> AppResult<Vec<ModerationAction>> {
        Ok(window(self.state.actions.iter().rev().cloned(), offset, limit))
    }

    fn count_actions(&mut self) -> AppResult<i64> {
        Ok(self.state.actions.len() as i64)
    }
}
