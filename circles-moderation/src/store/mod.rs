//! Storage for circles and everything scoped to them.
//!
//! All commands run through [`CircleStore::transaction`], which holds an
//! exclusive lock on one circle for the duration of the closure and commits
//! its writes atomically. Invariant checks and the writes they guard always
//! happen inside the same closure.

use uuid::Uuid;

use circles_shared::errors::AppResult;

use crate::models::{
    Circle, Concern, ConcernKind, Membership, MembershipStatus, ModerationAction, Post,
    PostModerationStatus,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A record addressed by id alone, before its owning circle is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRef {
    Membership(Uuid),
    Post(Uuid),
    Concern(Uuid),
}

pub trait CircleStore: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    fn ping(&self) -> AppResult<()>;

    /// Persists a new circle together with its founding membership.
    fn create_circle(&self, circle: &Circle, founder: &Membership) -> AppResult<()>;

    /// Which circle owns `record`, if it still exists.
    fn locate(&self, record: RecordRef) -> AppResult<Option<Uuid>>;

    /// Runs `f` with exclusive access to one circle. Writes made through the
    /// transaction are committed only if `f` returns `Ok`.
    fn transaction<T, F>(&self, circle_id: Uuid, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut dyn CircleTx) -> AppResult<T>;
}

/// Reads and writes scoped to the locked circle.
pub trait CircleTx {
    fn circle(&self) -> &Circle;

    // memberships
    fn membership(&mut self, id: Uuid) -> AppResult<Option<Membership>>;
    fn membership_of(&mut self, user_id: Uuid) -> AppResult<Option<Membership>>;
    fn memberships(&mut self) -> AppResult<Vec<Membership>>;
    fn count_memberships(&mut self, status: MembershipStatus) -> AppResult<i64>;
    fn count_active_admins(&mut self) -> AppResult<i64>;
    fn insert_membership(&mut self, membership: &Membership) -> AppResult<()>;
    fn update_membership(&mut self, membership: &Membership) -> AppResult<()>;
    fn delete_membership(&mut self, id: Uuid) -> AppResult<()>;

    // posts
    fn post(&mut self, id: Uuid) -> AppResult<Option<Post>>;
    fn posts(&mut self, status: PostModerationStatus, offset: i64, limit: i64) -> AppResult<Vec<Post>>;
    fn count_posts(&mut self, status: PostModerationStatus) -> AppResult<i64>;
    fn insert_post(&mut self, post: &Post) -> AppResult<()>;
    fn update_post(&mut self, post: &Post) -> AppResult<()>;
    fn delete_post(&mut self, id: Uuid) -> AppResult<()>;

    // flags and reports
    fn concern(&mut self, id: Uuid) -> AppResult<Option<Concern>>;
    fn concerns_for_post(&mut self, post_id: Uuid) -> AppResult<Vec<Concern>>;
    fn open_concerns(&mut self, kind: ConcernKind, limit: i64) -> AppResult<Vec<Concern>>;
    fn count_open_concerns(&mut self, kind: ConcernKind) -> AppResult<i64>;
    fn insert_concern(&mut self, concern: &Concern) -> AppResult<()>;
    fn update_concern(&mut self, concern: &Concern) -> AppResult<()>;

    // audit trail
    fn record_action(&mut self, action: &ModerationAction) -> AppResult<()>;
    fn actions(&mut self, offset: i64, limit: i64) -> AppResult<Vec<ModerationAction>>;
    fn count_actions(&mut self) -> AppResult<i64>;
}
