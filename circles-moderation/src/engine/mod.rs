//! The membership and moderation engine.
//!
//! One method per console command. Each method resolves the circle that owns
//! its target, then performs every check and every write inside a single
//! [`CircleStore::transaction`]. The split across files follows the engine's
//! parts: membership records, admin roles, sanctions, the content pipeline,
//! and the read-only dashboard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use circles_shared::errors::{AppError, AppResult, ErrorCode};

use crate::clock::Clock;
use crate::models::{Membership, MembershipStatus, ModerationAction, ModerationActionKind};
use crate::store::{CircleStore, CircleTx};

mod dashboard;
mod membership;
mod pipeline;
mod roles;
mod sanctions;

pub use dashboard::{DashboardCounts, ManagementSnapshot};
pub use membership::NewCircle;
pub use pipeline::{ConcernOutcome, RemovedPost};

/// Maximum number of active admins a circle may have at any instant.
pub const MAX_ACTIVE_ADMINS: i64 = 3;

#[derive(Debug, Clone)]
pub struct ModerationPolicy {
    pub default_restriction_days: i64,
    pub max_restriction_days: i64,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            default_restriction_days: 7,
            max_restriction_days: 365,
        }
    }
}

pub struct ModerationEngine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    policy: ModerationPolicy,
}

impl<S: CircleStore> ModerationEngine<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, policy: ModerationPolicy) -> Self {
        Self { store, clock, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &ModerationPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Finds the circle owning `record`, or fails with `missing` when the
    /// record no longer exists.
    fn owning_circle(&self, record: crate::store::RecordRef, missing: AppError) -> AppResult<Uuid> {
        self.store.locate(record)?.ok_or(missing)
    }
}

/// Loads the acting user's membership and fails unless it is an active admin.
fn require_admin(tx: &mut dyn CircleTx, user_id: Uuid, now: DateTime<Utc>) -> AppResult<Membership> {
    match tx.membership_of(user_id)? {
        Some(m) if m.is_active_admin(now) => Ok(m),
        _ => Err(AppError::new(
            ErrorCode::NotCircleAdmin,
            "you must be an active admin of this circle",
        )),
    }
}

/// Loads the user's membership and fails unless it is active at `now`.
fn require_active_member(tx: &mut dyn CircleTx, user_id: Uuid, now: DateTime<Utc>) -> AppResult<Membership> {
    let membership = tx.membership_of(user_id)?.ok_or_else(|| {
        AppError::new(ErrorCode::NotCircleMember, "you are not a member of this circle")
    })?;

    match membership.effective_status(now) {
        MembershipStatus::Active => Ok(membership),
        MembershipStatus::PendingRequest => Err(AppError::new(
            ErrorCode::NotCircleMember,
            "your request to join this circle is still pending",
        )),
        MembershipStatus::Restricted => Err(AppError::new(
            ErrorCode::MemberRestricted,
            match membership.restricted_until {
                Some(until) => format!("you are restricted in this circle until {}", until.to_rfc3339()),
                None => "you are restricted in this circle".to_string(),
            },
        )),
        MembershipStatus::Banned => Err(AppError::new(
            ErrorCode::MemberBanned,
            "you are banned from this circle",
        )),
    }
}

/// Loads the target user's membership, applying any lazy status rewrite.
fn load_target(tx: &mut dyn CircleTx, user_id: Uuid, now: DateTime<Utc>) -> AppResult<Membership> {
    let mut membership = tx.membership_of(user_id)?.ok_or_else(|| {
        AppError::new(ErrorCode::MembershipNotFound, "user is not a member of this circle")
    })?;
    membership.materialize(now);
    Ok(membership)
}

fn forbid_self_target(target: Uuid, acting: Uuid, verb: &str) -> AppResult<()> {
    if target == acting {
        return Err(AppError::new(
            ErrorCode::SelfTargetForbidden,
            format!("you cannot {verb} yourself"),
        ));
    }
    Ok(())
}

struct AuditEntry {
    action: ModerationActionKind,
    target_user_id: Option<Uuid>,
    target_post_id: Option<Uuid>,
    reason: Option<String>,
}

impl AuditEntry {
    fn user(action: ModerationActionKind, user_id: Uuid) -> Self {
        Self {
            action,
            target_user_id: Some(user_id),
            target_post_id: None,
            reason: None,
        }
    }

    fn post(action: ModerationActionKind, author_id: Uuid, post_id: Uuid) -> Self {
        Self {
            action,
            target_user_id: Some(author_id),
            target_post_id: Some(post_id),
            reason: None,
        }
    }

    fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

fn audit(tx: &mut dyn CircleTx, admin_id: Uuid, entry: AuditEntry, now: DateTime<Utc>) -> AppResult<()> {
    let action = ModerationAction {
        id: Uuid::now_v7(),
        circle_id: tx.circle().id,
        admin_id,
        action: entry.action,
        target_user_id: entry.target_user_id,
        target_post_id: entry.target_post_id,
        reason: entry.reason,
        created_at: now,
    };
    tx.record_action(&action)
}
