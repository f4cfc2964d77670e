use chrono::Duration;
use uuid::Uuid;

use circles_shared::errors::{AppError, AppResult, ErrorCode};

use super::{audit, forbid_self_target, load_target, require_admin, AuditEntry, ModerationEngine};
use crate::models::{MemberRole, Membership, MembershipStatus, ModerationActionKind};
use crate::store::CircleStore;

impl<S: CircleStore> ModerationEngine<S> {
    /// Suspends an active member for `days` (policy default when `None`).
    /// Restricting an already restricted member replaces the end date.
    pub fn restrict(
        &self,
        target: Uuid,
        circle_id: Uuid,
        acting_admin: Uuid,
        days: Option<i64>,
        reason: Option<String>,
    ) -> AppResult<Membership> {
        forbid_self_target(target, acting_admin, "restrict")?;
        let days = days.unwrap_or(self.policy.default_restriction_days);
        if !(1..=self.policy.max_restriction_days).contains(&days) {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                format!(
                    "restriction must last between 1 and {} days",
                    self.policy.max_restriction_days
                ),
            ));
        }

        let now = self.now();
        let membership = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let mut membership = load_target(tx, target, now)?;
            match membership.status {
                MembershipStatus::Active | MembershipStatus::Restricted => {}
                other => {
                    return Err(AppError::new(
                        ErrorCode::InvalidMembershipState,
                        format!("cannot restrict a member who is {other}"),
                    ))
                }
            }

            membership.status = MembershipStatus::Restricted;
            membership.role = MemberRole::Member;
            membership.restricted_until = Some(now + Duration::days(days));
            membership.updated_at = now;
            tx.update_membership(&membership)?;
            audit(
                tx,
                acting_admin,
                AuditEntry::user(ModerationActionKind::Restrict, target).with_reason(reason),
                now,
            )?;
            Ok(membership)
        })?;

        tracing::info!(
            circle_id = %circle_id,
            user_id = %target,
            admin = %acting_admin,
            days,
            "member restricted"
        );
        Ok(membership)
    }

    /// Permanent exclusion. Overrides any restriction and any pending request.
    pub fn ban(&self, target: Uuid, circle_id: Uuid, acting_admin: Uuid, reason: Option<String>) -> AppResult<Membership> {
        forbid_self_target(target, acting_admin, "ban")?;

        let now = self.now();
        let membership = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let mut membership = load_target(tx, target, now)?;
            if membership.status == MembershipStatus::Banned {
                return Err(AppError::new(ErrorCode::InvalidMembershipState, "user is already banned"));
            }

            membership.status = MembershipStatus::Banned;
            membership.role = MemberRole::Member;
            membership.restricted_until = None;
            membership.ban_reason = reason.clone();
            membership.updated_at = now;
            tx.update_membership(&membership)?;
            audit(
                tx,
                acting_admin,
                AuditEntry::user(ModerationActionKind::Ban, target).with_reason(reason),
                now,
            )?;
            Ok(membership)
        })?;

        tracing::info!(circle_id = %circle_id, user_id = %target, admin = %acting_admin, "member banned");
        Ok(membership)
    }

    pub fn unban(&self, target: Uuid, circle_id: Uuid, acting_admin: Uuid) -> AppResult<Membership> {
        let now = self.now();
        let membership = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let mut membership = load_target(tx, target, now)?;
            if membership.status != MembershipStatus::Banned {
                return Err(AppError::new(ErrorCode::InvalidMembershipState, "user is not banned"));
            }

            membership.status = MembershipStatus::Active;
            membership.role = MemberRole::Member;
            membership.ban_reason = None;
            membership.updated_at = now;
            tx.update_membership(&membership)?;
            audit(tx, acting_admin, AuditEntry::user(ModerationActionKind::Unban, target), now)?;
            Ok(membership)
        })?;

        tracing::info!(circle_id = %circle_id, user_id = %target, admin = %acting_admin, "member unbanned");
        Ok(membership)
    }

    /// Ends a restriction before its scheduled end.
    pub fn lift_restriction(&self, target: Uuid, circle_id: Uuid, acting_admin: Uuid) -> AppResult<Membership> {
        let now = self.now();
        let membership = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let mut membership = load_target(tx, target, now)?;
            if membership.status != MembershipStatus::Restricted {
                return Err(AppError::new(ErrorCode::InvalidMembershipState, "user is not restricted"));
            }

            membership.status = MembershipStatus::Active;
            membership.restricted_until = None;
            membership.updated_at = now;
            tx.update_membership(&membership)?;
            audit(tx, acting_admin, AuditEntry::user(ModerationActionKind::LiftRestriction, target), now)?;
            Ok(membership)
        })?;

        tracing::info!(circle_id = %circle_id, user_id = %target, admin = %acting_admin, "restriction lifted");
        Ok(membership)
    }

    /// Time-aware check. An expired restriction reads as not restricted even
    /// while the stored record still says otherwise.
    pub fn is_restricted(&self, user_id: Uuid, circle_id: Uuid) -> AppResult<bool> {
        let now = self.now();
        self.store.transaction(circle_id, |tx| {
            Ok(tx.membership_of(user_id)?.map_or(false, |m| m.is_restricted(now)))
        })
    }
}
