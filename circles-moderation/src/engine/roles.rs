use uuid::Uuid;

use circles_shared::errors::{AppError, AppResult, ErrorCode};

use super::{audit, load_target, require_admin, AuditEntry, ModerationEngine, MAX_ACTIVE_ADMINS};
use crate::models::{MemberRole, Membership, MembershipStatus, ModerationActionKind};
use crate::store::CircleStore;

impl<S: CircleStore> ModerationEngine<S> {
    /// Grants the admin role. The cap is counted inside the same locked
    /// transaction as the write.
    pub fn promote(&self, target: Uuid, circle_id: Uuid, acting_admin: Uuid) -> AppResult<Membership> {
        let now = self.now();
        let membership = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let mut membership = load_target(tx, target, now)?;

            if membership.status != MembershipStatus::Active {
                return Err(AppError::new(
                    ErrorCode::InvalidMembershipState,
                    format!("only active members can be promoted (member is {})", membership.status),
                ));
            }
            if membership.role == MemberRole::Admin {
                return Err(AppError::new(ErrorCode::InvalidMembershipState, "user is already an admin"));
            }
            if tx.count_active_admins()? >= MAX_ACTIVE_ADMINS {
                return Err(AppError::new(
                    ErrorCode::AdminCapExceeded,
                    format!("a circle can have at most {MAX_ACTIVE_ADMINS} admins"),
                ));
            }

            membership.role = MemberRole::Admin;
            membership.updated_at = now;
            tx.update_membership(&membership)?;
            audit(tx, acting_admin, AuditEntry::user(ModerationActionKind::PromoteAdmin, target), now)?;
            Ok(membership)
        })?;

        tracing::info!(circle_id = %circle_id, user_id = %target, admin = %acting_admin, "admin promoted");
        Ok(membership)
    }

    /// Drops the admin role. A circle may be left with no admins.
    pub fn demote(&self, target: Uuid, circle_id: Uuid, acting_admin: Uuid) -> AppResult<Membership> {
        let now = self.now();
        let membership = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let mut membership = load_target(tx, target, now)?;
            if membership.role != MemberRole::Admin {
                return Err(AppError::new(ErrorCode::InvalidMembershipState, "user is not an admin"));
            }

            membership.role = MemberRole::Member;
            membership.updated_at = now;
            tx.update_membership(&membership)?;
            audit(tx, acting_admin, AuditEntry::user(ModerationActionKind::DemoteAdmin, target), now)?;
            Ok(membership)
        })?;

        tracing::info!(circle_id = %circle_id, user_id = %target, admin = %acting_admin, "admin demoted");
        Ok(membership)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use super::super::testing::{code, Fixture};
    use super::*;

    #[test]
    fn promote_sets_role_and_respects_cap() {
        let fx = Fixture::private();
        let second = fx.admin();
        let third = fx.admin();
        assert_eq!(fx.active_admins(), 3);
        assert!(fx.membership(second).unwrap().is_active_admin(fx.engine.now()));
        assert!(fx.membership(third).unwrap().is_active_admin(fx.engine.now()));

        let fourth = fx.member();
        let err = fx.engine.promote(fourth, fx.circle.id, fx.founder).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::AdminCapExceeded));
        assert_eq!(err.to_string(), "a circle can have at most 3 admins");
        assert_eq!(fx.membership(fourth).unwrap().role, MemberRole::Member);
    }

    #[test]
    fn only_active_members_can_be_promoted() {
        let fx = Fixture::private();
        let pending = fx.engine.request_join(Uuid::now_v7(), fx.circle.id, None).unwrap();
        assert_eq!(
            code(fx.engine.promote(pending.user_id, fx.circle.id, fx.founder)),
            ErrorCode::InvalidMembershipState
        );

        let restricted = fx.member();
        fx.engine.restrict(restricted, fx.circle.id, fx.founder, None, None).unwrap();
        assert_eq!(
            code(fx.engine.promote(restricted, fx.circle.id, fx.founder)),
            ErrorCode::InvalidMembershipState
        );

        let banned = fx.member();
        fx.engine.ban(banned, fx.circle.id, fx.founder, None).unwrap();
        assert_eq!(
            code(fx.engine.promote(banned, fx.circle.id, fx.founder)),
            ErrorCode::InvalidMembershipState
        );
    }

    #[test]
    fn members_cannot_promote() {
        let fx = Fixture::private();
        let member = fx.member();
        let other = fx.member();
        assert_eq!(code(fx.engine.promote(other, fx.circle.id, member)), ErrorCode::NotCircleAdmin);
    }

    #[test]
    fn demote_allows_reaching_zero_admins() {
        let fx = Fixture::private();
        fx.engine.demote(fx.founder, fx.circle.id, fx.founder).unwrap();
        assert_eq!(fx.active_admins(), 0);
        assert_eq!(
            code(fx.engine.demote(fx.founder, fx.circle.id, fx.founder)),
            ErrorCode::NotCircleAdmin
        );
    }

    #[test]
    fn concurrent_promotions_never_exceed_cap() {
        let fx = Fixture::private();
        fx.admin();
        let candidates: Vec<Uuid> = (0..5).map(|_| fx.member()).collect();
        let barrier = Barrier::new(candidates.len());

        let results: Vec<AppResult<Membership>> = std::thread::scope(|s| {
            let handles: Vec<_> = candidates
                .iter()
                .map(|&user| {
                    let (fx, barrier) = (&fx, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        fx.engine.promote(user, fx.circle.id, fx.founder)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.code(), Some(ErrorCode::AdminCapExceeded));
        }
        assert_eq!(fx.active_admins(), 3);
    }

    #[test]
    fn two_admins_promoting_at_once_yield_one_success() {
        let fx = Fixture::private();
        let a1 = fx.founder;
        let a2 = fx.admin();
        let (u, v) = (fx.member(), fx.member());
        let barrier = Barrier::new(2);

        let (first, second) = std::thread::scope(|s| {
            let one = s.spawn(|| {
                barrier.wait();
                fx.engine.promote(u, fx.circle.id, a1)
            });
            let two = s.spawn(|| {
                barrier.wait();
                fx.engine.promote(v, fx.circle.id, a2)
            });
            (one.join().unwrap(), two.join().unwrap())
        });

        assert!(first.is_ok() != second.is_ok());
        let loser = if first.is_err() { first } else { second };
        assert_eq!(code(loser), ErrorCode::AdminCapExceeded);
        assert_eq!(fx.active_admins(), 3);
    }
}
