use uuid::Uuid;

use circles_shared::errors::{AppError, AppResult, ErrorCode};

use super::{audit, load_target, require_admin, AuditEntry, ModerationEngine};
use crate::models::{
    Circle, MemberRole, Membership, MembershipStanding, MembershipStatus, ModerationActionKind,
    Visibility,
};
use crate::store::{CircleStore, RecordRef};

#[derive(Debug, Clone)]
pub struct NewCircle {
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub requires_post_approval: bool,
}

fn request_gone() -> AppError {
    AppError::already_resolved("this join request no longer exists; it was already resolved")
}

/// The request was settled earlier; say what became of it.
fn request_settled(membership: &Membership) -> AppError {
    let outcome = match membership.status {
        MembershipStatus::Banned => "the user has since been banned",
        MembershipStatus::Restricted => "the user was admitted and is now restricted",
        MembershipStatus::Active | MembershipStatus::PendingRequest => "the user was admitted",
    };
    AppError::already_resolved(format!("this join request was already resolved; {outcome}"))
}

impl<S: CircleStore> ModerationEngine<S> {
    /// Creates a circle whose creator is its first active admin.
    pub fn create_circle(&self, creator: Uuid, new: NewCircle) -> AppResult<Circle> {
        let now = self.now();
        let circle = Circle {
            id: Uuid::now_v7(),
            name: new.name,
            description: new.description,
            visibility: new.visibility,
            requires_post_approval: new.requires_post_approval,
            created_by: creator,
            created_at: now,
        };
        let mut founder = Membership::new(circle.id, creator, MembershipStatus::Active, now);
        founder.role = MemberRole::Admin;

        self.store.create_circle(&circle, &founder)?;
        tracing::info!(circle_id = %circle.id, creator = %creator, "circle created");
        Ok(circle)
    }

    /// Public circles admit immediately; private circles queue a request.
    pub fn request_join(&self, user_id: Uuid, circle_id: Uuid, message: Option<String>) -> AppResult<Membership> {
        let now = self.now();
        let membership = self.store.transaction(circle_id, |tx| {
            if let Some(existing) = tx.membership_of(user_id)? {
                return Err(match existing.effective_status(now) {
                    MembershipStatus::PendingRequest => AppError::new(
                        ErrorCode::DuplicateRequest,
                        "you already have a pending request to join this circle",
                    ),
                    MembershipStatus::Banned => AppError::new(
                        ErrorCode::AlreadyMember,
                        "you are banned from this circle",
                    ),
                    MembershipStatus::Active | MembershipStatus::Restricted => AppError::new(
                        ErrorCode::AlreadyMember,
                        "you are already a member of this circle",
                    ),
                });
            }

            let status = match tx.circle().visibility {
                Visibility::Public => MembershipStatus::Active,
                Visibility::Private => MembershipStatus::PendingRequest,
            };
            let mut membership = Membership::new(circle_id, user_id, status, now);
            membership.request_message = message;
            tx.insert_membership(&membership)?;
            Ok(membership)
        })?;

        tracing::info!(
            circle_id = %circle_id,
            user_id = %user_id,
            status = %membership.status,
            "join requested"
        );
        Ok(membership)
    }

    pub fn approve_join(&self, request_id: Uuid, acting_admin: Uuid) -> AppResult<Membership> {
        let circle_id = self.owning_circle(RecordRef::Membership(request_id), request_gone())?;
        let now = self.now();

        let membership = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let mut membership = tx.membership(request_id)?.ok_or_else(request_gone)?;
            if membership.status != MembershipStatus::PendingRequest {
                return Err(request_settled(&membership));
            }

            membership.status = MembershipStatus::Active;
            membership.joined_at = now;
            membership.updated_at = now;
            tx.update_membership(&membership)?;
            audit(tx, acting_admin, AuditEntry::user(ModerationActionKind::ApproveRequest, membership.user_id), now)?;
            Ok(membership)
        })?;

        tracing::info!(circle_id = %circle_id, user_id = %membership.user_id, admin = %acting_admin, "join request approved");
        Ok(membership)
    }

    /// Deletes a pending request. Returns the request as it was.
    pub fn reject_join(&self, request_id: Uuid, acting_admin: Uuid) -> AppResult<Membership> {
        let circle_id = self.owning_circle(RecordRef::Membership(request_id), request_gone())?;
        let now = self.now();

        let membership = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let membership = tx.membership(request_id)?.ok_or_else(request_gone)?;
            if membership.status != MembershipStatus::PendingRequest {
                return Err(request_settled(&membership));
            }

            tx.delete_membership(membership.id)?;
            audit(tx, acting_admin, AuditEntry::user(ModerationActionKind::RejectRequest, membership.user_id), now)?;
            Ok(membership)
        })?;

        tracing::info!(circle_id = %circle_id, user_id = %membership.user_id, admin = %acting_admin, "join request rejected");
        Ok(membership)
    }

    /// Self-leave. Only a member in good standing can leave; sanctions can't
    /// be shed by leaving and rejoining.
    pub fn leave(&self, user_id: Uuid, circle_id: Uuid) -> AppResult<Membership> {
        let now = self.now();
        let membership = self.store.transaction(circle_id, |tx| {
            let membership = tx.membership_of(user_id)?.ok_or_else(|| {
                AppError::new(ErrorCode::MembershipNotFound, "you are not a member of this circle")
            })?;

            match membership.effective_status(now) {
                MembershipStatus::Active => {}
                MembershipStatus::Banned => {
                    return Err(AppError::new(
                        ErrorCode::InvalidMembershipState,
                        "banned users cannot leave; they are already excluded",
                    ))
                }
                MembershipStatus::Restricted => {
                    return Err(AppError::new(
                        ErrorCode::InvalidMembershipState,
                        "you cannot leave this circle while restricted",
                    ))
                }
                MembershipStatus::PendingRequest => {
                    return Err(AppError::new(
                        ErrorCode::InvalidMembershipState,
                        "your join request is still pending",
                    ))
                }
            }

            tx.delete_membership(membership.id)?;
            Ok(membership)
        })?;

        tracing::info!(circle_id = %circle_id, user_id = %user_id, "member left circle");
        Ok(membership)
    }

    /// Deletes the target's membership whatever its status.
    pub fn remove_member(&self, target: Uuid, circle_id: Uuid, acting_admin: Uuid) -> AppResult<Membership> {
        let now = self.now();
        let membership = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let membership = load_target(tx, target, now)?;
            tx.delete_membership(membership.id)?;
            audit(tx, acting_admin, AuditEntry::user(ModerationActionKind::RemoveMember, target), now)?;
            Ok(membership)
        })?;

        tracing::info!(circle_id = %circle_id, user_id = %target, admin = %acting_admin, "member removed");
        Ok(membership)
    }

    /// The caller's own standing, evaluated against the clock.
    pub fn membership_standing(&self, user_id: Uuid, circle_id: Uuid) -> AppResult<MembershipStanding> {
        let now = self.now();
        self.store.transaction(circle_id, |tx| {
            let membership = tx.membership_of(user_id)?;
            Ok(MembershipStanding {
                circle_id,
                user_id,
                status: membership.as_ref().map(|m| m.effective_status(now)),
                is_admin: membership.as_ref().map_or(false, |m| m.is_active_admin(now)),
                is_restricted: membership.as_ref().map_or(false, |m| m.is_restricted(now)),
                restricted_until: membership
                    .as_ref()
                    .filter(|m| m.is_restricted(now))
                    .and_then(|m| m.restricted_until),
            })
        })
    }
}
