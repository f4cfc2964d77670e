use uuid::Uuid;

use circles_shared::types::event::{payloads, routing_keys, Event};

use super::EventBus;
use crate::models::{Concern, MemberRole, Membership, MembershipStatus, Post};

const SOURCE: &str = "circles-moderation";

async fn membership_event(bus: &EventBus, key: &str, membership: &Membership, acted_by: Option<Uuid>) {
    let event = Event::new(
        SOURCE,
        key,
        payloads::MembershipChanged {
            membership_id: membership.id,
            circle_id: membership.circle_id,
            user_id: membership.user_id,
            status: membership.status.to_string(),
            acted_by,
        },
    )
    .with_user(membership.user_id);

    bus.publish(key, event).await;
}

pub async fn publish_membership_requested(bus: &EventBus, membership: &Membership) {
    membership_event(bus, routing_keys::MEMBERSHIP_REQUESTED, membership, None).await;
}

pub async fn publish_membership_approved(bus: &EventBus, membership: &Membership, admin_id: Uuid) {
    membership_event(bus, routing_keys::MEMBERSHIP_APPROVED, membership, Some(admin_id)).await;
}

pub async fn publish_membership_rejected(bus: &EventBus, membership: &Membership, admin_id: Uuid) {
    membership_event(bus, routing_keys::MEMBERSHIP_REJECTED, membership, Some(admin_id)).await;
}

/// `acted_by` is `None` when the member left on their own.
pub async fn publish_membership_removed(bus: &EventBus, membership: &Membership, acted_by: Option<Uuid>) {
    membership_event(bus, routing_keys::MEMBERSHIP_REMOVED, membership, acted_by).await;
}

pub async fn publish_role_changed(bus: &EventBus, membership: &Membership, admin_id: Uuid) {
    let key = match membership.role {
        MemberRole::Admin => routing_keys::ROLE_PROMOTED,
        MemberRole::Member => routing_keys::ROLE_DEMOTED,
    };
    let event = Event::new(
        SOURCE,
        key,
        payloads::RoleChanged {
            circle_id: membership.circle_id,
            user_id: membership.user_id,
            role: membership.role.to_string(),
            acted_by: admin_id,
        },
    )
    .with_user(membership.user_id);

    bus.publish(key, event).await;
}

pub async fn publish_sanction_issued(
    bus: &EventBus,
    membership: &Membership,
    admin_id: Uuid,
    reason: Option<String>,
) {
    let key = match membership.status {
        MembershipStatus::Banned => routing_keys::SANCTION_BANNED,
        _ => routing_keys::SANCTION_RESTRICTED,
    };
    let event = Event::new(
        SOURCE,
        key,
        payloads::SanctionIssued {
            circle_id: membership.circle_id,
            user_id: membership.user_id,
            sanction_type: membership.status.to_string(),
            reason,
            expires_at: membership.restricted_until,
            issued_by: admin_id,
        },
    )
    .with_user(membership.user_id);

    bus.publish(key, event).await;
}

pub async fn publish_sanction_lifted(bus: &EventBus, membership: &Membership, admin_id: Uuid) {
    let event = Event::new(
        SOURCE,
        routing_keys::SANCTION_LIFTED,
        payloads::SanctionLifted {
            circle_id: membership.circle_id,
            user_id: membership.user_id,
            lifted_by: admin_id,
        },
    )
    .with_user(membership.user_id);

    bus.publish(routing_keys::SANCTION_LIFTED, event).await;
}

async fn post_event(bus: &EventBus, key: &str, post: &Post, acted_by: Option<Uuid>) {
    let event = Event::new(
        SOURCE,
        key,
        payloads::PostModerated {
            post_id: post.id,
            circle_id: post.circle_id,
            author_id: post.author_id,
            moderation_status: post.moderation_status.to_string(),
            acted_by,
        },
    )
    .with_user(post.author_id);

    bus.publish(key, event).await;
}

pub async fn publish_post_submitted(bus: &EventBus, post: &Post) {
    post_event(bus, routing_keys::POST_SUBMITTED, post, None).await;
}

pub async fn publish_post_approved(bus: &EventBus, post: &Post, admin_id: Uuid) {
    post_event(bus, routing_keys::POST_APPROVED, post, Some(admin_id)).await;
}

pub async fn publish_post_removed(bus: &EventBus, post: &Post, admin_id: Uuid) {
    post_event(bus, routing_keys::POST_REMOVED, post, Some(admin_id)).await;
}

pub async fn publish_concern_resolved(bus: &EventBus, concern: &Concern, admin_id: Uuid) {
    let event = Event::new(
        SOURCE,
        routing_keys::CONCERN_RESOLVED,
        payloads::ConcernResolved {
            concern_id: concern.id,
            post_id: concern.post_id,
            circle_id: concern.circle_id,
            kind: concern.kind.to_string(),
            resolution: concern.resolution.to_string(),
            resolved_by: admin_id,
        },
    )
    .with_user(admin_id);

    bus.publish(routing_keys::CONCERN_RESOLVED, event).await;
}
