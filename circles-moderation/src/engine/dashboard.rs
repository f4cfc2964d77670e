use serde::Serialize;
use uuid::Uuid;

use circles_shared::errors::AppResult;
use circles_shared::types::{Paginated, PaginationParams};

use super::{require_admin, ModerationEngine};
use crate::models::{
    Circle, ConcernKind, ConcernWithPost, MemberSummary, Membership, MembershipStatus,
    ModerationAction, Post, PostModerationStatus,
};
use crate::store::{CircleStore, CircleTx};

/// Upper bound on each list in the management snapshot.
const SNAPSHOT_LIST_LIMIT: i64 = 100;

/// Queue sizes for the console. Counted from the records on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardCounts {
    pub pending_request_count: i64,
    pub pending_post_count: i64,
    pub open_flag_count: i64,
    pub open_report_count: i64,
    pub active_admin_count: i64,
    pub total_pending: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagementSnapshot {
    pub circle: Circle,
    pub members: Vec<MemberSummary>,
    pub pending_requests: Vec<Membership>,
    pub pending_posts: Vec<Post>,
    pub flagged_posts: Vec<ConcernWithPost>,
    pub reported_posts: Vec<ConcernWithPost>,
    pub counts: DashboardCounts,
}

fn count_queues(tx: &mut dyn CircleTx) -> AppResult<DashboardCounts> {
    let pending_request_count = tx.count_memberships(MembershipStatus::PendingRequest)?;
    let pending_post_count = tx.count_posts(PostModerationStatus::Pending)?;
    let open_flag_count = tx.count_open_concerns(ConcernKind::Flag)?;
    let open_report_count = tx.count_open_concerns(ConcernKind::Report)?;
    let active_admin_count = tx.count_active_admins()?;

    Ok(DashboardCounts {
        pending_request_count,
        pending_post_count,
        open_flag_count,
        open_report_count,
        active_admin_count,
        total_pending: pending_request_count + pending_post_count + open_flag_count + open_report_count,
    })
}

fn with_posts(tx: &mut dyn CircleTx, kind: ConcernKind) -> AppResult<Vec<ConcernWithPost>> {
    tx.open_concerns(kind, SNAPSHOT_LIST_LIMIT)?
        .into_iter()
        .map(|concern| -> AppResult<ConcernWithPost> {
            let post = tx.post(concern.post_id)?;
            Ok(ConcernWithPost { concern, post })
        })
        .collect()
}

impl<S: CircleStore> ModerationEngine<S> {
    pub fn counts(&self, circle_id: Uuid, acting_admin: Uuid) -> AppResult<DashboardCounts> {
        let now = self.now();
        self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            count_queues(tx)
        })
    }

    /// Everything the console renders, read in one consistent view.
    pub fn management_snapshot(&self, circle_id: Uuid, acting_admin: Uuid) -> AppResult<ManagementSnapshot> {
        let now = self.now();
        self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;

            let all = tx.memberships()?;
            let pending_requests = all
                .iter()
                .filter(|m| m.status == MembershipStatus::PendingRequest)
                .cloned()
                .collect();
            let members = all
                .into_iter()
                .filter(|m| m.status != MembershipStatus::PendingRequest)
                .map(|m| MemberSummary::at(m, now))
                .collect();

            Ok(ManagementSnapshot {
                circle: tx.circle().clone(),
                members,
                pending_requests,
                pending_posts: tx.posts(PostModerationStatus::Pending, 0, SNAPSHOT_LIST_LIMIT)?,
                flagged_posts: with_posts(tx, ConcernKind::Flag)?,
                reported_posts: with_posts(tx, ConcernKind::Report)?,
                counts: count_queues(tx)?,
            })
        })
    }

    pub fn moderation_log(
        &self,
        circle_id: Uuid,
        acting_admin: Uuid,
        params: &PaginationParams,
    ) -> AppResult<Paginated<ModerationAction>> {
        let now = self.now();
        self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let items = tx.actions(params.offset() as i64, params.limit() as i64)?;
            let total = tx.count_actions()?;
            Ok(Paginated::new(items, total as u64, params))
        })
    }
}
