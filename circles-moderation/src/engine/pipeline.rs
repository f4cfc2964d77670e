//! Post lifecycle plus flag and report resolution.
//!
//! A post is `pending` until an admin approves or rejects it. Rejection, like
//! a `remove` decision on a flag or report, deletes the post outright and
//! closes every other open concern on it as moot, so nothing in the queues
//! can ever point at a post that no longer exists.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use circles_shared::errors::{AppError, AppResult, ErrorCode};
use circles_shared::types::{Paginated, PaginationParams};

use super::{audit, require_active_member, require_admin, AuditEntry, ModerationEngine};
use crate::models::{
    Concern, ConcernKind, ConcernResolution, Decision, ModerationActionKind, Post,
    PostModerationStatus, Visibility,
};
use crate::store::{CircleStore, CircleTx, RecordRef};

/// A post that was deleted by a moderation decision, as it was at deletion.
#[derive(Debug, Clone, Serialize)]
pub struct RemovedPost {
    pub post: Post,
    /// Open concerns that were closed because their post went away.
    pub mooted: Vec<Concern>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConcernOutcome {
    pub concern: Concern,
    pub removed: Option<RemovedPost>,
}

fn post_gone() -> AppError {
    AppError::already_resolved("this post no longer exists; it was already resolved")
}

fn require_reason(reason: &str) -> AppResult<()> {
    if reason.trim().is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "a reason is required"));
    }
    Ok(())
}

/// Deletes `post` after closing its open concerns as moot.
fn remove_post(tx: &mut dyn CircleTx, mut post: Post, acting: Uuid, now: DateTime<Utc>) -> AppResult<RemovedPost> {
    let mut mooted = Vec::new();
    for mut concern in tx.concerns_for_post(post.id)? {
        if !concern.is_open() {
            continue;
        }
        concern.resolution = ConcernResolution::Moot;
        concern.resolved_by = Some(acting);
        concern.resolved_at = Some(now);
        tx.update_concern(&concern)?;
        mooted.push(concern);
    }

    tx.delete_post(post.id)?;
    post.moderation_status = PostModerationStatus::Rejected;
    post.reviewed_by = Some(acting);
    post.reviewed_at = Some(now);
    Ok(RemovedPost { post, mooted })
}

/// Applies a keep/remove decision to an open concern.
fn settle(
    tx: &mut dyn CircleTx,
    mut concern: Concern,
    decision: Decision,
    acting: Uuid,
    now: DateTime<Utc>,
) -> AppResult<ConcernOutcome> {
    concern.resolution = match decision {
        Decision::Keep => ConcernResolution::Approved,
        Decision::Remove => ConcernResolution::Rejected,
    };
    concern.resolved_by = Some(acting);
    concern.resolved_at = Some(now);
    tx.update_concern(&concern)?;

    let post = tx.post(concern.post_id)?;
    let author = post.as_ref().map(|p| p.author_id);
    let removed = match (decision, post) {
        (Decision::Remove, Some(post)) => Some(remove_post(tx, post, acting, now)?),
        _ => None,
    };

    let action = match (concern.kind, decision) {
        (ConcernKind::Flag, Decision::Keep) => ModerationActionKind::KeepFlagged,
        (ConcernKind::Flag, Decision::Remove) => ModerationActionKind::RemoveFlagged,
        (ConcernKind::Report, Decision::Keep) => ModerationActionKind::KeepReported,
        (ConcernKind::Report, Decision::Remove) => ModerationActionKind::RemoveReported,
    };
    let entry = match author {
        Some(author) => AuditEntry::post(action, author, concern.post_id),
        None => AuditEntry {
            action,
            target_user_id: None,
            target_post_id: Some(concern.post_id),
            reason: None,
        },
    };
    audit(tx, acting, entry.with_reason(Some(concern.reason.clone())), now)?;

    Ok(ConcernOutcome { concern, removed })
}

impl<S: CircleStore> ModerationEngine<S> {
    /// Member submission. Goes live immediately unless the circle reviews posts.
    pub fn submit_post(
        &self,
        author: Uuid,
        circle_id: Uuid,
        content: String,
        media_keys: Vec<String>,
    ) -> AppResult<Post> {
        if content.trim().is_empty() && media_keys.is_empty() {
            return Err(AppError::new(ErrorCode::ValidationError, "a post needs content or media"));
        }

        let now = self.now();
        let post = self.store.transaction(circle_id, |tx| {
            require_active_member(tx, author, now)?;
            let moderation_status = if tx.circle().requires_post_approval {
                PostModerationStatus::Pending
            } else {
                PostModerationStatus::Approved
            };
            let post = Post {
                id: Uuid::now_v7(),
                circle_id,
                author_id: author,
                content,
                media_keys,
                moderation_status,
                reviewed_by: None,
                reviewed_at: None,
                created_at: now,
            };
            tx.insert_post(&post)?;
            Ok(post)
        })?;

        tracing::info!(
            circle_id = %circle_id,
            post_id = %post.id,
            author = %author,
            status = %post.moderation_status,
            "post submitted"
        );
        Ok(post)
    }

    pub fn approve_post(&self, post_id: Uuid, acting_admin: Uuid) -> AppResult<Post> {
        let circle_id = self.owning_circle(RecordRef::Post(post_id), post_gone())?;
        let now = self.now();

        let post = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let mut post = tx.post(post_id)?.ok_or_else(post_gone)?;
            if post.moderation_status != PostModerationStatus::Pending {
                return Err(AppError::already_resolved("this post was already approved"));
            }

            post.moderation_status = PostModerationStatus::Approved;
            post.reviewed_by = Some(acting_admin);
            post.reviewed_at = Some(now);
            tx.update_post(&post)?;
            audit(
                tx,
                acting_admin,
                AuditEntry::post(ModerationActionKind::ApprovePost, post.author_id, post.id),
                now,
            )?;
            Ok(post)
        })?;

        tracing::info!(circle_id = %circle_id, post_id = %post_id, admin = %acting_admin, "post approved");
        Ok(post)
    }

    /// Rejects a pending post, deleting it.
    pub fn reject_post(&self, post_id: Uuid, acting_admin: Uuid, reason: Option<String>) -> AppResult<RemovedPost> {
        let circle_id = self.owning_circle(RecordRef::Post(post_id), post_gone())?;
        let now = self.now();

        let removed = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let post = tx.post(post_id)?.ok_or_else(post_gone)?;
            if post.moderation_status != PostModerationStatus::Pending {
                return Err(AppError::already_resolved("this post was already approved"));
            }

            let author = post.author_id;
            let removed = remove_post(tx, post, acting_admin, now)?;
            audit(
                tx,
                acting_admin,
                AuditEntry::post(ModerationActionKind::RejectPost, author, post_id).with_reason(reason),
                now,
            )?;
            Ok(removed)
        })?;

        tracing::info!(circle_id = %circle_id, post_id = %post_id, admin = %acting_admin, "post rejected");
        Ok(removed)
    }

    /// Raises a flag on an approved post. `raised_by` is `None` for the
    /// automated scanner.
    pub fn flag_post(&self, post_id: Uuid, reason: String, raised_by: Option<Uuid>) -> AppResult<Concern> {
        require_reason(&reason)?;
        let circle_id = self.owning_circle(
            RecordRef::Post(post_id),
            AppError::new(ErrorCode::PostNotFound, "post not found"),
        )?;
        let now = self.now();

        let flag = self.store.transaction(circle_id, |tx| {
            let post = tx
                .post(post_id)?
                .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "post not found"))?;
            if !post.is_visible() {
                return Err(AppError::new(ErrorCode::InvalidPostState, "only approved posts can be flagged"));
            }
            let already_flagged = tx
                .concerns_for_post(post_id)?
                .iter()
                .any(|c| c.kind == ConcernKind::Flag && c.is_open());
            if already_flagged {
                return Err(AppError::new(ErrorCode::DuplicateFlag, "this post already has an open flag"));
            }

            let flag = Concern {
                id: Uuid::now_v7(),
                circle_id,
                post_id,
                kind: ConcernKind::Flag,
                reason,
                raised_by,
                resolution: ConcernResolution::Open,
                resolved_by: None,
                resolved_at: None,
                created_at: now,
            };
            tx.insert_concern(&flag)?;
            Ok(flag)
        })?;

        tracing::info!(circle_id = %circle_id, post_id = %post_id, flag_id = %flag.id, "post flagged");
        Ok(flag)
    }

    pub fn report_post(&self, reporter: Uuid, post_id: Uuid, reason: String) -> AppResult<Concern> {
        require_reason(&reason)?;
        let circle_id = self.owning_circle(
            RecordRef::Post(post_id),
            AppError::new(ErrorCode::PostNotFound, "post not found"),
        )?;
        let now = self.now();

        let report = self.store.transaction(circle_id, |tx| {
            require_active_member(tx, reporter, now)?;
            let post = tx
                .post(post_id)?
                .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "post not found"))?;
            if !post.is_visible() {
                return Err(AppError::new(ErrorCode::InvalidPostState, "only approved posts can be reported"));
            }
            if post.author_id == reporter {
                return Err(AppError::new(ErrorCode::CannotReportOwnPost, "you cannot report your own post"));
            }
            let already_reported = tx
                .concerns_for_post(post_id)?
                .iter()
                .any(|c| c.kind == ConcernKind::Report && c.is_open() && c.raised_by == Some(reporter));
            if already_reported {
                return Err(AppError::new(ErrorCode::DuplicateReport, "you have already reported this post"));
            }

            let report = Concern {
                id: Uuid::now_v7(),
                circle_id,
                post_id,
                kind: ConcernKind::Report,
                reason,
                raised_by: Some(reporter),
                resolution: ConcernResolution::Open,
                resolved_by: None,
                resolved_at: None,
                created_at: now,
            };
            tx.insert_concern(&report)?;
            Ok(report)
        })?;

        tracing::info!(circle_id = %circle_id, post_id = %post_id, report_id = %report.id, "post reported");
        Ok(report)
    }

    pub fn resolve_flag(&self, flag_id: Uuid, decision: Decision, acting_admin: Uuid) -> AppResult<ConcernOutcome> {
        self.resolve_concern(ConcernKind::Flag, flag_id, decision, acting_admin)
    }

    pub fn resolve_report(&self, report_id: Uuid, decision: Decision, acting_admin: Uuid) -> AppResult<ConcernOutcome> {
        self.resolve_concern(ConcernKind::Report, report_id, decision, acting_admin)
    }

    /// Resolves the open flag on a post, addressed by the post id as the
    /// console does.
    pub fn resolve_flag_for_post(&self, post_id: Uuid, decision: Decision, acting_admin: Uuid) -> AppResult<ConcernOutcome> {
        let circle_id = self.owning_circle(RecordRef::Post(post_id), post_gone())?;
        let now = self.now();

        let outcome = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let flag = tx
                .concerns_for_post(post_id)?
                .into_iter()
                .find(|c| c.kind == ConcernKind::Flag && c.is_open())
                .ok_or_else(|| AppError::already_resolved("this post has no open flag"))?;
            settle(tx, flag, decision, acting_admin, now)
        })?;

        tracing::info!(
            circle_id = %circle_id,
            post_id = %post_id,
            decision = %decision,
            admin = %acting_admin,
            "flag resolved"
        );
        Ok(outcome)
    }

    fn resolve_concern(
        &self,
        kind: ConcernKind,
        concern_id: Uuid,
        decision: Decision,
        acting_admin: Uuid,
    ) -> AppResult<ConcernOutcome> {
        let not_found = || AppError::new(ErrorCode::ConcernNotFound, format!("{kind} not found"));
        let circle_id = self.owning_circle(RecordRef::Concern(concern_id), not_found())?;
        let now = self.now();

        let outcome = self.store.transaction(circle_id, |tx| {
            require_admin(tx, acting_admin, now)?;
            let concern = tx
                .concern(concern_id)?
                .filter(|c| c.kind == kind)
                .ok_or_else(not_found)?;
            if !concern.is_open() {
                return Err(AppError::already_resolved(format!(
                    "this {kind} was already resolved ({})",
                    concern.resolution
                )));
            }
            settle(tx, concern, decision, acting_admin, now)
        })?;

        tracing::info!(
            circle_id = %circle_id,
            concern_id = %concern_id,
            kind = %kind,
            decision = %decision,
            admin = %acting_admin,
            "concern resolved"
        );
        Ok(outcome)
    }

    /// Approved posts, newest first. Private circles are readable only by
    /// members in good standing.
    pub fn visible_posts(
        &self,
        circle_id: Uuid,
        viewer: Option<Uuid>,
        params: &PaginationParams,
    ) -> AppResult<Paginated<Post>> {
        let now = self.now();
        self.store.transaction(circle_id, |tx| {
            if tx.circle().visibility == Visibility::Private {
                let viewer = viewer.ok_or_else(|| {
                    AppError::new(ErrorCode::NotCircleMember, "this circle is private")
                })?;
                require_active_member(tx, viewer, now)?;
            }

            let items = tx.posts(
                PostModerationStatus::Approved,
                params.offset() as i64,
                params.limit() as i64,
            )?;
            let total = tx.count_posts(PostModerationStatus::Approved)?;
            Ok(Paginated::new(items, total as u64, params))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{code, Fixture};
    use super::*;

    fn live_post(fx: &Fixture) -> Post {
        let author = fx.member();
        let post = fx
            .engine
            .submit_post(author, fx.circle.id, "sunrise from the roof".into(), vec!["media/roof.jpg".into()])
            .unwrap();
        fx.engine.approve_post(post.id, fx.founder).unwrap()
    }

    fn pending_posts(fx: &Fixture) -> i64 {
        fx.engine.counts(fx.circle.id, fx.founder).unwrap().pending_post_count
    }

    #[test]
    fn circle_setting_decides_initial_status() {
        let reviewed = Fixture::private();
        let author = reviewed.member();
        let post = reviewed.engine.submit_post(author, reviewed.circle.id, "hello".into(), vec![]).unwrap();
        assert_eq!(post.moderation_status, PostModerationStatus::Pending);

        let open = Fixture::new(Visibility::Public, false);
        let author = open.member();
        let post = open.engine.submit_post(author, open.circle.id, "hello".into(), vec![]).unwrap();
        assert_eq!(post.moderation_status, PostModerationStatus::Approved);
    }

    #[test]
    fn sanctioned_members_cannot_post() {
        let fx = Fixture::private();
        let restricted = fx.member();
        fx.engine.restrict(restricted, fx.circle.id, fx.founder, None, None).unwrap();
        assert_eq!(
            code(fx.engine.submit_post(restricted, fx.circle.id, "hi".into(), vec![])),
            ErrorCode::MemberRestricted
        );

        let banned = fx.member();
        fx.engine.ban(banned, fx.circle.id, fx.founder, None).unwrap();
        assert_eq!(
            code(fx.engine.submit_post(banned, fx.circle.id, "hi".into(), vec![])),
            ErrorCode::MemberBanned
        );
    }

    #[test]
    fn approve_is_exactly_once() {
        let fx = Fixture::private();
        let author = fx.member();
        let post = fx.engine.submit_post(author, fx.circle.id, "hi".into(), vec![]).unwrap();

        let approved = fx.engine.approve_post(post.id, fx.founder).unwrap();
        assert!(approved.is_visible());
        assert_eq!(approved.reviewed_by, Some(fx.founder));
        assert_eq!(code(fx.engine.approve_post(post.id, fx.founder)), ErrorCode::AlreadyResolved);
        assert_eq!(code(fx.engine.reject_post(post.id, fx.founder, None)), ErrorCode::AlreadyResolved);
    }

    #[test]
    fn rejecting_pending_post_deletes_it_and_drops_count() {
        let fx = Fixture::private();
        let author = fx.member();
        let post = fx.engine.submit_post(author, fx.circle.id, "hi".into(), vec![]).unwrap();
        let before = pending_posts(&fx);

        let removed = fx.engine.reject_post(post.id, fx.founder, Some("off topic".into())).unwrap();
        assert_eq!(removed.post.moderation_status, PostModerationStatus::Rejected);
        assert_eq!(pending_posts(&fx), before - 1);
        assert_eq!(code(fx.engine.reject_post(post.id, fx.founder, None)), ErrorCode::AlreadyResolved);
        assert_eq!(code(fx.engine.approve_post(post.id, fx.founder)), ErrorCode::AlreadyResolved);
    }

    #[test]
    fn only_one_open_flag_per_post() {
        let fx = Fixture::private();
        let post = live_post(&fx);
        fx.engine.flag_post(post.id, "nsfw".into(), None).unwrap();
        assert_eq!(code(fx.engine.flag_post(post.id, "nsfw".into(), None)), ErrorCode::DuplicateFlag);
    }

    #[test]
    fn pending_posts_cannot_be_flagged_or_reported() {
        let fx = Fixture::private();
        let author = fx.member();
        let reporter = fx.member();
        let post = fx.engine.submit_post(author, fx.circle.id, "hi".into(), vec![]).unwrap();
        assert_eq!(code(fx.engine.flag_post(post.id, "nsfw".into(), None)), ErrorCode::InvalidPostState);
        assert_eq!(
            code(fx.engine.report_post(reporter, post.id, "spam".into())),
            ErrorCode::InvalidPostState
        );
    }

    #[test]
    fn report_rules() {
        let fx = Fixture::private();
        let post = live_post(&fx);
        let reporter = fx.member();

        assert_eq!(
            code(fx.engine.report_post(post.author_id, post.id, "spam".into())),
            ErrorCode::CannotReportOwnPost
        );
        fx.engine.report_post(reporter, post.id, "spam".into()).unwrap();
        assert_eq!(
            code(fx.engine.report_post(reporter, post.id, "spam".into())),
            ErrorCode::DuplicateReport
        );
        assert_eq!(
            code(fx.engine.report_post(Uuid::now_v7(), post.id, "spam".into())),
            ErrorCode::NotCircleMember
        );
    }

    #[test]
    fn keeping_a_flag_leaves_post_and_report_alone() {
        let fx = Fixture::private();
        let post = live_post(&fx);
        let flag = fx.engine.flag_post(post.id, "nsfw".into(), None).unwrap();
        let report = fx.engine.report_post(fx.member(), post.id, "spam".into()).unwrap();

        let outcome = fx.engine.resolve_flag(flag.id, Decision::Keep, fx.founder).unwrap();
        assert_eq!(outcome.concern.resolution, ConcernResolution::Approved);
        assert!(outcome.removed.is_none());

        let counts = fx.engine.counts(fx.circle.id, fx.founder).unwrap();
        assert_eq!(counts.open_flag_count, 0);
        assert_eq!(counts.open_report_count, 1);
        assert!(fx.engine.resolve_report(report.id, Decision::Keep, fx.founder).is_ok());
    }

    #[test]
    fn removing_flagged_post_moots_open_report() {
        let fx = Fixture::private();
        let post = live_post(&fx);
        let flag = fx.engine.flag_post(post.id, "nsfw".into(), None).unwrap();
        let report = fx.engine.report_post(fx.member(), post.id, "spam".into()).unwrap();

        let outcome = fx.engine.resolve_flag_for_post(post.id, Decision::Remove, fx.founder).unwrap();
        assert_eq!(outcome.concern.id, flag.id);
        assert_eq!(outcome.concern.resolution, ConcernResolution::Rejected);
        let removed = outcome.removed.unwrap();
        assert_eq!(removed.post.media_keys, vec!["media/roof.jpg".to_string()]);
        assert_eq!(removed.mooted.len(), 1);
        assert_eq!(removed.mooted[0].id, report.id);
        assert_eq!(removed.mooted[0].resolution, ConcernResolution::Moot);

        let counts = fx.engine.counts(fx.circle.id, fx.founder).unwrap();
        assert_eq!(counts.open_flag_count, 0);
        assert_eq!(counts.open_report_count, 0);

        assert_eq!(
            code(fx.engine.resolve_report(report.id, Decision::Remove, fx.founder)),
            ErrorCode::AlreadyResolved
        );
        assert_eq!(
            code(fx.engine.resolve_flag_for_post(post.id, Decision::Remove, fx.founder)),
            ErrorCode::AlreadyResolved
        );
        let page = fx.engine.visible_posts(fx.circle.id, Some(fx.founder), &PaginationParams::default()).unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn removing_reported_post_moots_flag() {
        let fx = Fixture::private();
        let post = live_post(&fx);
        let flag = fx.engine.flag_post(post.id, "nsfw".into(), None).unwrap();
        let report = fx.engine.report_post(fx.member(), post.id, "spam".into()).unwrap();

        let outcome = fx.engine.resolve_report(report.id, Decision::Remove, fx.founder).unwrap();
        assert_eq!(outcome.removed.unwrap().mooted[0].id, flag.id);
        assert_eq!(code(fx.engine.resolve_flag(flag.id, Decision::Keep, fx.founder)), ErrorCode::AlreadyResolved);
    }

    #[test]
    fn resolving_with_wrong_kind_is_not_found() {
        let fx = Fixture::private();
        let post = live_post(&fx);
        let flag = fx.engine.flag_post(post.id, "nsfw".into(), None).unwrap();
        assert_eq!(
            code(fx.engine.resolve_report(flag.id, Decision::Keep, fx.founder)),
            ErrorCode::ConcernNotFound
        );
    }

    #[test]
    fn members_cannot_resolve() {
        let fx = Fixture::private();
        let post = live_post(&fx);
        let member = fx.member();
        let flag = fx.engine.flag_post(post.id, "nsfw".into(), None).unwrap();
        assert_eq!(code(fx.engine.resolve_flag(flag.id, Decision::Remove, member)), ErrorCode::NotCircleAdmin);
    }

    #[test]
    fn private_feed_requires_membership() {
        let fx = Fixture::private();
        live_post(&fx);
        let params = PaginationParams::default();

        assert_eq!(code(fx.engine.visible_posts(fx.circle.id, None, &params)), ErrorCode::NotCircleMember);
        let member = fx.member();
        let page = fx.engine.visible_posts(fx.circle.id, Some(member), &params).unwrap();
        assert_eq!(page.items.len(), 1);

        let public = Fixture::new(Visibility::Public, false);
        let page = public.engine.visible_posts(public.circle.id, None, &params).unwrap();
        assert_eq!(page.total, 0);
    }
}
