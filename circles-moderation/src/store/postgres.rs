use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use circles_shared::clients::db::{checkout, DbPool};
use circles_shared::errors::{AppError, AppResult, ErrorCode};

use super::{CircleStore, CircleTx, RecordRef};
use crate::models::{
    Circle, Concern, ConcernKind, Membership, MembershipStatus, ModerationAction, Post,
    PostModerationStatus,
};
use crate::schema::{circle_memberships, circle_posts, circles, moderation_actions, post_concerns};

/// PostgreSQL store. A transaction locks the circle row (`FOR UPDATE`), which
/// serialises every command against that circle while leaving other circles
/// free to proceed.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// --- Rows ---

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = circles)]
struct CircleRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    visibility: String,
    requires_post_approval: bool,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = circle_memberships, treat_none_as_null = true)]
struct MembershipRow {
    id: Uuid,
    circle_id: Uuid,
    user_id: Uuid,
    role: String,
    status: String,
    restricted_until: Option<DateTime<Utc>>,
    ban_reason: Option<String>,
    request_message: Option<String>,
    joined_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = circle_posts, treat_none_as_null = true)]
struct PostRow {
    id: Uuid,
    circle_id: Uuid,
    author_id: Uuid,
    content: String,
    media_keys: Vec<String>,
    moderation_status: String,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = post_concerns, treat_none_as_null = true)]
struct ConcernRow {
    id: Uuid,
    circle_id: Uuid,
    post_id: Uuid,
    kind: String,
    reason: String,
    raised_by: Option<Uuid>,
    resolution: String,
    resolved_by: Option<Uuid>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = moderation_actions)]
struct ActionRow {
    id: Uuid,
    circle_id: Uuid,
    admin_id: Uuid,
    action: String,
    target_user_id: Option<Uuid>,
    target_post_id: Option<Uuid>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

fn parse<T: std::str::FromStr<Err = String>>(value: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|e: String| AppError::internal(format!("corrupt row: {e}")))
}

impl TryFrom<CircleRow> for Circle {
    type Error = AppError;

    fn try_from(row: CircleRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            visibility: parse(&row.visibility)?,
            requires_post_approval: row.requires_post_approval,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

impl From<&Circle> for CircleRow {
    fn from(c: &Circle) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            description: c.description.clone(),
            visibility: c.visibility.to_string(),
            requires_post_approval: c.requires_post_approval,
            created_by: c.created_by,
            created_at: c.created_at,
        }
    }
}

impl TryFrom<MembershipRow> for Membership {
    type Error = AppError;

    fn try_from(row: MembershipRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            circle_id: row.circle_id,
            user_id: row.user_id,
            role: parse(&row.role)?,
            status: parse(&row.status)?,
            restricted_until: row.restricted_until,
            ban_reason: row.ban_reason,
            request_message: row.request_message,
            joined_at: row.joined_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Membership> for MembershipRow {
    fn from(m: &Membership) -> Self {
        Self {
            id: m.id,
            circle_id: m.circle_id,
            user_id: m.user_id,
            role: m.role.to_string(),
            status: m.status.to_string(),
            restricted_until: m.restricted_until,
            ban_reason: m.ban_reason.clone(),
            request_message: m.request_message.clone(),
            joined_at: m.joined_at,
            updated_at: m.updated_at,
        }
    }
}

impl TryFrom<PostRow> for Post {
    type Error = AppError;

    fn try_from(row: PostRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            circle_id: row.circle_id,
            author_id: row.author_id,
            content: row.content,
            media_keys: row.media_keys,
            moderation_status: parse(&row.moderation_status)?,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            created_at: row.created_at,
        })
    }
}

impl From<&Post> for PostRow {
    fn from(p: &Post) -> Self {
        Self {
            id: p.id,
            circle_id: p.circle_id,
            author_id: p.author_id,
            content: p.content.clone(),
            media_keys: p.media_keys.clone(),
            moderation_status: p.moderation_status.to_string(),
            reviewed_by: p.reviewed_by,
            reviewed_at: p.reviewed_at,
            created_at: p.created_at,
        }
    }
}

impl TryFrom<ConcernRow> for Concern {
    type Error = AppError;

    fn try_from(row: ConcernRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            circle_id: row.circle_id,
            post_id: row.post_id,
            kind: parse(&row.kind)?,
            reason: row.reason,
            raised_by: row.raised_by,
            resolution: parse(&row.resolution)?,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
        })
    }
}

impl From<&Concern> for ConcernRow {
    fn from(c: &Concern) -> Self {
        Self {
            id: c.id,
            circle_id: c.circle_id,
            post_id: c.post_id,
            kind: c.kind.to_string(),
            reason: c.reason.clone(),
            raised_by: c.raised_by,
            resolution: c.resolution.to_string(),
            resolved_by: c.resolved_by,
            resolved_at: c.resolved_at,
            created_at: c.created_at,
        }
    }
}

impl TryFrom<ActionRow> for ModerationAction {
    type Error = AppError;

    fn try_from(row: ActionRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            circle_id: row.circle_id,
            admin_id: row.admin_id,
            action: parse(&row.action)?,
            target_user_id: row.target_user_id,
            target_post_id: row.target_post_id,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

impl From<&ModerationAction> for ActionRow {
    fn from(a: &ModerationAction) -> Self {
        Self {
            id: a.id,
            circle_id: a.circle_id,
            admin_id: a.admin_id,
            action: a.action.to_string(),
            target_user_id: a.target_user_id,
            target_post_id: a.target_post_id,
            reason: a.reason.clone(),
            created_at: a.created_at,
        }
    }
}

fn convert_all<R, T: TryFrom<R, Error = AppError>>(rows: Vec<R>) -> AppResult<Vec<T>> {
    rows.into_iter().map(T::try_from).collect()
}

fn expect_one(rows: usize, what: &str, id: Uuid) -> AppResult<()> {
    if rows == 0 {
        return Err(AppError::internal(format!("{what} {id} vanished inside its transaction")));
    }
    Ok(())
}

// --- Store ---

impl CircleStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn ping(&self) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    fn create_circle(&self, circle: &Circle, founder: &Membership) -> AppResult<()> {
        let mut pooled = checkout(&self.pool)?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<_, AppError, _>(|conn| {
            diesel::insert_into(circles::table)
                .values(&CircleRow::from(circle))
                .execute(conn)?;
            diesel::insert_into(circle_memberships::table)
                .values(&MembershipRow::from(founder))
                .execute(conn)?;
            Ok(())
        })
    }

    fn locate(&self, record: RecordRef) -> AppResult<Option<Uuid>> {
        let mut conn = checkout(&self.pool)?;
        let circle_id = match record {
            RecordRef::Membership(id) => circle_memberships::table
                .find(id)
                .select(circle_memberships::circle_id)
                .first::<Uuid>(&mut conn)
                .optional()?,
            RecordRef::Post(id) => circle_posts::table
                .find(id)
                .select(circle_posts::circle_id)
                .first::<Uuid>(&mut conn)
                .optional()?,
            RecordRef::Concern(id) => post_concerns::table
                .find(id)
                .select(post_concerns::circle_id)
                .first::<Uuid>(&mut conn)
                .optional()?,
        };
        Ok(circle_id)
    }

    fn transaction<T, F>(&self, circle_id: Uuid, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut dyn CircleTx) -> AppResult<T>,
    {
        let mut pooled = checkout(&self.pool)?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<T, AppError, _>(|conn| {
            let row = circles::table
                .find(circle_id)
                .for_update()
                .first::<CircleRow>(conn)
                .optional()?
                .ok_or_else(|| AppError::new(ErrorCode::CircleNotFound, "circle not found"))?;

            let mut tx = PgTx {
                conn,
                circle: Circle::try_from(row)?,
            };
            f(&mut tx)
        })
    }
}

struct PgTx<'c> {
    conn: &'c mut PgConnection,
    circle: Circle,
}

impl CircleTx for PgTx<'_> {
    fn circle(&self) -> &Circle {
        &self.circle
    }

    fn membership(&mut self, id: Uuid) -> AppResult<Option<Membership>> {
        circle_memberships::table
            .filter(circle_memberships::id.eq(id))
            .filter(circle_memberships::circle_id.eq(self.circle.id))
            .first::<MembershipRow>(self.conn)
            .optional()?
            .map(Membership::try_from)
            .transpose()
    }

    fn membership_of(&mut self, user_id: Uuid) -> AppResult<Option<Membership>> {
        circle_memberships::table
            .filter(circle_memberships::circle_id.eq(self.circle.id))
            .filter(circle_memberships::user_id.eq(user_id))
            .first::<MembershipRow>(self.conn)
            .optional()?
            .map(Membership::try_from)
            .transpose()
    }

    fn memberships(&mut self) -> AppResult<Vec<Membership>> {
        let rows = circle_memberships::table
            .filter(circle_memberships::circle_id.eq(self.circle.id))
            .order(circle_memberships::joined_at.asc())
            .load::<MembershipRow>(self.conn)?;
        convert_all(rows)
    }

    fn count_memberships(&mut self, status: MembershipStatus) -> AppResult<i64> {
        Ok(circle_memberships::table
            .filter(circle_memberships::circle_id.eq(self.circle.id))
            .filter(circle_memberships::status.eq(status.as_str()))
            .count()
            .get_result(self.conn)?)
    }

    fn count_active_admins(&mut self) -> AppResult<i64> {
        Ok(circle_memberships::table
            .filter(circle_memberships::circle_id.eq(self.circle.id))
            .filter(circle_memberships::role.eq("admin"))
            .filter(circle_memberships::status.eq("active"))
            .count()
            .get_result(self.conn)?)
    }

    fn insert_membership(&mut self, membership: &Membership) -> AppResult<()> {
        diesel::insert_into(circle_memberships::table)
            .values(&MembershipRow::from(membership))
            .execute(self.conn)?;
        Ok(())
    }

    fn update_membership(&mut self, membership: &Membership) -> AppResult<()> {
        let rows = diesel::update(circle_memberships::table.find(membership.id))
            .set(&MembershipRow::from(membership))
            .execute(self.conn)?;
        expect_one(rows, "membership", membership.id)
    }

    fn delete_membership(&mut self, id: Uuid) -> AppResult<()> {
        let rows = diesel::delete(circle_memberships::table.find(id)).execute(self.conn)?;
        expect_one(rows, "membership", id)
    }

    fn post(&mut self, id: Uuid) -> AppResult<Option<Post>> {
        circle_posts::table
            .filter(circle_posts::id.eq(id))
            .filter(circle_posts::circle_id.eq(self.circle.id))
            .first::<PostRow>(self.conn)
            .optional()?
            .map(Post::try_from)
            .transpose()
    }

    fn posts(&mut self, status: PostModerationStatus, offset: i64, limit: i64) -> AppResult<Vec<Post>> {
        let rows = circle_posts::table
            .filter(circle_posts::circle_id.eq(self.circle.id))
            .filter(circle_posts::moderation_status.eq(status.as_str()))
            .order(circle_posts::created_at.desc())
            .offset(offset)
            .limit(limit)
            .load::<PostRow>(self.conn)?;
        convert_all(rows)
    }

    fn count_posts(&mut self, status: PostModerationStatus) -> AppResult<i64> {
        Ok(circle_posts::table
            .filter(circle_posts::circle_id.eq(self.circle.id))
            .filter(circle_posts::moderation_status.eq(status.as_str()))
            .count()
            .get_result(self.conn)?)
    }

    fn insert_post(&mut self, post: &Post) -> AppResult<()> {
        diesel::insert_into(circle_posts::table)
            .values(&PostRow::from(post))
            .execute(self.conn)?;
        Ok(())
    }

    fn update_post(&mut self, post: &Post) -> AppResult<()> {
        let rows = diesel::update(circle_posts::table.find(post.id))
            .set(&PostRow::from(post))
            .execute(self.conn)?;
        expect_one(rows, "post", post.id)
    }

    fn delete_post(&mut self, id: Uuid) -> AppResult<()> {
        let rows = diesel::delete(circle_posts::table.find(id)).execute(self.conn)?;
        expect_one(rows, "post", id)
    }

    fn concern(&mut self, id: Uuid) -> AppResult<Option<Concern>> {
        post_concerns::table
            .filter(post_concerns::id.eq(id))
            .filter(post_concerns::circle_id.eq(self.circle.id))
            .first::<ConcernRow>(self.conn)
            .optional()?
            .map(Concern::try_from)
            .transpose()
    }

    fn concerns_for_post(&mut self, post_id: Uuid) -> AppResult<Vec<Concern>> {
        let rows = post_concerns::table
            .filter(post_concerns::circle_id.eq(self.circle.id))
            .filter(post_concerns::post_id.eq(post_id))
            .order(post_concerns::created_at.asc())
            .load::<ConcernRow>(self.conn)?;
        convert_all(rows)
    }

    fn open_concerns(&mut self, kind: ConcernKind, limit: i64) -> AppResult<Vec<Concern>> {
        let rows = post_concerns::table
            .filter(post_concerns::circle_id.eq(self.circle.id))
            .filter(post_concerns::kind.eq(kind.as_str()))
            .filter(post_concerns::resolution.eq("open"))
            .order(post_concerns::created_at.asc())
            .limit(limit)
            .load::<ConcernRow>(self.conn)?;
        convert_all(rows)
    }

    fn count_open_concerns(&mut self, kind: ConcernKind) -> AppResult<i64> {
        Ok(post_concerns::table
            .filter(post_concerns::circle_id.eq(self.circle.id))
            .filter(post_concerns::kind.eq(kind.as_str()))
            .filter(post_concerns::resolution.eq("open"))
            .count()
            .get_result(self.conn)?)
    }

    fn insert_concern(&mut self, concern: &Concern) -> AppResult<()> {
        diesel::insert_into(post_concerns::table)
            .values(&ConcernRow::from(concern))
            .execute(self.conn)?;
        Ok(())
    }

    fn update_concern(&mut self, concern: &Concern) -> AppResult<()> {
        let rows = diesel::update(post_concerns::table.find(concern.id))
            .set(&ConcernRow::from(concern))
            .execute(self.conn)?;
        expect_one(rows, "concern", concern.id)
    }

    fn record_action(&mut self, action: &ModerationAction) -> AppResult<()> {
        diesel::insert_into(moderation_actions::table)
            .values(&ActionRow::from(action))
            .execute(self.conn)?;
        Ok(())
    }

    fn actions(&mut self, offset: i64, limit: i64) -> AppResult<Vec<ModerationAction>> {
        let rows = moderation_actions::table
            .filter(moderation_actions::circle_id.eq(self.circle.id))
            .order(moderation_actions::created_at.desc())
            .offset(offset)
            .limit(limit)
            .load::<ActionRow>(self.conn)?;
        convert_all(rows)
    }

    fn count_actions(&mut self) -> AppResult<i64> {
        Ok(moderation_actions::table
            .filter(moderation_actions::circle_id.eq(self.circle.id))
            .count()
            .get_result(self.conn)?)
    }
}

/// Runs against a scratch database named by `DATABASE_URL`; the schema is
/// dropped and recreated on first use.
/// `DATABASE_URL=postgres://... cargo test -p circles-moderation -- --ignored`
#[cfg(test)]
mod tests {
    use std::sync::{Barrier, OnceLock};

    use diesel::connection::SimpleConnection;

    use super::*;
    use circles_shared::clients::db::create_pool;

    use crate::engine::testing::{code, Fixture};
    use crate::models::{ConcernResolution, Decision, MembershipStatus, Visibility};

    const UP: &str = include_str!("../../migrations/2026-10-01-000000_create_circles/up.sql");
    const DOWN: &str = include_str!("../../migrations/2026-10-01-000000_create_circles/down.sql");

    fn store() -> PgStore {
        static POOL: OnceLock<DbPool> = OnceLock::new();
        let pool = POOL.get_or_init(|| {
            let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database");
            let pool = create_pool(&url, 8).unwrap();
            let mut conn = pool.get().unwrap();
            let _ = conn.batch_execute(DOWN);
            conn.batch_execute(UP).unwrap();
            pool
        });
        PgStore::new(pool.clone())
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn ping_and_locate() {
        let fx = Fixture::on(store(), Visibility::Private, true);
        fx.engine.store().ping().unwrap();
        let user = fx.member();
        let membership = fx.membership(user).unwrap();
        assert_eq!(
            fx.engine.store().locate(RecordRef::Membership(membership.id)).unwrap(),
            Some(fx.circle.id)
        );
        assert_eq!(fx.engine.store().locate(RecordRef::Post(Uuid::now_v7())).unwrap(), None);
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn two_admins_promoting_at_once_yield_one_success() {
        let fx = Fixture::on(store(), Visibility::Private, true);
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

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn restriction_survives_a_round_trip() {
        let fx = Fixture::on(store(), Visibility::Public, false);
        let user = fx.member();
        fx.engine.restrict(user, fx.circle.id, fx.founder, Some(3), Some("cool off".into())).unwrap();

        let stored = fx.membership(user).unwrap();
        assert_eq!(stored.status, MembershipStatus::Restricted);
        assert!(stored.restricted_until.is_some());
        assert!(fx.engine.is_restricted(user, fx.circle.id).unwrap());
    }

    #[test]
    #[ignore = "needs DATABASE_URL"]
    fn removing_a_flagged_post_moots_its_reports() {
        let fx = Fixture::on(store(), Visibility::Private, true);
        let author = fx.member();
        let post = fx
            .engine
            .submit_post(author, fx.circle.id, "late night".into(), vec!["media/a.jpg".into()])
            .unwrap();
        fx.engine.approve_post(post.id, fx.founder).unwrap();
        let flag = fx.engine.flag_post(post.id, "nsfw".into(), None).unwrap();
        let report = fx.engine.report_post(fx.member(), post.id, "spam".into()).unwrap();

        let outcome = fx.engine.resolve_flag(flag.id, Decision::Remove, fx.founder).unwrap();
        let removed = outcome.removed.unwrap();
        assert_eq!(removed.post.media_keys, vec!["media/a.jpg".to_string()]);
        assert_eq!(removed.mooted.len(), 1);
        assert_eq!(removed.mooted[0].id, report.id);
        assert_eq!(removed.mooted[0].resolution, ConcernResolution::Moot);
        assert_eq!(fx.engine.store().locate(RecordRef::Post(post.id)).unwrap(), None);
        assert_eq!(code(fx.engine.resolve_report(report.id, Decision::Keep, fx.founder)), ErrorCode::AlreadyResolved);
    }
}
