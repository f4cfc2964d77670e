use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed string-backed enums. Each variant maps to the exact value stored in
/// the database and sent over the wire.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $value)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(format!("unknown {}: {s}", stringify!($name))),
                }
            }
        }
    };
}

string_enum!(Visibility {
    Public => "public",
    Private => "private",
});

string_enum!(MemberRole {
    Member => "member",
    Admin => "admin",
});

string_enum!(MembershipStatus {
    Active => "active",
    PendingRequest => "pending_request",
    Restricted => "restricted",
    Banned => "banned",
});

string_enum!(PostModerationStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

string_enum!(ConcernKind {
    Flag => "flag",
    Report => "report",
});

string_enum!(ConcernResolution {
    Open => "open",
    Approved => "approved",
    Rejected => "rejected",
    Moot => "moot",
});

string_enum!(Decision {
    Keep => "keep",
    Remove => "remove",
});

string_enum!(ModerationActionKind {
    ApproveRequest => "approve_request",
    RejectRequest => "reject_request",
    PromoteAdmin => "promote_admin",
    DemoteAdmin => "demote_admin",
    Restrict => "restrict",
    LiftRestriction => "lift_restriction",
    Ban => "ban",
    Unban => "unban",
    RemoveMember => "remove_member",
    ApprovePost => "approve_post",
    RejectPost => "reject_post",
    KeepFlagged => "keep_flagged",
    RemoveFlagged => "remove_flagged",
    KeepReported => "keep_reported",
    RemoveReported => "remove_reported",
});

// --- Circle ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Circle {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub requires_post_approval: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// --- Membership ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Membership {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub status: MembershipStatus,
    /// Set only while `status` is `Restricted`.
    pub restricted_until: Option<DateTime<Utc>>,
    pub ban_reason: Option<String>,
    pub request_message: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(circle_id: Uuid, user_id: Uuid, status: MembershipStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            circle_id,
            user_id,
            role: MemberRole::Member,
            status,
            restricted_until: None,
            ban_reason: None,
            request_message: None,
            joined_at: now,
            updated_at: now,
        }
    }

    /// Whether a restriction is in force at `now`. The stored status alone is
    /// not enough: a restriction whose end has passed no longer applies even
    /// if nothing has rewritten the record yet.
    pub fn is_restricted(&self, now: DateTime<Utc>) -> bool {
        self.status == MembershipStatus::Restricted
            && self.restricted_until.map_or(false, |until| now < until)
    }

    /// Status as observed at `now`, with expired restrictions read as active.
    pub fn effective_status(&self, now: DateTime<Utc>) -> MembershipStatus {
        match self.status {
            MembershipStatus::Restricted if !self.is_restricted(now) => MembershipStatus::Active,
            status => status,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == MembershipStatus::Active
    }

    pub fn is_active_admin(&self, now: DateTime<Utc>) -> bool {
        self.role == MemberRole::Admin && self.is_active(now)
    }

    /// Rewrites an expired restriction to `Active` in place. Called by every
    /// write path before it inspects the status. Returns whether anything changed.
    pub fn materialize(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == MembershipStatus::Restricted && !self.is_restricted(now) {
            self.status = MembershipStatus::Active;
            self.restricted_until = None;
            self.updated_at = now;
            true
        } else {
            false
        }
    }
}

/// A membership as shown to admins, with its time-aware status.
#[derive(Debug, Clone, Serialize)]
pub struct MemberSummary {
    #[serde(flatten)]
    pub membership: Membership,
    pub effective_status: MembershipStatus,
    pub is_admin: bool,
}

impl MemberSummary {
    pub fn at(membership: Membership, now: DateTime<Utc>) -> Self {
        Self {
            effective_status: membership.effective_status(now),
            is_admin: membership.is_active_admin(now),
            membership,
        }
    }
}

/// A user's standing in a circle, as seen by that user.
#[derive(Debug, Clone, Serialize)]
pub struct MembershipStanding {
    pub circle_id: Uuid,
    pub user_id: Uuid,
    pub status: Option<MembershipStatus>,
    pub is_admin: bool,
    pub is_restricted: bool,
    pub restricted_until: Option<DateTime<Utc>>,
}

// --- Post ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub media_keys: Vec<String>,
    pub moderation_status: PostModerationStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn is_visible(&self) -> bool {
        self.moderation_status == PostModerationStatus::Approved
    }
}

// --- Flags and reports ---

/// A flag (automated or system-raised) or a member report against an
/// approved post. Both kinds share one shape and one resolution contract but
/// are counted and resolved independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Concern {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub post_id: Uuid,
    pub kind: ConcernKind,
    pub reason: String,
    /// `None` when raised by the automated scanner.
    pub raised_by: Option<Uuid>,
    pub resolution: ConcernResolution,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Concern {
    pub fn is_open(&self) -> bool {
        self.resolution == ConcernResolution::Open
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConcernWithPost {
    #[serde(flatten)]
    pub concern: Concern,
    pub post: Option<Post>,
}

// --- Audit trail ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationAction {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub admin_id: Uuid,
    pub action: ModerationActionKind,
    pub target_user_id: Option<Uuid>,
    pub target_post_id: Option<Uuid>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
