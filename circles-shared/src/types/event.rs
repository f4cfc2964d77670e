use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `circles.{entity}.{action}`
/// Example: `circles.membership.approved`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Membership events
    pub const MEMBERSHIP_REQUESTED: &str = "circles.membership.requested";
    pub const MEMBERSHIP_APPROVED: &str = "circles.membership.approved";
    pub const MEMBERSHIP_REJECTED: &str = "circles.membership.rejected";
    pub const MEMBERSHIP_REMOVED: &str = "circles.membership.removed";

    // Role events
    pub const ROLE_PROMOTED: &str = "circles.role.promoted";
    pub const ROLE_DEMOTED: &str = "circles.role.demoted";

    // Sanction events
    pub const SANCTION_RESTRICTED: &str = "circles.sanction.restricted";
    pub const SANCTION_BANNED: &str = "circles.sanction.banned";
    pub const SANCTION_LIFTED: &str = "circles.sanction.lifted";

    // Content events
    pub const POST_SUBMITTED: &str = "circles.post.submitted";
    pub const POST_APPROVED: &str = "circles.post.approved";
    pub const POST_REMOVED: &str = "circles.post.removed";
    pub const CONCERN_RESOLVED: &str = "circles.concern.resolved";
}

/// Common event data payloads
pub mod payloads {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MembershipChanged {
        pub membership_id: Uuid,
        pub circle_id: Uuid,
        pub user_id: Uuid,
        pub status: String,
        pub acted_by: Option<Uuid>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RoleChanged {
        pub circle_id: Uuid,
        pub user_id: Uuid,
        pub role: String,
        pub acted_by: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SanctionIssued {
        pub circle_id: Uuid,
        pub user_id: Uuid,
        pub sanction_type: String,
        pub reason: Option<String>,
        pub expires_at: Option<DateTime<Utc>>,
        pub issued_by: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SanctionLifted {
        pub circle_id: Uuid,
        pub user_id: Uuid,
        pub lifted_by: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PostModerated {
        pub post_id: Uuid,
        pub circle_id: Uuid,
        pub author_id: Uuid,
        pub moderation_status: String,
        pub acted_by: Option<Uuid>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ConcernResolved {
        pub concern_id: Uuid,
        pub post_id: Uuid,
        pub circle_id: Uuid,
        pub kind: String,
        pub resolution: String,
        pub resolved_by: Uuid,
    }
}
