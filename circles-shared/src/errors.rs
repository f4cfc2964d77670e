use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Coarse failure classes surfaced to the moderation console.
///
/// Every `ErrorCode` belongs to exactly one kind; the kind decides the HTTP
/// status and is rendered alongside the code so clients can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    NotAuthorized,
    NotFound,
    AlreadyResolved,
    InvariantViolation,
    InvalidState,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NotAuthorized => "not_authorized",
            Self::NotFound => "not_found",
            Self::AlreadyResolved => "already_resolved",
            Self::InvariantViolation => "invariant_violation",
            Self::InvalidState => "invalid_state",
            Self::Validation => "validation",
            Self::Internal => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotAuthorized => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyResolved | Self::InvariantViolation | Self::InvalidState => StatusCode::CONFLICT,
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application error codes following the pattern E{range}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Circle and membership errors
/// - E2xxx: Role and sanction errors
/// - E3xxx: Content moderation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    Unauthorized,
    TokenExpired,
    TokenInvalid,

    // Circles & membership (E1xxx)
    CircleNotFound,
    MembershipNotFound,
    AlreadyMember,
    DuplicateRequest,
    AlreadyResolved,
    NotCircleMember,
    MemberBanned,
    MemberRestricted,
    InvalidMembershipState,

    // Roles & sanctions (E2xxx)
    NotCircleAdmin,
    AdminCapExceeded,
    SelfTargetForbidden,

    // Content moderation (E3xxx)
    PostNotFound,
    InvalidPostState,
    ConcernNotFound,
    DuplicateFlag,
    DuplicateReport,
    CannotReportOwnPost,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::Unauthorized => "E0004",
            Self::TokenExpired => "E0007",
            Self::TokenInvalid => "E0008",

            // Circles & membership
            Self::CircleNotFound => "E1001",
            Self::MembershipNotFound => "E1002",
            Self::AlreadyMember => "E1003",
            Self::DuplicateRequest => "E1004",
            Self::AlreadyResolved => "E1005",
            Self::NotCircleMember => "E1006",
            Self::MemberBanned => "E1007",
            Self::MemberRestricted => "E1008",
            Self::InvalidMembershipState => "E1009",

            // Roles & sanctions
            Self::NotCircleAdmin => "E2001",
            Self::AdminCapExceeded => "E2002",
            Self::SelfTargetForbidden => "E2003",

            // Content moderation
            Self::PostNotFound => "E3001",
            Self::InvalidPostState => "E3002",
            Self::ConcernNotFound => "E3003",
            Self::DuplicateFlag => "E3004",
            Self::DuplicateReport => "E3005",
            Self::CannotReportOwnPost => "E3006",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InternalError => ErrorKind::Internal,
            Self::ValidationError => ErrorKind::Validation,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid => ErrorKind::Unauthenticated,
            Self::NotCircleAdmin | Self::NotCircleMember | Self::MemberBanned
            | Self::MemberRestricted => ErrorKind::NotAuthorized,
            Self::CircleNotFound | Self::MembershipNotFound | Self::PostNotFound
            | Self::ConcernNotFound => ErrorKind::NotFound,
            Self::AlreadyResolved => ErrorKind::AlreadyResolved,
            Self::AlreadyMember | Self::DuplicateRequest | Self::AdminCapExceeded
            | Self::SelfTargetForbidden | Self::DuplicateFlag | Self::DuplicateReport
            | Self::CannotReportOwnPost => ErrorKind::InvariantViolation,
            Self::InvalidMembershipState | Self::InvalidPostState => ErrorKind::InvalidState,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known { code: ErrorCode, message: String },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
        }
    }

    /// An infrastructure failure. The message is logged, never shown to clients.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn already_resolved(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyResolved, message)
    }

    /// The error code, when this is a known domain error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Known { code, .. } => Some(*code),
            AppError::Validation(_) => Some(ErrorCode::ValidationError),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Known { code, .. } => code.kind(),
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Internal(_) | AppError::Database(_) => ErrorKind::Internal,
        }
    }
}

fn internal_response() -> (StatusCode, ApiErrorResponse) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiErrorResponse::new(ErrorCode::InternalError.code(), ErrorKind::Internal, "internal server error"),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message } if code.kind() == ErrorKind::Internal => {
                tracing::error!(code = code.code(), error = %message, "internal server error");
                internal_response()
            }
            AppError::Known { code, message } => (
                code.status_code(),
                ApiErrorResponse::new(code.code(), code.kind(), message),
            ),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                internal_response()
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                internal_response()
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new(ErrorCode::ValidationError.code(), ErrorKind::Validation, msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
