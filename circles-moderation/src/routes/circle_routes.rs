use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use circles_shared::errors::{AppError, AppResult, ErrorCode};
use circles_shared::middleware::OptionalJson;
use circles_shared::types::api::ApiResponse;
use circles_shared::types::auth::AuthUser;
use circles_shared::types::pagination::{Paginated, PaginationParams};

use super::run;
use crate::engine::NewCircle;
use crate::events::publisher;
use crate::models::{Circle, Concern, Membership, MembershipStanding, MembershipStatus, Post, PostModerationStatus, Visibility};
use crate::store::CircleStore;
use crate::AppState;

// --- Request types ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCircleRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 2000, message = "description is too long"))]
    pub description: Option<String>,
    pub visibility: Visibility,
    #[serde(default)]
    pub requires_post_approval: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct JoinRequest {
    #[validate(length(max = 500, message = "message is too long"))]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitPostRequest {
    #[serde(default)]
    #[validate(length(max = 5000, message = "content is too long"))]
    pub content: String,
    #[serde(default)]
    #[validate(length(max = 10, message = "at most 10 attachments"))]
    pub media_keys: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReportRequest {
    #[validate(length(min = 1, max = 500, message = "reason must be 1-500 characters"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FlagRequest {
    #[validate(length(min = 1, max = 500, message = "reason must be 1-500 characters"))]
    pub reason: String,
    /// Absent when raised by the automated scanner.
    pub raised_by: Option<Uuid>,
}

pub(crate) fn validated<T: Validate>(body: &T) -> AppResult<()> {
    body.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))
}

// --- Circles and membership ---

pub async fn create_circle<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Json(body): Json<CreateCircleRequest>,
) -> AppResult<Json<ApiResponse<Circle>>> {
    validated(&body)?;
    let new = NewCircle {
        name: body.name,
        description: body.description,
        visibility: body.visibility,
        requires_post_approval: body.requires_post_approval,
    };

    let circle = run(&state, "create_circle", move |engine| engine.create_circle(user.id, new)).await?;
    Ok(Json(ApiResponse::ok_with_message(circle, "circle created")))
}

pub async fn request_join<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(circle_id): Path<Uuid>,
    OptionalJson(body): OptionalJson<JoinRequest>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    validated(&body)?;

    let membership = run(&state, "request_join", move |engine| {
        engine.request_join(user.id, circle_id, body.message)
    })
    .await?;

    publisher::publish_membership_requested(&state.events, &membership).await;

    let message = match membership.status {
        MembershipStatus::PendingRequest => "join request sent; an admin will review it",
        _ => "you joined the circle",
    };
    Ok(Json(ApiResponse::ok_with_message(membership, message)))
}

pub async fn leave<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(circle_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    let membership = run(&state, "leave", move |engine| engine.leave(user.id, circle_id)).await?;

    publisher::publish_membership_removed(&state.events, &membership, None).await;

    Ok(Json(ApiResponse::ok_with_message(membership, "you left the circle")))
}

pub async fn membership_status<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(circle_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MembershipStanding>>> {
    let standing = run(&state, "membership_status", move |engine| {
        engine.membership_standing(user.id, circle_id)
    })
    .await?;
    Ok(Json(ApiResponse::ok(standing)))
}

// --- Posts ---

pub async fn list_posts<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    viewer: Option<AuthUser>,
    Path(circle_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Post>>>> {
    let viewer = viewer.map(|v| v.id);
    let page = run(&state, "visible_posts", move |engine| {
        engine.visible_posts(circle_id, viewer, &params)
    })
    .await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn submit_post<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(circle_id): Path<Uuid>,
    Json(body): Json<SubmitPostRequest>,
) -> AppResult<Json<ApiResponse<Post>>> {
    validated(&body)?;

    let post = run(&state, "submit_post", move |engine| {
        engine.submit_post(user.id, circle_id, body.content, body.media_keys)
    })
    .await?;

    publisher::publish_post_submitted(&state.events, &post).await;

    let message = match post.moderation_status {
        PostModerationStatus::Pending => "post submitted for review",
        _ => "post published",
    };
    Ok(Json(ApiResponse::ok_with_message(post, message)))
}

pub async fn report_post<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(body): Json<ReportRequest>,
) -> AppResult<Json<ApiResponse<Concern>>> {
    validated(&body)?;

    let report = run(&state, "report_post", move |engine| {
        engine.report_post(user.id, post_id, body.reason)
    })
    .await?;
    Ok(Json(ApiResponse::ok_with_message(report, "report submitted")))
}

/// Scanner entry point. Not exposed through the public gateway.
pub async fn flag_post<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(post_id): Path<Uuid>,
    Json(body): Json<FlagRequest>,
) -> AppResult<Json<ApiResponse<Concern>>> {
    validated(&body)?;

    let flag = run(&state, "flag_post", move |engine| {
        engine.flag_post(post_id, body.reason, body.raised_by)
    })
    .await?;
    Ok(Json(ApiResponse::ok_with_message(flag, "post flagged")))
}
