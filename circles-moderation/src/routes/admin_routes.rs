use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use circles_shared::errors::AppResult;
use circles_shared::middleware::OptionalJson;
use circles_shared::types::api::ApiResponse;
use circles_shared::types::auth::AuthUser;
use circles_shared::types::pagination::{Paginated, PaginationParams};

use super::circle_routes::validated;
use super::{after_removal, run};
use crate::engine::{ConcernOutcome, ManagementSnapshot, RemovedPost};
use crate::events::publisher;
use crate::models::{Decision, Membership, ModerationAction, Post};
use crate::store::CircleStore;
use crate::AppState;

// --- Request types ---

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RestrictRequest {
    /// Falls back to the configured default when absent.
    #[validate(range(min = 1, message = "days must be positive"))]
    pub days: Option<i64>,
    #[validate(length(max = 500, message = "reason is too long"))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(max = 500, message = "reason is too long"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub decision: Decision,
}

// --- Join requests ---

pub async fn approve_request<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    let membership = run(&state, "approve_request", move |engine| {
        engine.approve_join(request_id, admin.id)
    })
    .await?;

    publisher::publish_membership_approved(&state.events, &membership, admin.id).await;

    Ok(Json(ApiResponse::ok_with_message(membership, "join request approved")))
}

pub async fn reject_request<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    let membership = run(&state, "reject_request", move |engine| {
        engine.reject_join(request_id, admin.id)
    })
    .await?;

    publisher::publish_membership_rejected(&state.events, &membership, admin.id).await;

    Ok(Json(ApiResponse::ok_with_message(membership, "join request rejected")))
}

// --- Roles ---

pub async fn promote<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path((circle_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    let membership = run(&state, "promote_admin", move |engine| {
        engine.promote(user_id, circle_id, admin.id)
    })
    .await?;

    publisher::publish_role_changed(&state.events, &membership, admin.id).await;

    Ok(Json(ApiResponse::ok_with_message(membership, "member promoted to admin")))
}

pub async fn demote<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path((circle_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    let membership = run(&state, "demote_admin", move |engine| {
        engine.demote(user_id, circle_id, admin.id)
    })
    .await?;

    publisher::publish_role_changed(&state.events, &membership, admin.id).await;

    Ok(Json(ApiResponse::ok_with_message(membership, "admin role removed")))
}

// --- Sanctions ---

pub async fn restrict<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path((circle_id, user_id)): Path<(Uuid, Uuid)>,
    OptionalJson(body): OptionalJson<RestrictRequest>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    validated(&body)?;
    let reason = body.reason.clone();

    let membership = run(&state, "restrict", move |engine| {
        engine.restrict(user_id, circle_id, admin.id, body.days, body.reason)
    })
    .await?;

    publisher::publish_sanction_issued(&state.events, &membership, admin.id, reason).await;

    let message = match membership.restricted_until {
        Some(until) => format!("member restricted until {}", until.format("%Y-%m-%d %H:%M UTC")),
        None => "member restricted".to_string(),
    };
    Ok(Json(ApiResponse::ok_with_message(membership, message)))
}

pub async fn ban<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path((circle_id, user_id)): Path<(Uuid, Uuid)>,
    OptionalJson(body): OptionalJson<ReasonRequest>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    validated(&body)?;
    let reason = body.reason.clone();

    let membership = run(&state, "ban", move |engine| {
        engine.ban(user_id, circle_id, admin.id, body.reason)
    })
    .await?;

    publisher::publish_sanction_issued(&state.events, &membership, admin.id, reason).await;

    Ok(Json(ApiResponse::ok_with_message(membership, "member banned")))
}

pub async fn unban<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path((circle_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    let membership = run(&state, "unban", move |engine| {
        engine.unban(user_id, circle_id, admin.id)
    })
    .await?;

    publisher::publish_sanction_lifted(&state.events, &membership, admin.id).await;

    Ok(Json(ApiResponse::ok_with_message(membership, "ban lifted")))
}

pub async fn lift_restriction<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path((circle_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    let membership = run(&state, "lift_restriction", move |engine| {
        engine.lift_restriction(user_id, circle_id, admin.id)
    })
    .await?;

    publisher::publish_sanction_lifted(&state.events, &membership, admin.id).await;

    Ok(Json(ApiResponse::ok_with_message(membership, "restriction lifted")))
}

pub async fn remove_member<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path((circle_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Membership>>> {
    let membership = run(&state, "remove_member", move |engine| {
        engine.remove_member(user_id, circle_id, admin.id)
    })
    .await?;

    publisher::publish_membership_removed(&state.events, &membership, Some(admin.id)).await;

    Ok(Json(ApiResponse::ok_with_message(membership, "member removed")))
}

// --- Posts ---

pub async fn approve_post<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Post>>> {
    let post = run(&state, "approve_post", move |engine| engine.approve_post(post_id, admin.id)).await?;

    publisher::publish_post_approved(&state.events, &post, admin.id).await;

    Ok(Json(ApiResponse::ok_with_message(post, "post approved")))
}

pub async fn reject_post<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(post_id): Path<Uuid>,
    OptionalJson(body): OptionalJson<ReasonRequest>,
) -> AppResult<Json<ApiResponse<RemovedPost>>> {
    validated(&body)?;

    let removed = run(&state, "reject_post", move |engine| {
        engine.reject_post(post_id, admin.id, body.reason)
    })
    .await?;

    after_removal(&state, &removed, admin.id).await;

    Ok(Json(ApiResponse::ok_with_message(removed, "post rejected and deleted")))
}

// --- Flags and reports ---

async fn concern_resolved<S: CircleStore>(state: &AppState<S>, outcome: &ConcernOutcome, admin_id: Uuid) -> String {
    publisher::publish_concern_resolved(&state.events, &outcome.concern, admin_id).await;
    match &outcome.removed {
        Some(removed) => {
            after_removal(state, removed, admin_id).await;
            format!("{} resolved; post removed", outcome.concern.kind)
        }
        None => format!("{} resolved; post kept", outcome.concern.kind),
    }
}

pub async fn approve_flagged<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ConcernOutcome>>> {
    let outcome = run(&state, "keep_flagged", move |engine| {
        engine.resolve_flag_for_post(post_id, Decision::Keep, admin.id)
    })
    .await?;

    let message = concern_resolved(&state, &outcome, admin.id).await;
    Ok(Json(ApiResponse::ok_with_message(outcome, message)))
}

pub async fn reject_flagged<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ConcernOutcome>>> {
    let outcome = run(&state, "remove_flagged", move |engine| {
        engine.resolve_flag_for_post(post_id, Decision::Remove, admin.id)
    })
    .await?;

    let message = concern_resolved(&state, &outcome, admin.id).await;
    Ok(Json(ApiResponse::ok_with_message(outcome, message)))
}

pub async fn resolve_flag<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(flag_id): Path<Uuid>,
    Json(body): Json<ResolveRequest>,
) -> AppResult<Json<ApiResponse<ConcernOutcome>>> {
    let outcome = run(&state, "resolve_flag", move |engine| {
        engine.resolve_flag(flag_id, body.decision, admin.id)
    })
    .await?;

    let message = concern_resolved(&state, &outcome, admin.id).await;
    Ok(Json(ApiResponse::ok_with_message(outcome, message)))
}

pub async fn resolve_report<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(report_id): Path<Uuid>,
    Json(body): Json<ResolveRequest>,
) -> AppResult<Json<ApiResponse<ConcernOutcome>>> {
    let outcome = run(&state, "resolve_report", move |engine| {
        engine.resolve_report(report_id, body.decision, admin.id)
    })
    .await?;

    let message = concern_resolved(&state, &outcome, admin.id).await;
    Ok(Json(ApiResponse::ok_with_message(outcome, message)))
}

// --- Console ---

pub async fn management_snapshot<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(circle_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ManagementSnapshot>>> {
    let snapshot = run(&state, "management_snapshot", move |engine| {
        engine.management_snapshot(circle_id, admin.id)
    })
    .await?;
    Ok(Json(ApiResponse::ok(snapshot)))
}

pub async fn moderation_log<S: CircleStore>(
    State(state): State<Arc<AppState<S>>>,
    admin: AuthUser,
    Path(circle_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<ModerationAction>>>> {
    let log = run(&state, "moderation_log", move |engine| {
        engine.moderation_log(circle_id, admin.id, &params)
    })
    .await?;
    Ok(Json(ApiResponse::ok(log)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use super::super::test_support::{id, TestApp};
    use super::*;

    #[tokio::test]
    async fn double_approve_reports_already_resolved() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "private", true).await;
        let (_, body) = app.post(&format!("/circles/{circle}/join"), Uuid::now_v7(), json!({})).await;
        let request = id(&body["data"]);

        let (status, body) = app.post(&format!("/requests/{request}/approve"), founder, Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "active");

        let (status, body) = app.post(&format!("/requests/{request}/approve"), founder, Value::Null).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "already_resolved");
        assert!(body["message"].as_str().unwrap().contains("already"));
    }

    #[tokio::test]
    async fn members_cannot_use_admin_commands() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", false).await;
        let member = app.member(circle, founder).await;

        let (status, body) = app.get(&format!("/circles/{circle}/manage"), member).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "E2001");
    }

    #[tokio::test]
    async fn fourth_admin_is_refused() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", false).await;
        for _ in 0..2 {
            let user = app.member(circle, founder).await;
            let (status, _) = app.post(&format!("/circles/{circle}/admins/{user}"), founder, Value::Null).await;
            assert_eq!(status, StatusCode::OK);
        }

        let user = app.member(circle, founder).await;
        let (status, body) = app.post(&format!("/circles/{circle}/admins/{user}"), founder, Value::Null).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "E2002");
        assert_eq!(body["message"], "a circle can have at most 3 admins");

        let (_, body) = app.get(&format!("/circles/{circle}/manage"), founder).await;
        assert_eq!(body["data"]["counts"]["active_admin_count"], 3);
    }

    #[tokio::test]
    async fn demote_uses_delete() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", false).await;
        let user = app.member(circle, founder).await;
        app.post(&format!("/circles/{circle}/admins/{user}"), founder, Value::Null).await;

        let (status, body) = app
            .send(Method::DELETE, &format!("/circles/{circle}/admins/{user}"), Some(founder), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["role"], "member");
        assert!(app.routing_keys().contains(&"circles.role.demoted".to_string()));
    }

    #[tokio::test]
    async fn restrict_defaults_and_refuses_self() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", false).await;
        let user = app.member(circle, founder).await;

        let (status, body) = app
            .send(Method::POST, &format!("/circles/{circle}/members/{user}/restrict"), Some(founder), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "restricted");
        assert!(body["message"].as_str().unwrap().starts_with("member restricted until"));

        let (_, standing) = app.get(&format!("/circles/{circle}/membership"), user).await;
        assert_eq!(standing["data"]["is_restricted"], true);

        let (status, body) = app
            .post(&format!("/circles/{circle}/members/{founder}/restrict"), founder, json!({ "days": 3 }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "E2003");
    }

    #[tokio::test]
    async fn mistyped_sanction_bodies_are_rejected() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", false).await;
        let user = app.member(circle, founder).await;
        let restrict = format!("/circles/{circle}/members/{user}/restrict");

        let (status, body) = app.post(&restrict, founder, json!({ "days": "30" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "E0002");
        assert_eq!(body["error"]["kind"], "validation");

        let (status, body) = app
            .post(&format!("/circles/{circle}/members/{user}/ban"), founder, json!({ "reason": 42 }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "E0002");

        let (_, standing) = app.get(&format!("/circles/{circle}/membership"), user).await;
        assert_eq!(standing["data"]["status"], "active");
        assert_eq!(standing["data"]["is_restricted"], false);

        let (status, body) = app.post(&restrict, founder, json!({ "days": 30 })).await;
        assert_eq!(status, StatusCode::OK);
        let until = body["data"]["restricted_until"].as_str().unwrap();
        let until = chrono::DateTime::parse_from_rfc3339(until).unwrap();
        assert_eq!((until.with_timezone(&chrono::Utc) - chrono::Utc::now()).num_days(), 29);
    }

    #[tokio::test]
    async fn ban_then_unban_round_trip() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", false).await;
        let user = app.member(circle, founder).await;

        let (status, _) = app
            .post(&format!("/circles/{circle}/members/{user}/ban"), founder, json!({ "reason": "spam" }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.post(&format!("/circles/{circle}/join"), user, json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "you are banned from this circle");

        let (status, body) = app.post(&format!("/circles/{circle}/members/{user}/unban"), founder, Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "active");

        let keys = app.routing_keys();
        assert!(keys.contains(&"circles.sanction.banned".to_string()));
        assert!(keys.contains(&"circles.sanction.lifted".to_string()));
    }

    #[tokio::test]
    async fn remove_member_then_not_found() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", false).await;
        let user = app.member(circle, founder).await;
        let uri = format!("/circles/{circle}/members/{user}");

        let (status, _) = app.send(Method::DELETE, &uri, Some(founder), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = app.send(Method::DELETE, &uri, Some(founder), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "E1002");
    }

    #[tokio::test]
    async fn rejecting_pending_post_drops_pending_count() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", true).await;
        let author = app.member(circle, founder).await;
        let (_, body) = app
            .post(&format!("/circles/{circle}/posts"), author, json!({ "content": "draft" }))
            .await;
        assert_eq!(body["message"], "post submitted for review");
        let post = id(&body["data"]);

        let (_, before) = app.get(&format!("/circles/{circle}/manage"), founder).await;
        assert_eq!(before["data"]["counts"]["pending_post_count"], 1);
        assert_eq!(before["data"]["pending_posts"][0]["id"], post.to_string());

        let (status, _) = app.post(&format!("/posts/{post}/reject"), founder, json!({ "reason": "off topic" })).await;
        assert_eq!(status, StatusCode::OK);
        let (_, after) = app.get(&format!("/circles/{circle}/manage"), founder).await;
        assert_eq!(after["data"]["counts"]["pending_post_count"], 0);

        let (status, _) = app.post(&format!("/posts/{post}/reject"), founder, Value::Null).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(app.routing_keys().contains(&"circles.post.removed".to_string()));
    }

    #[tokio::test]
    async fn reject_flagged_moots_report() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", false).await;
        let author = app.member(circle, founder).await;
        let reader = app.member(circle, founder).await;
        let (_, body) = app
            .post(&format!("/circles/{circle}/posts"), author, json!({ "content": "questionable" }))
            .await;
        let post = id(&body["data"]);

        app.send(Method::POST, &format!("/internal/posts/{post}/flag"), None, Some(json!({ "reason": "nsfw" })))
            .await;
        app.post(&format!("/posts/{post}/report"), reader, json!({ "reason": "spam" })).await;

        let (status, body) = app.post(&format!("/posts/{post}/flag/reject"), founder, Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["concern"]["resolution"], "rejected");
        assert_eq!(body["data"]["removed"]["mooted"][0]["kind"], "report");
        assert_eq!(body["data"]["removed"]["mooted"][0]["resolution"], "moot");
        assert_eq!(body["message"], "flag resolved; post removed");

        let (_, snapshot) = app.get(&format!("/circles/{circle}/manage"), founder).await;
        assert_eq!(snapshot["data"]["counts"]["open_flag_count"], 0);
        assert_eq!(snapshot["data"]["counts"]["open_report_count"], 0);
        assert_eq!(snapshot["data"]["counts"]["total_pending"], 0);

        let (status, _) = app.post(&format!("/posts/{post}/flag/reject"), founder, Value::Null).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn resolve_report_by_id_keeps_post() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "public", false).await;
        let author = app.member(circle, founder).await;
        let reader = app.member(circle, founder).await;
        let (_, body) = app
            .post(&format!("/circles/{circle}/posts"), author, json!({ "content": "fine" }))
            .await;
        let post = id(&body["data"]);
        let (_, body) = app.post(&format!("/posts/{post}/report"), reader, json!({ "reason": "meh" })).await;
        let report = id(&body["data"]);

        let (status, body) = app
            .post(&format!("/reports/{report}/resolve"), founder, json!({ "decision": "keep" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["concern"]["resolution"], "approved");
        assert!(body["data"]["removed"].is_null());

        let (_, feed) = app.get(&format!("/circles/{circle}/posts"), reader).await;
        assert_eq!(feed["data"]["total"], 1);
    }

    #[tokio::test]
    async fn moderation_log_is_paginated() {
        let app = TestApp::new();
        let founder = Uuid::now_v7();
        let circle = app.circle(founder, "private", true).await;
        for _ in 0..3 {
            app.member(circle, founder).await;
        }

        let (status, body) = app
            .get(&format!("/circles/{circle}/moderation-log?page=1&per_page=2"), founder)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["total_pages"], 2);
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["items"][0]["action"], "approve_request");
    }
}
