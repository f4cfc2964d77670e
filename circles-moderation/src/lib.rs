pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use circles_shared::clients::minio::MinioClient;
use circles_shared::middleware::metrics_middleware;

use config::AppConfig;
use engine::ModerationEngine;
use events::EventBus;
use routes::{admin_routes, circle_routes, health};
use store::CircleStore;

pub struct AppState<S> {
    pub engine: ModerationEngine<S>,
    pub config: AppConfig,
    pub events: EventBus,
    /// Present when post media cleanup is enabled.
    pub media: Option<MinioClient>,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn router<S: CircleStore>(state: Arc<AppState<S>>) -> Router {
    let member_routes = Router::new()
        .route("/circles", post(circle_routes::create_circle::<S>))
        .route("/circles/:id/join", post(circle_routes::request_join::<S>))
        .route("/circles/:id/leave", post(circle_routes::leave::<S>))
        .route("/circles/:id/membership", get(circle_routes::membership_status::<S>))
        .route(
            "/circles/:id/posts",
            get(circle_routes::list_posts::<S>).post(circle_routes::submit_post::<S>),
        )
        .route("/posts/:id/report", post(circle_routes::report_post::<S>))
        .route("/internal/posts/:id/flag", post(circle_routes::flag_post::<S>));

    let admin_routes = Router::new()
        .route("/requests/:id/approve", post(admin_routes::approve_request::<S>))
        .route("/requests/:id/reject", post(admin_routes::reject_request::<S>))
        .route(
            "/circles/:id/admins/:user_id",
            post(admin_routes::promote::<S>).delete(admin_routes::demote::<S>),
        )
        .route("/circles/:id/members/:user_id", delete(admin_routes::remove_member::<S>))
        .route("/circles/:id/members/:user_id/restrict", post(admin_routes::restrict::<S>))
        .route("/circles/:id/members/:user_id/ban", post(admin_routes::ban::<S>))
        .route("/circles/:id/members/:user_id/unban", post(admin_routes::unban::<S>))
        .route(
            "/circles/:id/members/:user_id/lift-restriction",
            post(admin_routes::lift_restriction::<S>),
        )
        .route("/posts/:id/approve", post(admin_routes::approve_post::<S>))
        .route("/posts/:id/reject", post(admin_routes::reject_post::<S>))
        .route("/posts/:id/flag/approve", post(admin_routes::approve_flagged::<S>))
        .route("/posts/:id/flag/reject", post(admin_routes::reject_flagged::<S>))
        .route("/flags/:id/resolve", post(admin_routes::resolve_flag::<S>))
        .route("/reports/:id/resolve", post(admin_routes::resolve_report::<S>))
        .route("/circles/:id/manage", get(admin_routes::management_snapshot::<S>))
        .route("/circles/:id/moderation-log", get(admin_routes::moderation_log::<S>));

    Router::new()
        .route("/health", get(health::health_check::<S>))
        .route("/metrics", get(health::metrics::<S>))
        .merge(member_routes)
        .merge(admin_routes)
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve<S: CircleStore>(state: Arc<AppState<S>>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let backend = state.engine.store().backend();
    let app = router(state);

    tracing::info!(addr = %addr, storage = backend, "circles-moderation starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
