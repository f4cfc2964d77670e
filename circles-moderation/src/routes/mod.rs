pub mod admin_routes;
pub mod circle_routes;
pub mod health;

use std::sync::Arc;

use uuid::Uuid;

use circles_shared::errors::{AppError, AppResult, ErrorKind};
use circles_shared::middleware::record_command;

use crate::engine::{ModerationEngine, RemovedPost};
use crate::events::publisher;
use crate::store::CircleStore;
use crate::AppState;

/// Runs an engine command on the blocking pool and records its outcome.
pub(crate) async fn run<S, T, F>(state: &Arc<AppState<S>>, command: &'static str, f: F) -> AppResult<T>
where
    S: CircleStore,
    T: Send + 'static,
    F: FnOnce(&ModerationEngine<S>) -> AppResult<T> + Send + 'static,
{
    let state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || f(&state.engine))
        .await
        .map_err(|e| AppError::internal(format!("command task failed: {e}")))
        .and_then(|outcome| outcome);

    match &result {
        Ok(_) => record_command(command, "ok"),
        Err(e) => {
            let kind = e.kind();
            record_command(command, kind.as_str());
            if kind == ErrorKind::Internal {
                tracing::error!(command, error = %e, "command failed");
            } else {
                tracing::warn!(command, error = %e, "command refused");
            }
        }
    }
    result
}

/// Post-commit side effects of deleting a post: events for the post and for
/// each concern it mooted, then best-effort media deletion.
pub(crate) async fn after_removal<S: CircleStore>(state: &AppState<S>, removed: &RemovedPost, admin_id: Uuid) {
    publisher::publish_post_removed(&state.events, &removed.post, admin_id).await;
    for concern in &removed.mooted {
        publisher::publish_concern_resolved(&state.events, concern, admin_id).await;
    }

    let keys = &removed.post.media_keys;
    if keys.is_empty() {
        return;
    }
    match &state.media {
        Some(media) => {
            let deleted = media.delete_all(keys).await;
            tracing::info!(post_id = %removed.post.id, deleted, total = keys.len(), "post media cleaned up");
        }
        None => tracing::debug!(post_id = %removed.post.id, "media cleanup disabled"),
    }
}
