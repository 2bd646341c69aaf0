use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};
use crate::storage;

/// Build the axum router with all Strata endpoints.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route(
            "/v1/projects",
            post(handler::create_project).get(handler::list_projects),
        )
        .route(
            "/v1/projects/:id",
            get(handler::get_project)
                .patch(handler::update_project)
                .delete(handler::delete_project),
        )
        .route(
            "/v1/projects/:id/branches",
            post(handler::create_branch).get(handler::list_branches),
        )
        .route("/v1/projects/:id/presign", post(handler::presign))
        .route(
            "/v1/projects/:id/uploads/:upload_id",
            post(handler::complete_upload).delete(handler::abort_upload),
        )
        .route("/v1/projects/:id/reconcile", post(handler::reconcile))
        .route(
            "/v1/teams/:team/projects/:name/branches/:branch",
            get(handler::branch_with_latest_commit),
        )
        .route(
            "/v1/branches/:id",
            axum::routing::delete(handler::delete_branch),
        )
        .route(
            "/v1/branches/:id/locks",
            get(handler::list_locks)
                .post(handler::lock_paths)
                .delete(handler::unlock_paths),
        )
        .route(
            "/v1/branches/:id/commits",
            post(handler::create_commit).get(handler::list_commits),
        )
        .route(
            "/v1/commits/:id",
            get(handler::get_commit).patch(handler::update_commit),
        );

    if state.local_storage.is_some() {
        // Object bodies go well past the default request limit.
        router = router.route(
            "/:bucket",
            get(storage::download)
                .put(storage::upload)
                .layer(DefaultBodyLimit::disable()),
        );
    }

    router
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
