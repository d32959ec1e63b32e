use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, state::AppState};

/// Every API route, without middleware. `main` adds CORS, tracing and
/// metrics on top; integration tests use it as is.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // General
        .route("/health", get(handlers::health_check))
        .route("/", get(handlers::greeting))
        // Auth
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/me", get(handlers::auth::me))
        // Users
        .route("/users", get(handlers::users::list_users))
        .route(
            "/users/:id",
            get(handlers::users::get_user).delete(handlers::users::delete_user),
        )
        .route(
            "/users/:id/reset-password",
            put(handlers::users::reset_password),
        )
        .route("/users/:id/ban", put(handlers::users::ban_user))
        .route("/users/:id/unban", put(handlers::users::unban_user))
        // Versions
        .route("/check-update", post(handlers::versions::check_update))
        .route("/version/:version", get(handlers::versions::get_version))
        .route(
            "/versions",
            post(handlers::versions::add_version)
                .delete(handlers::versions::delete_version_by_name),
        )
        .route(
            "/versions/:id",
            delete(handlers::versions::delete_version_by_id),
        )
        // Images
        .route(
            "/images",
            get(handlers::images::list_all_images).post(handlers::images::create_image),
        )
        .route("/images/my", get(handlers::images::list_my_images))
        .route("/images/my/tags", get(handlers::images::list_my_tags))
        .route(
            "/images/:id",
            get(handlers::images::get_image)
                .put(handlers::images::update_image)
                .delete(handlers::images::delete_image),
        )
        // Scraper
        .route("/scrape/metadata", post(handlers::scrape::get_metadata))
        .with_state(state)
}
