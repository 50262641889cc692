use axum::{routing::get, Router};
use std::sync::Arc;

use super::{handlers, pages, AppState};

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(pages::index))
        .route("/posts/:id", get(pages::show_post))
        .route(
            "/api/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route(
            "/api/posts/:id",
            get(handlers::get_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route("/health", get(handlers::health))
}
